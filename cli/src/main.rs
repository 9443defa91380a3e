mod callback;
mod commands;
mod config;
mod http;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    SyncArgs, cmd_auth_login, cmd_auth_logout, cmd_auth_status, cmd_entries, cmd_history,
    cmd_month, cmd_profile, cmd_sync,
};
use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "Sync your FatSecret food diary into a local cache"
)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the FatSecret access token
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Show the remote profile (weight, goal, height)
    Profile {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch diary entries and merge them into the cache
    Sync {
        /// First day to fetch (YYYY-MM-DD, default: newest cached day or LARDER_SYNC_START)
        #[arg(long)]
        start: Option<String>,
        /// Last day to fetch (YYYY-MM-DD, default: today)
        #[arg(long)]
        end: Option<String>,
        /// Rebuild fetched days from scratch instead of merging
        #[arg(long)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show cached entries for a day (defaults to today)
    Entries {
        /// Date to show (YYYY-MM-DD, today or yesterday)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show cached daily totals for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the remote month summary for the month containing DATE
    Month {
        /// Any day in the month (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Run the OAuth handshake and store the access token
    Login {
        /// Paste the verifier instead of waiting for the browser redirect
        #[arg(long)]
        manual: bool,
        /// Discard any stored token first
        #[arg(long)]
        force: bool,
    },
    /// Remove the stored access token
    Logout,
    /// Show whether an access token is stored
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn setup_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "larder=info,larder_core=info,warn",
        _ => "larder=debug,larder_core=debug,info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    // Core calls block; the runtime only drives reqwest and the callback listener
    let rt = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let handle = rt.handle();

    match cli.command {
        Commands::Auth { command } => match command {
            AuthCommands::Login { manual, force } => cmd_auth_login(&config, handle, manual, force),
            AuthCommands::Logout => cmd_auth_logout(&config),
            AuthCommands::Status { json } => cmd_auth_status(&config, json),
        },
        Commands::Profile { json } => cmd_profile(&config, handle, json),
        Commands::Sync {
            start,
            end,
            force,
            json,
        } => cmd_sync(
            &config,
            handle,
            &SyncArgs {
                start: start.as_deref(),
                end: end.as_deref(),
                force,
                json,
            },
        ),
        Commands::Entries { date, json } => cmd_entries(&config, date.as_deref(), json),
        Commands::History { days, json } => cmd_history(&config, days, json),
        Commands::Month { date, json } => cmd_month(&config, handle, date.as_deref(), json),
    }
}
