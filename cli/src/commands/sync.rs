use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::cache::Cache;
use larder_core::dates;
use larder_core::service::{SyncReport, SyncRequest, SyncService};

use super::api_client;
use super::helpers::print_json;
use crate::config::Config;

pub(crate) struct SyncArgs<'a> {
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
    pub force: bool,
    pub json: bool,
}

pub(crate) fn cmd_sync(config: &Config, rt: &tokio::runtime::Handle, args: &SyncArgs) -> Result<()> {
    let api = api_client(config, rt, false)?;
    let cache = Cache::open(&config.cache_path)
        .with_context(|| format!("Failed to open cache: {}", config.cache_path.display()))?;
    let mut service = SyncService::new(api, cache);

    let end = match args.end {
        Some(s) => dates::parse_date(s)?,
        None => config.today(),
    };
    let start = match args.start {
        Some(s) => dates::parse_date(s)?,
        None => service.default_start(config.default_sync_start())?,
    };

    let report = service
        .sync(&SyncRequest {
            start,
            end,
            force: args.force,
        })
        .context("Sync failed")?;

    if args.json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    #[derive(Tabled)]
    struct StatRow {
        #[tabled(rename = "")]
        label: &'static str,
        #[tabled(rename = "Count")]
        count: usize,
    }

    let mode = if report.force { "force reload" } else { "incremental" };
    println!("Synced {} to {} ({mode})\n", report.start, report.end);

    let stats = &report.stats;
    let rows = vec![
        StatRow { label: "Days fetched", count: report.days_fetched },
        StatRow { label: "Entries fetched", count: report.entries_fetched },
        StatRow { label: "Processed", count: stats.processed },
        StatRow { label: "Loaded", count: stats.loaded },
        StatRow { label: "Updated", count: stats.updated },
        StatRow { label: "Already present", count: stats.skipped_existing },
        StatRow { label: "Invalid", count: stats.skipped_invalid },
        StatRow { label: "Dates written", count: stats.dates_written },
        StatRow { label: "Dates cleared", count: report.dates_cleared },
    ];
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    for skipped in &report.skipped_days {
        eprintln!("Warning: skipped {}: {}", skipped.date, skipped.reason);
    }
}
