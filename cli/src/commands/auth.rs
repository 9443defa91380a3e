use anyhow::{Context, Result};
use serde::Serialize;

use larder_core::tokens::TokenStore;

use super::api_client;
use super::helpers::print_json;
use crate::config::Config;

pub(crate) fn cmd_auth_login(
    config: &Config,
    rt: &tokio::runtime::Handle,
    manual: bool,
    force: bool,
) -> Result<()> {
    let mut api = api_client(config, rt, manual)?;
    let auth = api.auth_mut();
    if force {
        auth.logout();
    }
    auth.authenticate().context("Authentication failed")?;
    println!(
        "Authenticated. Access token stored in {}",
        config.tokens_path.display()
    );
    Ok(())
}

pub(crate) fn cmd_auth_logout(config: &Config) -> Result<()> {
    TokenStore::new(&config.tokens_path).clear()?;
    println!("Logged out.");
    Ok(())
}

pub(crate) fn cmd_auth_status(config: &Config, json: bool) -> Result<()> {
    #[derive(Serialize)]
    struct Status {
        logged_in: bool,
        tokens_path: String,
        data_dir: String,
        credentials_configured: bool,
    }

    let status = Status {
        logged_in: TokenStore::new(&config.tokens_path).load().is_some(),
        tokens_path: config.tokens_path.display().to_string(),
        data_dir: config.data_dir.display().to_string(),
        credentials_configured: config.credentials().is_ok(),
    };

    if json {
        return print_json(&status);
    }

    if status.logged_in {
        println!("Logged in (token file: {})", status.tokens_path);
    } else {
        println!("Not logged in. Run `larder auth login`.");
    }
    println!("Data directory: {}", status.data_dir);
    if !status.credentials_configured {
        println!("Consumer credentials are not set (LARDER_CONSUMER_KEY / LARDER_CONSUMER_SECRET).");
    }
    Ok(())
}
