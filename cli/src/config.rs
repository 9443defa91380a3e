use anyhow::{Context, Result, bail};
use chrono::{Days, FixedOffset, NaiveDate};
use directories::ProjectDirs;
use std::path::PathBuf;

use larder_core::auth::{Credentials, Endpoints};
use larder_core::dates;

pub const DEFAULT_CALLBACK_PORT: u16 = 8080;
/// How far back a first sync reaches when nothing else says where to start.
const DEFAULT_SYNC_DAYS: u64 = 30;

pub struct Config {
    pub data_dir: PathBuf,
    pub cache_path: PathBuf,
    pub tokens_path: PathBuf,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub callback_port: u16,
    pub utc_offset: Option<FixedOffset>,
    pub sync_start: Option<NaiveDate>,
    pub endpoints: Endpoints,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "larder").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Self::from_lookup(data_dir, |name| std::env::var(name).ok())
    }

    /// Build from a data directory and an environment lookup. Each setting
    /// prefers `LARDER_<NAME>` and falls back to the bare name where one exists.
    fn from_lookup(data_dir: PathBuf, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |names: &[&str]| {
            names
                .iter()
                .filter_map(|&n| env(n))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let tokens_path = var(&["LARDER_TOKENS_PATH", "TOKENS_PATH"])
            .map_or_else(|| data_dir.join("tokens.json"), PathBuf::from);

        let callback_port = match var(&["LARDER_CALLBACK_PORT"]) {
            Some(p) => p
                .parse()
                .with_context(|| format!("Invalid LARDER_CALLBACK_PORT '{p}'"))?,
            None => DEFAULT_CALLBACK_PORT,
        };

        let utc_offset = var(&["LARDER_UTC_OFFSET"])
            .map(|s| {
                s.parse::<FixedOffset>()
                    .map_err(|e| anyhow::anyhow!("Invalid LARDER_UTC_OFFSET '{s}': {e}"))
            })
            .transpose()?;

        let sync_start = var(&["LARDER_SYNC_START"])
            .map(|s| dates::parse_date(&s).context("Invalid LARDER_SYNC_START"))
            .transpose()?;

        let defaults = Endpoints::default();
        let endpoints = Endpoints {
            request_token: var(&["LARDER_REQUEST_TOKEN_URL"]).unwrap_or(defaults.request_token),
            authorize: var(&["LARDER_AUTHORIZE_URL"]).unwrap_or(defaults.authorize),
            access_token: var(&["LARDER_ACCESS_TOKEN_URL"]).unwrap_or(defaults.access_token),
            api: var(&["LARDER_API_URL"]).unwrap_or(defaults.api),
        };

        Ok(Config {
            endpoints,
            cache_path: data_dir.join("cache.db"),
            tokens_path,
            consumer_key: var(&["LARDER_CONSUMER_KEY", "CONSUMER_KEY"]),
            consumer_secret: var(&["LARDER_CONSUMER_SECRET", "CONSUMER_SECRET"]),
            callback_port,
            utc_offset,
            sync_start,
            data_dir,
        })
    }

    pub fn credentials(&self) -> Result<Credentials> {
        match (&self.consumer_key, &self.consumer_secret) {
            (Some(key), Some(secret)) => Ok(Credentials {
                consumer_key: key.clone(),
                consumer_secret: secret.clone(),
            }),
            _ => bail!(
                "Consumer credentials missing. Set LARDER_CONSUMER_KEY and LARDER_CONSUMER_SECRET"
            ),
        }
    }

    pub fn callback_url(&self) -> String {
        format!("http://localhost:{}/callback", self.callback_port)
    }

    pub fn today(&self) -> NaiveDate {
        dates::today_in(self.utc_offset)
    }

    /// Start of the window when neither the command line nor the cache gives one.
    pub fn default_sync_start(&self) -> NaiveDate {
        self.sync_start.unwrap_or_else(|| {
            let today = self.today();
            today
                .checked_sub_days(Days::new(DEFAULT_SYNC_DAYS))
                .unwrap_or(today)
        })
    }
}
