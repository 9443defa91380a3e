use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::api::{ApiClient, SkippedDay};
use crate::cache::Cache;
use crate::dates;
use crate::error::Result;
use crate::sync::{self, SyncStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Rebuild fetched dates from scratch instead of merging.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub start: String,
    pub end: String,
    pub force: bool,
    pub days_fetched: usize,
    pub skipped_days: Vec<SkippedDay>,
    pub entries_fetched: usize,
    /// Cached dates removed by a force reload because the day came back empty.
    pub dates_cleared: usize,
    pub stats: SyncStats,
}

/// One sync invocation: fetch a window of days, merge into the cache.
///
/// Blocking. Callers drive one service per cache at a time.
pub struct SyncService {
    api: ApiClient,
    cache: Cache,
}

impl SyncService {
    pub fn new(api: ApiClient, cache: Cache) -> Self {
        Self { api, cache }
    }

    #[must_use]
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// First day to fetch when none was requested: the newest cached date
    /// (re-fetched, since it may have been incomplete), else `fallback`.
    pub fn default_start(&self, fallback: NaiveDate) -> Result<NaiveDate> {
        Ok(self.cache.latest_bucket_date()?.unwrap_or(fallback))
    }

    pub fn sync(&mut self, request: &SyncRequest) -> Result<SyncReport> {
        info!(
            start = %request.start,
            end = %request.end,
            force = request.force,
            "Starting sync"
        );
        let fetch = self.api.food_entries_range(request.start, request.end)?;
        let entries = fetch.entries();

        let (outcome, cleared) = if request.force {
            let outcome = sync::force_reload(&entries);
            // A fetched day that came back empty has nothing left to cache
            let cached: BTreeSet<String> = self.cache.bucket_dates()?.into_iter().collect();
            let cleared: Vec<String> = fetch
                .days
                .iter()
                .map(|d| dates::format_date(d.date))
                .filter(|d| cached.contains(d) && !outcome.updated_buckets.contains_key(d))
                .collect();
            (outcome, cleared)
        } else {
            let touched: BTreeSet<String> = entries
                .iter()
                .filter_map(|raw| sync::validate(raw).ok().map(|(date, _)| date))
                .collect();
            let snapshot = self.cache.snapshot(touched.iter().map(String::as_str))?;
            (sync::sync(&snapshot, &entries), Vec::new())
        };

        self.cache.apply(&outcome, &cleared)?;

        let report = SyncReport {
            start: dates::format_date(request.start),
            end: dates::format_date(request.end),
            force: request.force,
            days_fetched: fetch.days.len(),
            skipped_days: fetch.skipped,
            entries_fetched: entries.len(),
            dates_cleared: cleared.len(),
            stats: outcome.stats,
        };
        info!(
            loaded = report.stats.loaded,
            updated = report.stats.updated,
            dates_written = report.stats.dates_written,
            skipped_days = report.skipped_days.len(),
            "Sync finished"
        );
        Ok(report)
    }

}
