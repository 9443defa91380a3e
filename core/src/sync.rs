//! Fingerprint deduplication of fetched diary entries into per-date buckets.
//!
//! Everything here is pure: the caller supplies a snapshot of the existing
//! buckets and applies the returned outcome to the cache.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::dates;
use crate::error::{Error, Result};
use crate::models::FoodEntry;

/// Bucket contents keyed by `YYYY-MM-DD`.
pub type Buckets = BTreeMap<String, Vec<FoodEntry>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub processed: usize,
    /// New plus replaced entries.
    pub loaded: usize,
    /// Replaced entries only.
    pub updated: usize,
    pub skipped_invalid: usize,
    /// Already cached unchanged, or repeated later in the same batch.
    pub skipped_existing: usize,
    pub dates_written: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    /// Only dates whose merged contents differ from the snapshot.
    pub updated_buckets: Buckets,
    pub date_mappings: BTreeMap<String, i64>,
    pub stats: SyncStats,
}

/// Stable identity of a diary entry.
///
/// Keyed on `(food_entry_id, date_int, timestamp)`. Entries without an id
/// fall back to `(food_entry_name, meal, timestamp, date_int, calories)`.
#[must_use]
pub fn fingerprint(entry: &FoodEntry) -> String {
    let timestamp = entry.timestamp.as_deref().unwrap_or_default();
    let date_int = entry
        .date_int
        .map(|d| d.to_string())
        .unwrap_or_default();
    let material = match &entry.food_entry_id {
        Some(id) => format!("id|{id}|{date_int}|{timestamp}"),
        None => format!(
            "anon|{}|{}|{timestamp}|{date_int}|{}",
            entry.food_entry_name, entry.meal, entry.calories
        ),
    };
    Sha256::digest(material.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Decode and check one fetched entry, returning it with its bucket date.
pub fn validate(raw: &Value) -> Result<(String, FoodEntry)> {
    let entry: FoodEntry = serde_json::from_value(raw.clone())
        .map_err(|e| Error::DataValidation(format!("undecodable entry: {e}")))?;
    if entry.food_entry_id.is_none() {
        return Err(Error::DataValidation("missing food_entry_id".to_string()));
    }
    let date_int = entry
        .date_int
        .ok_or_else(|| Error::DataValidation("missing date_int".to_string()))?;
    let date = dates::date_from_days(date_int)
        .ok_or_else(|| Error::DataValidation(format!("date_int {date_int} out of range")))?;
    Ok((dates::format_date(date), entry))
}

/// Validate and group a batch, keeping input order within each date.
fn group_by_date(fetched: &[Value], stats: &mut SyncStats) -> Buckets {
    let mut grouped = Buckets::new();
    for raw in fetched {
        stats.processed += 1;
        match validate(raw) {
            Ok((date, entry)) => grouped.entry(date).or_default().push(entry),
            Err(e) => {
                debug!(error = %e, "Skipping entry");
                stats.skipped_invalid += 1;
            }
        }
    }
    grouped
}

/// Collapse repeated fingerprints; a later entry replaces the earlier one in
/// the earlier one's position. Also returns how many entries were folded away.
fn dedupe(entries: Vec<FoodEntry>) -> (Vec<FoodEntry>, usize) {
    let mut out: Vec<FoodEntry> = Vec::with_capacity(entries.len());
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut folded = 0;
    for entry in entries {
        let fp = fingerprint(&entry);
        match seen.get(&fp) {
            Some(&i) => {
                out[i] = entry;
                folded += 1;
            }
            None => {
                seen.insert(fp, out.len());
                out.push(entry);
            }
        }
    }
    (out, folded)
}

/// Merge fetched entries into the existing buckets.
#[must_use]
pub fn sync(existing: &Buckets, fetched: &[Value]) -> SyncOutcome {
    let mut stats = SyncStats::default();
    let grouped = group_by_date(fetched, &mut stats);
    let mut outcome = SyncOutcome::default();

    for (date, incoming) in grouped {
        let current = existing.get(&date).map_or(&[][..], Vec::as_slice);
        let (mut merged, _) = dedupe(current.to_vec());
        let mut index: BTreeMap<String, usize> = merged
            .iter()
            .enumerate()
            .map(|(i, e)| (fingerprint(e), i))
            .collect();

        let (incoming, folded) = dedupe(incoming);
        stats.skipped_existing += folded;
        for entry in incoming {
            let fp = fingerprint(&entry);
            match index.get(&fp) {
                Some(&i) if merged[i] == entry => stats.skipped_existing += 1,
                Some(&i) => {
                    merged[i] = entry;
                    stats.updated += 1;
                    stats.loaded += 1;
                }
                None => {
                    index.insert(fp, merged.len());
                    merged.push(entry);
                    stats.loaded += 1;
                }
            }
        }

        if merged.as_slice() != current {
            if let Some(date_int) = merged.iter().find_map(|e| e.date_int) {
                outcome.date_mappings.insert(date.clone(), date_int);
            }
            outcome.updated_buckets.insert(date, merged);
        }
    }

    stats.dates_written = outcome.updated_buckets.len();
    outcome.stats = stats;
    outcome
}

/// Rebuild every fetched date from the batch alone, ignoring what is cached.
#[must_use]
pub fn force_reload(fetched: &[Value]) -> SyncOutcome {
    let mut stats = SyncStats::default();
    let grouped = group_by_date(fetched, &mut stats);
    let mut outcome = SyncOutcome::default();

    for (date, incoming) in grouped {
        let (entries, folded) = dedupe(incoming);
        stats.loaded += entries.len();
        stats.skipped_existing += folded;
        if let Some(date_int) = entries.iter().find_map(|e| e.date_int) {
            outcome.date_mappings.insert(date.clone(), date_int);
        }
        outcome.updated_buckets.insert(date, entries);
    }

    stats.dates_written = outcome.updated_buckets.len();
    outcome.stats = stats;
    outcome
}
