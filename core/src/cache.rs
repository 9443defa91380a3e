use std::collections::BTreeMap;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::dates;
use crate::error::Result;
use crate::models::{DayTotals, FoodEntry};
use crate::sync::{self, Buckets, SyncOutcome};

pub const BUCKET_PREFIX: &str = "food_entries:";
pub const DATE_MAPPINGS: &str = "date_mappings";

#[must_use]
pub fn bucket_key(date: &str) -> String {
    format!("{BUCKET_PREFIX}{date}")
}

/// Key-value store holding date buckets and the date mapping hash.
pub struct Cache {
    conn: Connection,
}

impl Cache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let cache = Cache { conn };
        cache.migrate()?;
        debug!(path = %path.display(), "Opened cache");
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Cache { conn };
        cache.migrate()?;
        Ok(cache)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS hashes (
                    name TEXT NOT NULL,
                    field TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (name, field)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Plain key-value ---

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }

    /// Keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    // --- Hashes ---

    pub fn hset(&self, name: &str, field: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO hashes (name, field, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(name, field) DO UPDATE SET value = excluded.value",
            params![name, field, value],
        )?;
        Ok(())
    }

    pub fn hget(&self, name: &str, field: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM hashes WHERE name = ?1 AND field = ?2",
                params![name, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn hgetall(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT field, value FROM hashes WHERE name = ?1")?;
        let map = stmt
            .query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<String, String>, _>>()?;
        Ok(map)
    }

    // --- Date buckets ---

    /// Entries cached for `date`. A stored value that does not decode is
    /// logged and read as an empty bucket.
    pub fn load_bucket(&self, date: &str) -> Result<Vec<FoodEntry>> {
        let Some(raw) = self.get(&bucket_key(date))? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(date, error = %e, "Cached bucket is malformed, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Existing buckets for the given dates; dates with nothing cached are
    /// left out.
    pub fn snapshot<'a>(&self, dates: impl IntoIterator<Item = &'a str>) -> Result<Buckets> {
        let mut buckets = Buckets::new();
        for date in dates {
            let entries = self.load_bucket(date)?;
            if !entries.is_empty() {
                buckets.insert(date.to_string(), entries);
            }
        }
        Ok(buckets)
    }

    /// Write every updated bucket and its date mapping, and drop the buckets
    /// for `cleared` dates, in one transaction.
    pub fn apply(&self, outcome: &SyncOutcome, cleared: &[String]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        for date in cleared {
            tx.execute("DELETE FROM kv WHERE key = ?1", params![bucket_key(date)])?;
            tx.execute(
                "DELETE FROM hashes WHERE name = ?1 AND field = ?2",
                params![DATE_MAPPINGS, date],
            )?;
        }
        for (date, entries) in &outcome.updated_buckets {
            let json = serde_json::to_string(entries)?;
            tx.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![bucket_key(date), json, now],
            )?;
        }
        for (date, date_int) in &outcome.date_mappings {
            tx.execute(
                "INSERT INTO hashes (name, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name, field) DO UPDATE SET value = excluded.value",
                params![DATE_MAPPINGS, date, date_int.to_string()],
            )?;
        }

        tx.commit()?;
        debug!(
            written = outcome.updated_buckets.len(),
            cleared = cleared.len(),
            "Applied sync outcome"
        );
        Ok(())
    }

    /// Dates that have a bucket, oldest first.
    pub fn bucket_dates(&self) -> Result<Vec<String>> {
        Ok(self
            .keys_with_prefix(BUCKET_PREFIX)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(BUCKET_PREFIX).map(str::to_string))
            .collect())
    }

    pub fn latest_bucket_date(&self) -> Result<Option<NaiveDate>> {
        Ok(self
            .bucket_dates()?
            .iter()
            .rev()
            .find_map(|d| dates::parse_date(d).ok()))
    }

    /// Cached entries for `date`, with repeated fingerprints dropped.
    pub fn entries_for(&self, date: NaiveDate) -> Result<Vec<FoodEntry>> {
        let mut seen = std::collections::HashSet::new();
        Ok(self
            .load_bucket(&dates::format_date(date))?
            .into_iter()
            .filter(|e| seen.insert(sync::fingerprint(e)))
            .collect())
    }

    /// Totals per day in `[start, end]`. Days without a bucket are omitted.
    pub fn day_totals(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DayTotals>> {
        let mut totals = Vec::new();
        for day in dates::days_inclusive(start, end) {
            let entries = self.entries_for(day)?;
            if !entries.is_empty() {
                totals.push(DayTotals::from_entries(dates::format_date(day), &entries));
            }
        }
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn raw(id: &str, date_int: i64, calories: &str) -> Value {
        json!({
            "food_entry_id": id,
            "date_int": date_int.to_string(),
            "food_entry_name": "Oats",
            "meal": "Breakfast",
            "calories": calories,
            "carbohydrate": "27",
            "fat": "3",
            "protein": "5"
        })
    }

    fn date(s: &str) -> NaiveDate {
        dates::parse_date(s).unwrap()
    }

    #[test]
    fn test_kv_roundtrip() {
        let cache = Cache::open_in_memory().unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
        cache.set("k", "v1").unwrap();
        cache.set("k", "v2").unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v2"));
        assert!(cache.delete("k").unwrap());
        assert!(!cache.delete("k").unwrap());
    }

    #[test]
    fn test_keys_with_prefix() {
        let cache = Cache::open_in_memory().unwrap();
        cache.set("food_entries:2025-04-08", "[]").unwrap();
        cache.set("food_entries:2025-04-07", "[]").unwrap();
        cache.set("other", "x").unwrap();
        assert_eq!(
            cache.keys_with_prefix(BUCKET_PREFIX).unwrap(),
            vec!["food_entries:2025-04-07", "food_entries:2025-04-08"]
        );
    }

    #[test]
    fn test_hash_ops() {
        let cache = Cache::open_in_memory().unwrap();
        cache.hset(DATE_MAPPINGS, "2025-04-07", "20185").unwrap();
        cache.hset(DATE_MAPPINGS, "2025-04-07", "20185").unwrap();
        assert_eq!(
            cache.hget(DATE_MAPPINGS, "2025-04-07").unwrap().as_deref(),
            Some("20185")
        );
        assert_eq!(cache.hgetall(DATE_MAPPINGS).unwrap().len(), 1);
        assert_eq!(cache.hget(DATE_MAPPINGS, "nope").unwrap(), None);
    }

    #[test]
    fn test_apply_then_snapshot() {
        let cache = Cache::open_in_memory().unwrap();
        let outcome = sync::sync(
            &Buckets::new(),
            &[raw("1", 20185, "150"), raw("2", 20186, "300")],
        );
        cache.apply(&outcome, &[]).unwrap();

        let snapshot = cache
            .snapshot(["2025-04-07", "2025-04-08", "2025-04-09"])
            .unwrap();
        assert_eq!(snapshot, outcome.updated_buckets);
        assert_eq!(
            cache.hget(DATE_MAPPINGS, "2025-04-08").unwrap().as_deref(),
            Some("20186")
        );

        // Re-running against the stored state changes nothing
        let again = sync::sync(&snapshot, &[raw("1", 20185, "150")]);
        assert!(again.updated_buckets.is_empty());
    }

    #[test]
    fn test_apply_clears_dates() {
        let cache = Cache::open_in_memory().unwrap();
        cache
            .apply(&sync::sync(&Buckets::new(), &[raw("1", 20185, "150")]), &[])
            .unwrap();

        cache
            .apply(&SyncOutcome::default(), &["2025-04-07".to_string()])
            .unwrap();
        assert!(cache.load_bucket("2025-04-07").unwrap().is_empty());
        assert!(cache.bucket_dates().unwrap().is_empty());
        assert_eq!(cache.hget(DATE_MAPPINGS, "2025-04-07").unwrap(), None);
    }

    #[test]
    fn test_malformed_bucket_reads_empty() {
        let cache = Cache::open_in_memory().unwrap();
        cache.set(&bucket_key("2025-04-07"), "[{\"food_entry_id\":").unwrap();
        assert!(cache.load_bucket("2025-04-07").unwrap().is_empty());

        // And the next merge overwrites it
        let outcome = sync::sync(
            &cache.snapshot(["2025-04-07"]).unwrap(),
            &[raw("1", 20185, "150")],
        );
        cache.apply(&outcome, &[]).unwrap();
        assert_eq!(cache.load_bucket("2025-04-07").unwrap().len(), 1);
    }

    #[test]
    fn test_day_totals_and_latest() {
        let cache = Cache::open_in_memory().unwrap();
        let outcome = sync::sync(
            &Buckets::new(),
            &[
                raw("1", 20185, "150"),
                raw("2", 20185, "250"),
                raw("3", 20187, "500"),
            ],
        );
        cache.apply(&outcome, &[]).unwrap();

        let totals = cache
            .day_totals(date("2025-04-06"), date("2025-04-09"))
            .unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].date, "2025-04-07");
        assert_eq!(totals[0].entries, 2);
        assert!((totals[0].calories - 400.0).abs() < f64::EPSILON);
        assert_eq!(totals[1].date, "2025-04-09");

        assert_eq!(cache.latest_bucket_date().unwrap(), Some(date("2025-04-09")));
    }

    #[test]
    fn test_entries_for_drops_repeats() {
        let cache = Cache::open_in_memory().unwrap();
        let entry = raw("1", 20185, "150");
        cache
            .set(
                &bucket_key("2025-04-07"),
                &serde_json::to_string(&[entry.clone(), entry]).unwrap(),
            )
            .unwrap();
        assert_eq!(cache.entries_for(date("2025-04-07")).unwrap().len(), 1);
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("cache.db");
        {
            let cache = Cache::open(&path).unwrap();
            cache.set("k", "v").unwrap();
        }
        let cache = Cache::open(&path).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));
    }
}
