//! The remote API counts dates as whole days since 1970-01-01. Conversions
//! here are calendar arithmetic only; no timezone is ever applied to a stored
//! `date_int`.

use chrono::{Days, FixedOffset, Local, NaiveDate, Utc};

use crate::error::{Error, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

#[must_use]
pub fn days_since_epoch(date: NaiveDate) -> i64 {
    (date - epoch()).num_days()
}

/// Returns `None` when the offset falls outside chrono's calendar range.
#[must_use]
pub fn date_from_days(days: i64) -> Option<NaiveDate> {
    match u64::try_from(days) {
        Ok(forward) => epoch().checked_add_days(Days::new(forward)),
        Err(_) => epoch().checked_sub_days(Days::new(days.unsigned_abs())),
    }
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| Error::DataValidation(format!("invalid date '{s}': {e}")))
}

/// Every calendar day from `start` to `end`, both inclusive.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

/// "Today" as seen from `offset`, or from the local zone when unset. Only
/// used to pick the end of a fetch window.
#[must_use]
pub fn today_in(offset: Option<FixedOffset>) -> NaiveDate {
    match offset {
        Some(offset) => Utc::now().with_timezone(&offset).date_naive(),
        None => Local::now().date_naive(),
    }
}
