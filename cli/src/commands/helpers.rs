use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use serde::Serialize;

use larder_core::dates::DATE_FORMAT;

/// Resolve a date argument against `today`. Accepts YYYY-MM-DD or
/// today/yesterday.
pub(crate) fn parse_date(date_str: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match date_str.map(str::trim) {
        None | Some("today") => Ok(today),
        Some("yesterday") => today.checked_sub_days(Days::new(1)).context("Date out of range"),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
            .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday")),
    }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
