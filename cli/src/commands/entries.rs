use anyhow::Result;
use chrono::Days;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::cache::Cache;
use larder_core::dates;
use larder_core::models::{DayTotals, FoodEntry};

use super::helpers::{no_neg_zero, parse_date, print_json, truncate};
use crate::config::Config;

pub(crate) fn cmd_entries(config: &Config, date: Option<&str>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Food")]
        name: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let date = parse_date(date, config.today())?;
    let cache = Cache::open(&config.cache_path)?;
    let entries = cache.entries_for(date)?;

    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("No cached entries for {date}. Run `larder sync` first?");
        return Ok(());
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e: &FoodEntry| EntryRow {
            meal: e.meal.clone(),
            name: truncate(&e.food_entry_name, 40),
            calories: format!("{:.0}", no_neg_zero(e.calories)),
            protein: format!("{:.1}g", no_neg_zero(e.protein)),
            carbs: format!("{:.1}g", no_neg_zero(e.carbohydrate)),
            fat: format!("{:.1}g", no_neg_zero(e.fat)),
        })
        .collect();

    let totals = DayTotals::from_entries(dates::format_date(date), &entries);
    println!("=== {date} ===\n");
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    println!(
        "  TOTAL: {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
        totals.calories, totals.protein, totals.carbohydrate, totals.fat
    );
    Ok(())
}

pub(crate) fn cmd_history(config: &Config, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Entries")]
        entries: usize,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let end = config.today();
    let start = end
        .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
        .unwrap_or(end);
    let cache = Cache::open(&config.cache_path)?;
    let totals = cache.day_totals(start, end)?;

    if json {
        return print_json(&totals);
    }

    if totals.is_empty() {
        println!("No cached entries in the last {days} days");
        return Ok(());
    }

    let rows: Vec<HistoryRow> = totals
        .iter()
        .rev()
        .map(|t| HistoryRow {
            date: t.date.clone(),
            entries: t.entries,
            calories: format!("{:.0}", no_neg_zero(t.calories)),
            protein: format!("{:.0}g", no_neg_zero(t.protein)),
            carbs: format!("{:.0}g", no_neg_zero(t.carbohydrate)),
            fat: format!("{:.0}g", no_neg_zero(t.fat)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
