use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use super::api_client;
use super::helpers::{no_neg_zero, parse_date, print_json};
use crate::config::Config;

pub(crate) fn cmd_month(
    config: &Config,
    rt: &tokio::runtime::Handle,
    date: Option<&str>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct MonthRow {
        #[tabled(rename = "Date")]
        date: String,
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
    let mut api = api_client(config, rt, false)?;
    let days = api.month_summary(date)?;

    if json {
        return print_json(&days);
    }

    if days.is_empty() {
        println!("No diary entries in {}", date.format("%B %Y"));
        return Ok(());
    }

    let rows: Vec<MonthRow> = days
        .iter()
        .map(|d| MonthRow {
            date: d
                .date()
                .map_or_else(|| d.date_int.to_string(), |x| x.to_string()),
            calories: format!("{:.0}", no_neg_zero(d.calories)),
            protein: format!("{:.0}g", no_neg_zero(d.protein)),
            carbs: format!("{:.0}g", no_neg_zero(d.carbohydrate)),
            fat: format!("{:.0}g", no_neg_zero(d.fat)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
