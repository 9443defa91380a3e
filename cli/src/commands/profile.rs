use anyhow::Result;

use larder_core::dates;

use super::api_client;
use super::helpers::print_json;
use crate::config::Config;

pub(crate) fn cmd_profile(config: &Config, rt: &tokio::runtime::Handle, json: bool) -> Result<()> {
    let mut api = api_client(config, rt, false)?;
    let profile = api.profile()?;

    if json {
        return print_json(&profile);
    }

    let weight = profile.last_weight_kg;
    let goal = profile.goal_weight_kg;
    let height = profile.height_cm;
    println!("Weight: {weight:.1} kg (goal {goal:.1} kg)");
    if let Some(date) = profile.last_weight_date_int.and_then(dates::date_from_days) {
        println!("  recorded {date}");
    }
    if let Some(comment) = profile.last_weight_comment.as_deref().filter(|c| !c.is_empty()) {
        println!("  \"{comment}\"");
    }
    println!("Height: {height:.0} cm");
    println!("Goal remaining: {:.1} kg", weight - goal);
    Ok(())
}
