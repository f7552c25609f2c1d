use lexitrain_core::Config;

use super::{open_engine, CliResult};

pub fn run() -> CliResult {
    let engine = open_engine(Config::load()?)?;
    let output = serde_json::json!({
        "progress": engine.current_tier_progress()?,
        "tiers": engine.tier_overview()?,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
