use chrono::Utc;
use lexitrain_core::Config;

use super::{budget_seconds, open_engine, parse_mode, CliResult};

pub fn run(minutes: Option<u32>, mode: &str) -> CliResult {
    let mode = parse_mode(mode)?;
    let config = Config::load()?;
    let budget = budget_seconds(&config, minutes);
    let engine = open_engine(config)?;

    let plan = engine.plan(budget, mode, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
