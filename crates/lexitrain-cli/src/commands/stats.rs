use chrono::{Datelike, Utc};
use clap::Subcommand;
use lexitrain_core::storage::Database;
use lexitrain_core::stats;

use super::CliResult;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's numbers
    Today,
    /// Streak, accuracy, weekly history, mastery distribution and coverage
    Dashboard,
    /// Reviews per day over a calendar year
    Heatmap {
        /// Year to show (defaults to the current one)
        #[arg(long)]
        year: Option<i32>,
    },
}

pub fn run(action: StatsAction) -> CliResult {
    let db = Database::open()?;
    let today = Utc::now().date_naive();

    match action {
        StatsAction::Today => {
            let stats = stats::today(&db, today)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::Dashboard => {
            let dashboard = stats::dashboard(&db, today)?;
            println!("{}", serde_json::to_string_pretty(&dashboard)?);
        }
        StatsAction::Heatmap { year } => {
            let days = stats::heatmap(&db, year.unwrap_or_else(|| today.year()))?;
            println!("{}", serde_json::to_string_pretty(&days)?);
        }
    }
    Ok(())
}
