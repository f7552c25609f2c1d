pub mod config;
pub mod plan;
pub mod stats;
pub mod tiers;
pub mod train;

use chrono::Utc;
use lexitrain_core::{Config, Database, MemoryCatalog, SessionMode, TrainingEngine};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Open the learner database with the configured catalog.
pub fn open_engine(config: Config) -> CliResult<TrainingEngine<MemoryCatalog>> {
    let catalog = match config.catalog_path() {
        Some(path) => MemoryCatalog::from_json_file(&path)?,
        None => {
            tracing::warn!("catalog.path is not set; only reviews can be planned");
            MemoryCatalog::default()
        }
    };
    let db = Database::open()?;
    Ok(TrainingEngine::new(db, catalog, config, Utc::now())?)
}

/// Budget in seconds from `--minutes`, falling back to the configured length.
pub fn budget_seconds(config: &Config, minutes: Option<u32>) -> u32 {
    minutes
        .map(|m| m.saturating_mul(60))
        .unwrap_or_else(|| config.session_seconds())
}

pub fn parse_mode(mode: &str) -> CliResult<SessionMode> {
    Ok(mode.parse::<SessionMode>()?)
}
