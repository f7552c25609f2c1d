mod config;
pub mod database;
pub mod migrations;

pub use config::{
    CatalogConfig, Config, ExerciseConfig, LoggingConfig, SchedulerConfig, TierConfig,
    TrainingConfig,
};
pub use database::{DailyStats, Database, ReviewLogEntry};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it when missing.
///
/// `LEXITRAIN_HOME` overrides the location entirely. Otherwise this is
/// `~/.config/lexitrain`, or `~/.config/lexitrain-dev` when
/// `LEXITRAIN_ENV=dev`.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("LEXITRAIN_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => {
            let base_dir = dirs::home_dir().ok_or(ConfigError::NoDataDir)?.join(".config");
            let env = std::env::var("LEXITRAIN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("lexitrain-dev")
            } else {
                base_dir.join("lexitrain")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::LoadFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}
