//! Core error types for lexitrain-core.
//!
//! This module defines the error hierarchy using thiserror. Errors that
//! concern a single exercise (`TrainingError`) are recoverable by the caller;
//! storage and configuration errors are not.

use std::path::PathBuf;
use thiserror::Error;

use crate::word::WordId;

/// Core error type for lexitrain-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Errors scoped to a single exercise
    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// True when the error only affects the current exercise and the
    /// session can carry on with the next queued item.
    pub fn is_exercise_scoped(&self) -> bool {
        matches!(self, CoreError::Training(_))
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Stored row could not be decoded
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Home directory could not be resolved
    #[error("Cannot determine data directory")]
    NoDataDir,
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Time budget must be positive
    #[error("Time budget must be greater than zero seconds")]
    EmptyTimeBudget,

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors scoped to one answered exercise. None of these abort a session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    /// Malformed or empty submission, rejected before rating derivation
    #[error("Invalid answer for word {word_id}: {reason}")]
    InvalidAnswer { word_id: WordId, reason: String },

    /// The card scheduler could not compute a new memory state
    #[error("Scheduler unavailable for word {word_id}: {message}")]
    SchedulerUnavailable { word_id: WordId, message: String },

    /// Catalog returned a rank outside every configured tier
    #[error("Word {word_id} has rank {rank} outside every tier")]
    TierInconsistency { word_id: WordId, rank: u32 },

    /// Word is inside the plan but its learner state is gone
    #[error("No learner state for word {word_id}")]
    MissingWordState { word_id: WordId },

    /// Word id is not known to the catalog
    #[error("Word {word_id} is not in the catalog")]
    UnknownWord { word_id: WordId },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn training_errors_are_exercise_scoped() {
        let err: CoreError = TrainingError::MissingWordState { word_id: 7 }.into();
        assert!(err.is_exercise_scoped());

        let err: CoreError = DatabaseError::Locked.into();
        assert!(!err.is_exercise_scoped());
    }

    #[test]
    fn locked_sqlite_maps_to_locked() {
        let raw = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(DatabaseError::from(raw), DatabaseError::Locked));
    }
}
