//! TOML-based training configuration.
//!
//! Stores:
//! - Session planning knobs (budget, new-word quota and placement)
//! - Per-level exercise time costs and fast-answer thresholds
//! - Mastery streak rules
//! - Tier boundaries and the unlock threshold
//! - Scheduler retention target, catalog location, log level
//!
//! Configuration is stored at `<data_dir>/config.toml` and is read once per
//! session.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::mastery::MasteryConfig;
use crate::planner::{NewWordsPosition, PlannerConfig};
use crate::rating::FastAnswerThresholds;

/// Session planning and tier unlock settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_unlock_threshold")]
    pub unlock_threshold: f64,
    #[serde(default = "default_daily_new_word_quota")]
    pub daily_new_word_quota: u32,
    #[serde(default = "default_session_duration_minutes")]
    pub session_duration_minutes: u32,
    #[serde(default)]
    pub new_words_position: NewWordsPosition,
    #[serde(default = "default_reviews_between_new")]
    pub reviews_between_new: u32,
    #[serde(default = "default_quick_session_seconds")]
    pub quick_session_seconds: u32,
    #[serde(default = "default_true")]
    pub new_word_followup: bool,
}

/// Per-level tables, index 0 is level 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseConfig {
    #[serde(default = "default_time_costs")]
    pub time_costs: [u32; 7],
    #[serde(default = "default_fast_answer_ms")]
    pub fast_answer_ms: [u64; 7],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Inclusive upper rank bound of each tier, ascending.
    #[serde(default = "default_boundaries")]
    pub boundaries: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_desired_retention")]
    pub desired_retention: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON word list. Relative paths resolve against the data directory.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub exercise: ExerciseConfig,
    #[serde(default)]
    pub mastery: MasteryConfig,
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_unlock_threshold() -> f64 {
    0.70
}
fn default_daily_new_word_quota() -> u32 {
    10
}
fn default_session_duration_minutes() -> u32 {
    15
}
fn default_reviews_between_new() -> u32 {
    3
}
fn default_quick_session_seconds() -> u32 {
    300
}
fn default_true() -> bool {
    true
}
fn default_time_costs() -> [u32; 7] {
    [4, 4, 10, 10, 20, 30, 30]
}
fn default_fast_answer_ms() -> [u64; 7] {
    FastAnswerThresholds::default().0
}
fn default_boundaries() -> Vec<u32> {
    vec![500, 1000, 2000, 3000, 5000, 10000]
}
fn default_desired_retention() -> f64 {
    0.9
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            unlock_threshold: default_unlock_threshold(),
            daily_new_word_quota: default_daily_new_word_quota(),
            session_duration_minutes: default_session_duration_minutes(),
            new_words_position: NewWordsPosition::default(),
            reviews_between_new: default_reviews_between_new(),
            quick_session_seconds: default_quick_session_seconds(),
            new_word_followup: true,
        }
    }
}

impl Default for ExerciseConfig {
    fn default() -> Self {
        Self {
            time_costs: default_time_costs(),
            fast_answer_ms: default_fast_answer_ms(),
        }
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            boundaries: default_boundaries(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            desired_retention: default_desired_retention(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from `<data_dir>/config.toml`, writing defaults when the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation, or if the default config cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults when the file is missing.
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to `<data_dir>/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Update a value in memory. The result must still validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Every leaf key with its current value, in dot-path form.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out.sort();
        out
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        let t = &self.training;
        if t.unlock_threshold.is_nan() || t.unlock_threshold <= 0.0 || t.unlock_threshold > 1.0 {
            return invalid("training.unlock_threshold", "must be in (0, 1]");
        }
        if t.session_duration_minutes == 0 {
            return invalid("training.session_duration_minutes", "must be positive");
        }
        if !(2..=3).contains(&t.reviews_between_new) {
            return invalid("training.reviews_between_new", "must be 2 or 3");
        }
        if t.quick_session_seconds == 0 {
            return invalid("training.quick_session_seconds", "must be positive");
        }
        if self.exercise.time_costs.contains(&0) {
            return invalid("exercise.time_costs", "every level needs a positive cost");
        }
        if self.exercise.fast_answer_ms.contains(&0) {
            return invalid("exercise.fast_answer_ms", "every level needs a positive threshold");
        }
        if self.mastery.promotion_streak == 0 {
            return invalid("mastery.promotion_streak", "must be at least 1");
        }
        if self.mastery.demotion_streak == 0 {
            return invalid("mastery.demotion_streak", "must be at least 1");
        }
        if self.mastery.severe_lapse_stability.is_nan() || self.mastery.severe_lapse_stability < 0.0 {
            return invalid("mastery.severe_lapse_stability", "must be non-negative");
        }
        let b = &self.tiers.boundaries;
        if b.is_empty() || b.windows(2).any(|w| w[0] >= w[1]) {
            return invalid("tiers.boundaries", "must be a non-empty ascending list");
        }
        if !(0.7..=0.99).contains(&self.scheduler.desired_retention) {
            return invalid("scheduler.desired_retention", "must be within 0.7..=0.99");
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return invalid("logging.level", "must be one of trace, debug, info, warn, error");
        }
        Ok(())
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            time_costs: self.exercise.time_costs,
            new_words_position: self.training.new_words_position,
            reviews_between_new: self.training.reviews_between_new as usize,
            daily_new_word_quota: self.training.daily_new_word_quota,
            quick_session_seconds: self.training.quick_session_seconds,
            new_word_followup: self.training.new_word_followup,
        }
    }

    pub fn fast_answer_thresholds(&self) -> FastAnswerThresholds {
        FastAnswerThresholds(self.exercise.fast_answer_ms)
    }

    pub fn session_seconds(&self) -> u32 {
        self.training.session_duration_minutes.saturating_mul(60)
    }

    /// Catalog file, resolved against the data directory when relative.
    pub fn catalog_path(&self) -> Option<PathBuf> {
        let raw = self.catalog.path.as_deref()?;
        let path = PathBuf::from(raw);
        if path.is_absolute() {
            Some(path)
        } else {
            data_dir().ok().map(|dir| dir.join(path))
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[training]\ndaily_new_word_quota = 4\n").unwrap();
        assert_eq!(parsed.training.daily_new_word_quota, 4);
        assert_eq!(parsed.training.unlock_threshold, 0.70);
        assert_eq!(parsed.exercise.time_costs, [4, 4, 10, 10, 20, 30, 30]);
        assert_eq!(parsed.tiers.boundaries[0], 500);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("training.new_words_position").as_deref(), Some("middle"));
        assert_eq!(cfg.get("mastery.promotion_streak").as_deref(), Some("3"));
        assert!(cfg.get("training.missing_key").is_none());
    }

    #[test]
    fn apply_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.apply("training.unlock_threshold", "0.8").unwrap();
        cfg.apply("training.new_words_position", "end").unwrap();
        cfg.apply("training.new_word_followup", "false").unwrap();
        cfg.apply("exercise.time_costs", "[5, 5, 10, 10, 20, 30, 30]").unwrap();
        assert_eq!(cfg.training.unlock_threshold, 0.8);
        assert_eq!(cfg.training.new_words_position, NewWordsPosition::End);
        assert!(!cfg.training.new_word_followup);
        assert_eq!(cfg.exercise.time_costs[0], 5);
    }

    #[test]
    fn apply_sets_optional_string() {
        let mut cfg = Config::default();
        cfg.apply("catalog.path", "/tmp/words.json").unwrap();
        assert_eq!(cfg.catalog.path.as_deref(), Some("/tmp/words.json"));
        assert_eq!(cfg.catalog_path(), Some(PathBuf::from("/tmp/words.json")));
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.apply("training.nonexistent_key", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn apply_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.apply("training.new_word_followup", "not_a_bool").is_err());
        assert!(cfg.apply("training.new_words_position", "sideways").is_err());
    }

    #[test]
    fn apply_rejects_out_of_range_and_keeps_old_value() {
        let mut cfg = Config::default();
        assert!(cfg.apply("training.reviews_between_new", "5").is_err());
        assert!(cfg.apply("training.unlock_threshold", "1.5").is_err());
        assert_eq!(cfg.training.reviews_between_new, 3);
        assert_eq!(cfg.training.unlock_threshold, 0.70);
    }

    #[test]
    fn validate_rejects_unsorted_boundaries() {
        let mut cfg = Config::default();
        cfg.tiers.boundaries = vec![1000, 500];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.training.daily_new_word_quota = 25;
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().training.daily_new_word_quota, 25);
    }

    #[test]
    fn entries_lists_leaf_keys() {
        let entries = Config::default().entries();
        assert!(entries
            .iter()
            .any(|(k, v)| k == "scheduler.desired_retention" && v == "0.9"));
        assert!(entries.iter().any(|(k, _)| k == "exercise.time_costs"));
    }

    #[test]
    fn planner_config_mirrors_sections() {
        let cfg = Config::default();
        let planner = cfg.planner_config();
        assert_eq!(planner.daily_new_word_quota, 10);
        assert_eq!(planner.reviews_between_new, 3);
        assert_eq!(cfg.session_seconds(), 900);
    }
}
