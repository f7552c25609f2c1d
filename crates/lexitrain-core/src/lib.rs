//! # Lexitrain Core Library
//!
//! This library provides the training orchestration logic for the Lexitrain
//! vocabulary trainer: which word to show next, what kind of exercise to use
//! for it, and when it must come back. It follows a CLI-first philosophy;
//! every operation is available through the standalone `lexitrain-cli`
//! binary built on the same library.
//!
//! ## Architecture
//!
//! - **Rating**: turns a raw answer into an Again/Hard/Good/Easy rating
//! - **Mastery**: per-word exercise level 0-7 with streak-based promotion
//! - **Tiers**: frequency-rank slices of the catalog unlocked by recall ratio
//! - **Planner**: packs overdue, in-progress and new words into a time budget
//!   and keeps a re-queueable session queue
//! - **Recorder**: commits one answer atomically
//! - **Storage**: SQLite learner state and TOML configuration
//!
//! ## Key Components
//!
//! - [`TrainingEngine`]: the planning API (`plan`, `advance`, `record`,
//!   `current_tier_progress`)
//! - [`CardScheduler`]: spaced-repetition contract, with [`FsrsScheduler`]
//!   as the built-in implementation
//! - [`WordCatalog`]: read-only catalog contract, with [`MemoryCatalog`]
//! - [`Database`] and [`Config`]

pub mod engine;
pub mod error;
pub mod mastery;
pub mod memory;
pub mod planner;
pub mod rating;
pub mod recorder;
pub mod stats;
pub mod storage;
pub mod tier;
pub mod word;

pub use engine::{TierOverview, TrainingEngine};
pub use error::{ConfigError, CoreError, DatabaseError, TrainingError, ValidationError};
pub use mastery::{LearnerWordState, MasteryConfig, MasteryStateMachine, MasteryTransition, TransitionReason};
pub use memory::{CardScheduler, FsrsScheduler, MemoryState, Rating, ScheduleOutcome, SchedulerError, StateKind};
pub use planner::{
    Advance, ExerciseItem, ItemOrigin, NewWordsPosition, PlannerConfig, SessionMode, SessionPlan,
    SessionPlanner,
};
pub use rating::{evaluate, AnswerSignal, ExerciseAnswer, ExerciseKind, FastAnswerThresholds, RatingDeriver, RawAnswer};
pub use recorder::{CommitResult, SessionRecorder};
pub use stats::{Dashboard, HeatmapDay};
pub use storage::{data_dir, Config, DailyStats, Database};
pub use tier::{LevelSource, TierGate, TierProgress, TierRecord, TierStats};
pub use word::{MemoryCatalog, PartOfSpeech, RankRange, WordCatalog, WordId, WordRef};
