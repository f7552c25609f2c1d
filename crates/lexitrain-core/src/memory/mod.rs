//! Spaced-repetition memory state and the card scheduler contract.
//!
//! The scheduler decides *when* a word is shown again. The training core
//! treats [`MemoryState`] as opaque apart from `due_at` and `state_kind`.

mod fsrs;

pub use fsrs::FsrsScheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Four-level answer quality signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Rating::Again),
            2 => Some(Rating::Hard),
            3 => Some(Rating::Good),
            4 => Some(Rating::Easy),
            _ => None,
        }
    }

    /// Good or Easy.
    pub fn is_pass(self) -> bool {
        matches!(self, Rating::Good | Rating::Easy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    New = 0,
    Learning = 1,
    Review = 2,
    Relearning = 3,
}

impl StateKind {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(StateKind::New),
            1 => Some(StateKind::Learning),
            2 => Some(StateKind::Review),
            3 => Some(StateKind::Relearning),
            _ => None,
        }
    }

    /// Learning or Relearning: not yet stable.
    pub fn is_in_progress(self) -> bool {
        matches!(self, StateKind::Learning | StateKind::Relearning)
    }
}

/// Scheduler-owned bookkeeping for one word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    pub stability: f64,
    pub difficulty: f64,
    pub reps: u32,
    pub lapses: u32,
    pub state_kind: StateKind,
    pub last_review_at: Option<DateTime<Utc>>,
    pub due_at: DateTime<Utc>,
}

impl MemoryState {
    /// Fresh card, due immediately.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            stability: 0.0,
            difficulty: 0.0,
            reps: 0,
            lapses: 0,
            state_kind: StateKind::New,
            last_review_at: None,
            due_at: now,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.due_at < now
    }
}

/// Result of one scheduler step.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOutcome {
    pub memory_state: MemoryState,
    pub due_at: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// The scheduler could not be reached or refused the call
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),

    /// The stored memory state cannot be advanced
    #[error("invalid memory state: {0}")]
    InvalidState(String),
}

/// Computes the next memory state for a rated review.
///
/// Implementations must be deterministic for identical inputs.
pub trait CardScheduler {
    fn advance(
        &self,
        state: &MemoryState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, SchedulerError>;
}

impl<T: CardScheduler + ?Sized> CardScheduler for &T {
    fn advance(
        &self,
        state: &MemoryState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        (**self).advance(state, rating, now)
    }
}

impl<T: CardScheduler + ?Sized> CardScheduler for Box<T> {
    fn advance(
        &self,
        state: &MemoryState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        (**self).advance(state, rating, now)
    }
}
