//! Per-word mastery state machine.
//!
//! Mastery decides *what kind* of exercise a word gets next; the card
//! scheduler separately decides *when*. Both are advanced with the same
//! rating but never read each other's counters.
//!
//! ## Levels
//!
//! ```text
//! 0 (unseen) --introduce--> 1 <-> 2 <-> ... <-> 7
//! ```
//!
//! - +1 after `promotion_streak` consecutive Good/Easy at the current level
//! - -1 after `demotion_streak` consecutive Again at the current level
//! - -2 instead when the scheduler reports a fresh lapse into Relearning
//!   with stability below `severe_lapse_stability`
//!
//! Level 0 is left exactly once and never re-entered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{MemoryState, Rating, StateKind};
use crate::word::WordId;

pub const UNSEEN_LEVEL: u8 = 0;
pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 7;
/// Words at or above this level count as recalled for tier gating.
pub const RECALL_LEVEL: u8 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryConfig {
    #[serde(default = "default_promotion_streak")]
    pub promotion_streak: u32,
    #[serde(default = "default_demotion_streak")]
    pub demotion_streak: u32,
    #[serde(default = "default_severe_lapse_stability")]
    pub severe_lapse_stability: f64,
}

fn default_promotion_streak() -> u32 {
    3
}
fn default_demotion_streak() -> u32 {
    2
}
fn default_severe_lapse_stability() -> f64 {
    0.5
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            promotion_streak: default_promotion_streak(),
            demotion_streak: default_demotion_streak(),
            severe_lapse_stability: default_severe_lapse_stability(),
        }
    }
}

/// One learner's progress on one word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerWordState {
    pub word_id: WordId,
    /// Copied from the catalog at introduction so tier counts can be done
    /// without a catalog round trip.
    pub frequency_rank: u32,
    pub mastery_level: u8,
    pub consecutive_correct: u32,
    pub consecutive_wrong: u32,
    pub memory_state: MemoryState,
    pub created_at: DateTime<Utc>,
    pub last_answered_at: Option<DateTime<Utc>>,
}

impl LearnerWordState {
    /// State for a word that has not been introduced yet.
    pub fn unseen(word_id: WordId, frequency_rank: u32, now: DateTime<Utc>) -> Self {
        Self {
            word_id,
            frequency_rank,
            mastery_level: UNSEEN_LEVEL,
            consecutive_correct: 0,
            consecutive_wrong: 0,
            memory_state: MemoryState::new(now),
            created_at: now,
            last_answered_at: None,
        }
    }

    pub fn is_introduced(&self) -> bool {
        self.mastery_level >= MIN_LEVEL
    }

    /// Level 0 only while the scheduler has never seen the word.
    pub fn is_consistent(&self) -> bool {
        let level_ok = self.mastery_level <= MAX_LEVEL;
        let floor_ok = self.memory_state.state_kind == StateKind::New || self.is_introduced();
        level_ok && floor_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Introduced,
    Promoted,
    Demoted,
    SevereLapse,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasteryTransition {
    pub previous_level: u8,
    pub new_level: u8,
    pub reason: TransitionReason,
}

impl MasteryTransition {
    pub fn changed(&self) -> bool {
        self.previous_level != self.new_level
    }
}

#[derive(Debug, Clone, Default)]
pub struct MasteryStateMachine {
    config: MasteryConfig,
}

impl MasteryStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MasteryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MasteryConfig {
        &self.config
    }

    /// Move an unseen word to level 1. No-op for introduced words.
    pub fn introduce(&self, state: &mut LearnerWordState) -> MasteryTransition {
        let previous_level = state.mastery_level;
        if state.is_introduced() {
            return MasteryTransition {
                previous_level,
                new_level: previous_level,
                reason: TransitionReason::Unchanged,
            };
        }
        state.mastery_level = MIN_LEVEL;
        state.consecutive_correct = 0;
        state.consecutive_wrong = 0;
        MasteryTransition {
            previous_level,
            new_level: MIN_LEVEL,
            reason: TransitionReason::Introduced,
        }
    }

    /// True when `updated` is a fresh lapse into Relearning with fragile stability.
    pub fn is_severe_lapse(&self, previous: &MemoryState, updated: &MemoryState) -> bool {
        updated.state_kind == StateKind::Relearning
            && previous.state_kind != StateKind::Relearning
            && updated.stability < self.config.severe_lapse_stability
    }

    /// Apply one rating.
    ///
    /// `scheduled` is the memory state the scheduler produced for the same
    /// rating, or `None` when the scheduler call failed. `state.memory_state`
    /// must still hold the pre-review memory state; the caller stores
    /// `scheduled` afterwards.
    pub fn apply(
        &self,
        state: &mut LearnerWordState,
        rating: Rating,
        scheduled: Option<&MemoryState>,
    ) -> MasteryTransition {
        let intro = self.introduce(state);
        let previous_level = state.mastery_level;

        match rating {
            Rating::Good | Rating::Easy => {
                state.consecutive_correct += 1;
                state.consecutive_wrong = 0;
            }
            Rating::Again => {
                state.consecutive_wrong += 1;
                state.consecutive_correct = 0;
            }
            Rating::Hard => {
                state.consecutive_correct = 0;
                state.consecutive_wrong = 0;
            }
        }

        let severe = scheduled
            .map(|updated| self.is_severe_lapse(&state.memory_state, updated))
            .unwrap_or(false);

        let (target, reason) = if severe {
            (previous_level.saturating_sub(2), TransitionReason::SevereLapse)
        } else if state.consecutive_wrong >= self.config.demotion_streak {
            (previous_level.saturating_sub(1), TransitionReason::Demoted)
        } else if state.consecutive_correct >= self.config.promotion_streak {
            (previous_level + 1, TransitionReason::Promoted)
        } else {
            (previous_level, TransitionReason::Unchanged)
        };

        let new_level = target.clamp(MIN_LEVEL, MAX_LEVEL);
        if reason != TransitionReason::Unchanged {
            state.consecutive_correct = 0;
            state.consecutive_wrong = 0;
        }
        state.mastery_level = new_level;

        let reason = if new_level != previous_level {
            reason
        } else if intro.changed() {
            TransitionReason::Introduced
        } else {
            TransitionReason::Unchanged
        };

        MasteryTransition {
            previous_level: intro.previous_level,
            new_level,
            reason,
        }
    }
}
