//! Applies one answered exercise to persisted learner state.
//!
//! A commit evaluates the answer, derives a rating, advances the card
//! scheduler and the mastery machine with it, then writes the word, the
//! review log row, the day's aggregates and any tier unlock inside a single
//! SQLite transaction. A failed rating re-queues the word in the live plan.
//!
//! A scheduler failure does not abort the commit: the previous memory state
//! is kept and mastery and re-queue still apply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingError};
use crate::mastery::{LearnerWordState, MasteryStateMachine, TransitionReason};
use crate::memory::{CardScheduler, Rating};
use crate::planner::{SessionPlan, SessionPlanner};
use crate::rating::{ExerciseAnswer, ExerciseKind, RatingDeriver};
use crate::storage::database::{self, DailyDelta};
use crate::storage::{Database, ReviewLogEntry};
use crate::tier::TierGate;
use crate::word::{WordCatalog, WordId};

/// Feedback for the caller after one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitResult {
    pub word_id: WordId,
    pub rating: Rating,
    pub correct: bool,
    pub mastery_changed: bool,
    pub previous_mastery_level: u8,
    pub new_mastery_level: u8,
    pub transition: TransitionReason,
    pub next_due_at: DateTime<Utc>,
    /// The scheduler failed and the previous due date was kept.
    pub scheduler_degraded: bool,
    /// Plan index of the re-queued entry.
    pub requeued_at: Option<usize>,
    /// Tier opened by this commit.
    pub tier_unlocked: Option<u32>,
}

/// Collaborators a commit reads from and writes to.
pub struct RecordContext<'a, C: WordCatalog + ?Sized, S: CardScheduler + ?Sized> {
    pub db: &'a mut Database,
    pub catalog: &'a C,
    pub scheduler: &'a S,
    pub gate: &'a mut TierGate,
    pub planner: &'a SessionPlanner,
}

#[derive(Debug, Clone, Default)]
pub struct SessionRecorder {
    deriver: RatingDeriver,
    mastery: MasteryStateMachine,
}

impl SessionRecorder {
    pub fn new(deriver: RatingDeriver, mastery: MasteryStateMachine) -> Self {
        Self { deriver, mastery }
    }

    pub fn deriver(&self) -> &RatingDeriver {
        &self.deriver
    }

    pub fn mastery(&self) -> &MasteryStateMachine {
        &self.mastery
    }

    /// State the answer applies to: the stored one, or a fresh one for an
    /// introduction of a word never seen before.
    fn load_state<C: WordCatalog + ?Sized>(
        &self,
        db: &Database,
        catalog: &C,
        answer: &ExerciseAnswer,
        now: DateTime<Utc>,
    ) -> Result<LearnerWordState> {
        if let Some(state) = db.load_word_state(answer.word_id)? {
            return Ok(state);
        }
        if answer.exercise_level != ExerciseKind::Introduction.level() {
            return Err(TrainingError::MissingWordState {
                word_id: answer.word_id,
            }
            .into());
        }
        let word = catalog.lookup(answer.word_id).ok_or(TrainingError::UnknownWord {
            word_id: answer.word_id,
        })?;
        Ok(LearnerWordState::unseen(word.id, word.frequency_rank, now))
    }

    /// Commit one answer.
    ///
    /// # Errors
    /// `InvalidAnswer`, `MissingWordState` and `UnknownWord` leave every
    /// store untouched. A storage failure rolls the transaction back and
    /// leaves the tier gate and the plan unchanged.
    pub fn record<C, S>(
        &self,
        ctx: RecordContext<'_, C, S>,
        plan: &mut SessionPlan,
        answer: &ExerciseAnswer,
        now: DateTime<Utc>,
    ) -> Result<CommitResult>
    where
        C: WordCatalog + ?Sized,
        S: CardScheduler + ?Sized,
    {
        let (signal, rating) = self.deriver.derive_answer(answer)?;
        let mut state = self.load_state(ctx.db, ctx.catalog, answer, now)?;
        let introduced_now = !state.is_introduced();

        let scheduled = match ctx.scheduler.advance(&state.memory_state, rating, now) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                let err = TrainingError::SchedulerUnavailable {
                    word_id: answer.word_id,
                    message: err.to_string(),
                };
                tracing::warn!(%err, "keeping previous memory state");
                None
            }
        };

        let transition = self
            .mastery
            .apply(&mut state, rating, scheduled.as_ref().map(|o| &o.memory_state));
        if let Some(outcome) = &scheduled {
            state.memory_state = outcome.memory_state.clone();
        }
        state.last_answered_at = Some(now);

        let tier_number = ctx.gate.resolve_tier(state.word_id, state.frequency_rank);
        let mut next_gate = ctx.gate.clone();
        let mut tier_unlocked = None;

        let tx = ctx.db.transaction()?;
        database::save_word_state(&tx, &state)?;
        database::insert_review(
            &tx,
            &ReviewLogEntry {
                word_id: state.word_id,
                exercise_level: answer.exercise_level,
                rating,
                correct: signal.correct,
                response_time_ms: answer.response_time_ms,
                mastery_before: transition.previous_level,
                mastery_after: transition.new_level,
                reviewed_at: now,
            },
        )?;
        database::bump_daily_stats(
            &tx,
            now.date_naive(),
            DailyDelta {
                reviewed: 1,
                learned: u32::from(introduced_now),
                correct: u32::from(signal.correct),
                time_spent_ms: answer.response_time_ms,
            },
        )?;
        if transition.changed() {
            let next_tier = tier_number + 1;
            let was_unlocked = next_gate.is_unlocked(next_tier);
            if next_gate.recompute(tier_number, ctx.catalog, &*tx, now)? && !was_unlocked {
                if let Some(record) = next_gate.tier(next_tier) {
                    database::save_tier(&tx, record)?;
                }
                tier_unlocked = Some(next_tier);
            }
        }
        tx.commit()?;
        *ctx.gate = next_gate;

        if transition.changed() {
            tracing::info!(
                word_id = state.word_id,
                from = transition.previous_level,
                to = transition.new_level,
                reason = ?transition.reason,
                "mastery level changed"
            );
        }

        let requeued_at = (rating == Rating::Again)
            .then(|| ctx.planner.requeue(plan, state.word_id, state.mastery_level));

        Ok(CommitResult {
            word_id: state.word_id,
            rating,
            correct: signal.correct,
            mastery_changed: transition.changed(),
            previous_mastery_level: transition.previous_level,
            new_mastery_level: transition.new_level,
            transition: transition.reason,
            next_due_at: state.memory_state.due_at,
            scheduler_degraded: scheduled.is_none(),
            requeued_at,
            tier_unlocked,
        })
    }
}
