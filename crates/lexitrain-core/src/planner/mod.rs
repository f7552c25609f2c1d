//! Session planner.
//!
//! Builds a time-boxed, ordered list of exercises for one training session
//! and exposes it as a cursor-driven queue that failed words are re-queued
//! into.
//!
//! Candidate pools, highest priority first:
//! - overdue words, most overdue first
//! - words still in Learning/Relearning
//! - new words from unlocked tiers, by ascending frequency rank, capped by
//!   the remaining daily quota
//!
//! Pools are packed greedily into the time budget in that order, then the
//! packed set is ordered by [`spacing`].

pub mod spacing;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{Result, ValidationError};
use crate::mastery::{LearnerWordState, MIN_LEVEL};
use crate::rating::{ExerciseKind, MAX_EXERCISE_LEVEL};
use crate::tier::TierGate;
use crate::word::{WordCatalog, WordId};

pub use spacing::{is_well_spaced, NewWordsPosition, SPACING_WINDOW};

/// A re-queued word comes back this many slots after the next pending item.
pub const REQUEUE_OFFSET: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Full,
    /// Capped at `quick_session_seconds`.
    Quick,
    /// No new words.
    ReviewOnly,
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "full" => Ok(SessionMode::Full),
            "quick" => Ok(SessionMode::Quick),
            "review_only" => Ok(SessionMode::ReviewOnly),
            other => Err(format!("unknown session mode '{other}'")),
        }
    }
}

/// Why an item is in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOrigin {
    Overdue,
    InProgress,
    /// Introduction of a word never seen before.
    New,
    /// Recognition drill for a word introduced earlier in the same session.
    FollowUp,
    Requeued,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseItem {
    pub word_id: WordId,
    pub exercise_level: u8,
    pub origin: ItemOrigin,
}

impl ExerciseItem {
    pub fn new(word_id: WordId, exercise_level: u8, origin: ItemOrigin) -> Self {
        Self {
            word_id,
            exercise_level,
            origin,
        }
    }

    pub fn kind(&self) -> Option<ExerciseKind> {
        ExerciseKind::from_level(self.exercise_level)
    }
}

/// Result of [`SessionPlanner::advance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Advance {
    Exercise(ExerciseItem),
    EndOfSession,
}

/// One session's exercise queue.
///
/// `estimated_seconds` and the word counts describe the plan as created;
/// re-queued items do not change them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPlan {
    pub id: Uuid,
    pub mode: SessionMode,
    pub time_budget_seconds: u32,
    pub items: Vec<ExerciseItem>,
    /// Index of the next item `advance` hands out.
    pub next_index: usize,
    pub estimated_seconds: u32,
    pub new_word_count: u32,
    pub review_word_count: u32,
    pub created_at: DateTime<Utc>,
}

impl SessionPlan {
    fn empty(mode: SessionMode, time_budget_seconds: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            time_budget_seconds,
            items: Vec::new(),
            next_index: 0,
            estimated_seconds: 0,
            new_word_count: 0,
            review_word_count: 0,
            created_at: now,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item most recently handed out by `advance`.
    pub fn current(&self) -> Option<&ExerciseItem> {
        self.next_index.checked_sub(1).and_then(|i| self.items.get(i))
    }

    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.next_index)
    }

    pub fn is_finished(&self) -> bool {
        self.remaining() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Seconds per exercise, indexed by level - 1.
    pub time_costs: [u32; 7],
    pub new_words_position: NewWordsPosition,
    pub reviews_between_new: usize,
    pub daily_new_word_quota: u32,
    pub quick_session_seconds: u32,
    pub new_word_followup: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            time_costs: [4, 4, 10, 10, 20, 30, 30],
            new_words_position: NewWordsPosition::Middle,
            reviews_between_new: 3,
            daily_new_word_quota: 10,
            quick_session_seconds: 300,
            new_word_followup: true,
        }
    }
}

impl PlannerConfig {
    pub fn cost(&self, level: u8) -> u32 {
        let idx = level.clamp(MIN_LEVEL, MAX_EXERCISE_LEVEL) as usize - 1;
        self.time_costs[idx]
    }

    pub fn cheapest_cost(&self) -> u32 {
        self.time_costs.iter().copied().min().unwrap_or(0)
    }
}

/// Everything the planner reads besides its config.
pub struct PlanContext<'a, C: WordCatalog + ?Sized> {
    pub states: &'a [LearnerWordState],
    pub catalog: &'a C,
    pub gate: &'a TierGate,
    /// Words already introduced today, counted against the daily quota.
    pub new_words_today: u32,
}

/// Greedy packer with a single overflow allowance.
struct Packer {
    budget: u32,
    slack: u32,
    used: u32,
    slack_spent: bool,
}

impl Packer {
    fn new(budget: u32) -> Self {
        Self {
            budget,
            slack: budget / 10,
            used: 0,
            slack_spent: false,
        }
    }

    fn try_add(&mut self, cost: u32) -> bool {
        let total = self.used.saturating_add(cost);
        if total <= self.budget {
            self.used = total;
            true
        } else if !self.slack_spent && total <= self.budget.saturating_add(self.slack) {
            self.used = total;
            self.slack_spent = true;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionPlanner {
    config: PlannerConfig,
}

impl SessionPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Assemble a session plan.
    ///
    /// An empty candidate pool yields an empty plan, not an error.
    ///
    /// # Errors
    /// Returns `EmptyTimeBudget` when `time_budget_seconds` is zero.
    pub fn plan<C: WordCatalog + ?Sized>(
        &self,
        ctx: &PlanContext<'_, C>,
        time_budget_seconds: u32,
        mode: SessionMode,
        now: DateTime<Utc>,
    ) -> Result<SessionPlan> {
        if time_budget_seconds == 0 {
            return Err(ValidationError::EmptyTimeBudget.into());
        }
        let budget = match mode {
            SessionMode::Quick => time_budget_seconds.min(self.config.quick_session_seconds.max(1)),
            _ => time_budget_seconds,
        };

        let overdue = overdue_pool(ctx.states, now);
        let in_progress = in_progress_pool(ctx.states, &overdue);
        let new_words = if mode == SessionMode::ReviewOnly {
            Vec::new()
        } else {
            let quota = self.config.daily_new_word_quota.saturating_sub(ctx.new_words_today);
            new_pool(ctx, quota as usize)
        };
        tracing::debug!(
            overdue = overdue.len(),
            in_progress = in_progress.len(),
            new = new_words.len(),
            budget,
            "candidate pools assembled"
        );

        let mut packer = Packer::new(budget);
        let mut reviews = Vec::new();
        for (state, origin) in overdue
            .iter()
            .map(|s| (*s, ItemOrigin::Overdue))
            .chain(in_progress.iter().map(|s| (*s, ItemOrigin::InProgress)))
        {
            let level = state.mastery_level.max(MIN_LEVEL);
            if packer.try_add(self.config.cost(level)) {
                reviews.push(ExerciseItem::new(state.word_id, level, origin));
            }
        }

        let mut intros = Vec::new();
        let mut followups = Vec::new();
        let intro_level = ExerciseKind::Introduction.level();
        let followup_level = ExerciseKind::Recognition.level();
        for word_id in new_words {
            if !packer.try_add(self.config.cost(intro_level)) {
                continue;
            }
            intros.push(ExerciseItem::new(word_id, intro_level, ItemOrigin::New));
            if self.config.new_word_followup && packer.try_add(self.config.cost(followup_level)) {
                followups.push(ExerciseItem::new(word_id, followup_level, ItemOrigin::FollowUp));
            }
        }

        let mut plan = SessionPlan::empty(mode, time_budget_seconds, now);
        plan.review_word_count = reviews.len() as u32;
        plan.new_word_count = intros.len() as u32;

        let mut items = spacing::interleave(
            reviews,
            intros,
            self.config.new_words_position,
            self.config.reviews_between_new,
        );
        spacing::place_followups(&mut items, followups);
        spacing::enforce_spacing(&mut items);

        plan.estimated_seconds = items.iter().map(|i| self.config.cost(i.exercise_level)).sum();
        plan.items = items;

        tracing::debug!(
            plan_id = %plan.id,
            items = plan.items.len(),
            estimated_seconds = plan.estimated_seconds,
            new_words = plan.new_word_count,
            reviews = plan.review_word_count,
            "session planned"
        );
        Ok(plan)
    }

    /// Hand out the next exercise and move the cursor past it.
    pub fn advance(&self, plan: &mut SessionPlan) -> Advance {
        match plan.items.get(plan.next_index) {
            Some(item) => {
                let item = item.clone();
                plan.next_index += 1;
                Advance::Exercise(item)
            }
            None => Advance::EndOfSession,
        }
    }

    /// Re-offer a failed word later in the session.
    ///
    /// The re-attempt lands `REQUEUE_OFFSET` slots past the next pending item,
    /// or at the end when fewer slots remain. A pending entry for the same
    /// word already sitting next to that slot is turned into the re-attempt
    /// instead, so the word is never lined up twice in a row. Pending entries
    /// in the two slots right after the cursor are moved behind the
    /// re-attempt; follow-up drills among them are dropped. Returns the index
    /// of the re-attempt.
    pub fn requeue(&self, plan: &mut SessionPlan, word_id: WordId, exercise_level: u8) -> usize {
        let next = plan.next_index;
        let mut displaced = Vec::new();
        let mut idx = next;
        while idx < (next + SPACING_WINDOW - 1).min(plan.items.len()) {
            if plan.items[idx].word_id == word_id {
                let item = plan.items.remove(idx);
                if item.origin != ItemOrigin::FollowUp {
                    displaced.push(item);
                }
            } else {
                idx += 1;
            }
        }

        let retry = ExerciseItem::new(word_id, exercise_level, ItemOrigin::Requeued);
        let target = next + REQUEUE_OFFSET;
        let zone_start = (target - 1).min(plan.items.len());
        let zone_end = (target + SPACING_WINDOW - 1).min(plan.items.len());
        let existing = plan.items[zone_start..zone_end]
            .iter()
            .position(|item| item.word_id == word_id);

        let at = match existing {
            Some(offset) => {
                let at = zone_start + offset;
                plan.items[at] = retry;
                at
            }
            None => {
                let at = target.min(plan.items.len());
                plan.items.insert(at, retry);
                at
            }
        };

        for (n, item) in displaced.into_iter().enumerate() {
            let position = (at + SPACING_WINDOW * (n + 1)).min(plan.items.len());
            plan.items.insert(position, item);
        }

        tracing::debug!(
            plan_id = %plan.id,
            word_id,
            exercise_level,
            position = at,
            merged = existing.is_some(),
            "word re-queued"
        );
        at
    }
}

fn overdue_pool(states: &[LearnerWordState], now: DateTime<Utc>) -> Vec<&LearnerWordState> {
    let mut pool: Vec<&LearnerWordState> = states
        .iter()
        .filter(|s| s.is_introduced() && s.memory_state.is_overdue(now))
        .collect();
    pool.sort_by_key(|s| (s.memory_state.due_at, s.word_id));
    pool
}

fn in_progress_pool<'a>(
    states: &'a [LearnerWordState],
    overdue: &[&LearnerWordState],
) -> Vec<&'a LearnerWordState> {
    let taken: HashSet<WordId> = overdue.iter().map(|s| s.word_id).collect();
    let mut pool: Vec<&LearnerWordState> = states
        .iter()
        .filter(|s| {
            s.is_introduced()
                && s.memory_state.state_kind.is_in_progress()
                && !taken.contains(&s.word_id)
        })
        .collect();
    pool.sort_by_key(|s| (s.memory_state.due_at, s.word_id));
    pool
}

fn new_pool<C: WordCatalog + ?Sized>(ctx: &PlanContext<'_, C>, quota: usize) -> Vec<WordId> {
    if quota == 0 {
        return Vec::new();
    }
    let introduced: HashSet<WordId> = ctx
        .states
        .iter()
        .filter(|s| s.is_introduced())
        .map(|s| s.word_id)
        .collect();

    let mut picked = Vec::with_capacity(quota);
    for range in ctx.gate.unlocked_ranges() {
        for word_id in ctx.catalog.list_by_rank_range(range) {
            if introduced.contains(&word_id) || picked.contains(&word_id) {
                continue;
            }
            picked.push(word_id);
            if picked.len() == quota {
                return picked;
            }
        }
    }
    picked
}
