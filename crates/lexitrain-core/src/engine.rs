//! Planning API facade.
//!
//! [`TrainingEngine`] owns the database, catalog, scheduler and tier gate
//! and exposes the four session calls: `plan`, `advance`, `record` and
//! `current_tier_progress`. The session plan itself stays with the caller
//! and is passed into every call.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, DatabaseError, Result, TrainingError};
use crate::mastery::{LearnerWordState, MasteryStateMachine};
use crate::memory::{CardScheduler, FsrsScheduler};
use crate::planner::{Advance, ItemOrigin, PlanContext, SessionMode, SessionPlan, SessionPlanner};
use crate::rating::{ExerciseAnswer, RatingDeriver};
use crate::recorder::{CommitResult, RecordContext, SessionRecorder};
use crate::stats::{self, Dashboard, HeatmapDay};
use crate::storage::{Config, DailyStats, Database};
use crate::tier::{TierGate, TierProgress, TierRecord, TierStats};
use crate::word::{WordCatalog, WordId, WordRef};

/// Per-tier row for progress displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierOverview {
    pub record: TierRecord,
    pub stats: TierStats,
}

pub struct TrainingEngine<C, S = FsrsScheduler> {
    db: Database,
    catalog: C,
    scheduler: S,
    config: Config,
    gate: TierGate,
    planner: SessionPlanner,
    recorder: SessionRecorder,
}

impl<C: WordCatalog> TrainingEngine<C, FsrsScheduler> {
    /// Engine with the built-in FSRS scheduler.
    ///
    /// # Errors
    /// Fails on invalid configuration or storage errors.
    pub fn new(db: Database, catalog: C, config: Config, now: DateTime<Utc>) -> Result<Self> {
        let scheduler = FsrsScheduler::new(config.scheduler.desired_retention);
        Self::with_scheduler(db, catalog, scheduler, config, now)
    }
}

impl<C: WordCatalog, S: CardScheduler> TrainingEngine<C, S> {
    /// # Errors
    /// Fails on invalid configuration or storage errors.
    pub fn with_scheduler(
        db: Database,
        catalog: C,
        scheduler: S,
        config: Config,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        config.validate()?;
        let stored = db.load_tiers()?;
        let gate = TierGate::restore(
            &config.tiers.boundaries,
            config.training.unlock_threshold,
            &stored,
            now,
        )?;
        db.save_tiers(gate.tiers())?;

        let planner = SessionPlanner::with_config(config.planner_config());
        let recorder = SessionRecorder::new(
            RatingDeriver::new(config.fast_answer_thresholds()),
            MasteryStateMachine::with_config(config.mastery.clone()),
        );

        Ok(Self {
            db,
            catalog,
            scheduler,
            config,
            gate,
            planner,
            recorder,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn gate(&self) -> &TierGate {
        &self.gate
    }

    pub fn word(&self, word_id: WordId) -> Option<WordRef> {
        self.catalog.lookup(word_id)
    }

    /// # Errors
    /// Propagates database failures.
    pub fn word_state(&self, word_id: WordId) -> Result<Option<LearnerWordState>> {
        self.db.load_word_state(word_id)
    }

    /// Plan a session.
    ///
    /// # Errors
    /// Zero budget or storage failure.
    pub fn plan(&self, time_budget_seconds: u32, mode: SessionMode, now: DateTime<Utc>) -> Result<SessionPlan> {
        let span = tracing::info_span!("plan", ?mode, budget = time_budget_seconds);
        let _enter = span.enter();

        let states = self.db.load_all_states()?;
        let today = self.db.daily_stats(now.date_naive())?;
        let ctx = PlanContext {
            states: &states,
            catalog: &self.catalog,
            gate: &self.gate,
            new_words_today: today.words_learned,
        };
        self.planner.plan(&ctx, time_budget_seconds, mode, now)
    }

    /// Plan a session of the configured default length.
    ///
    /// # Errors
    /// Storage failure.
    pub fn plan_default(&self, mode: SessionMode, now: DateTime<Utc>) -> Result<SessionPlan> {
        self.plan(self.config.session_seconds(), mode, now)
    }

    /// Next exercise, skipping review items whose learner state is gone or
    /// unreadable.
    ///
    /// # Errors
    /// Storage failures other than a corrupt row.
    pub fn advance(&self, plan: &mut SessionPlan) -> Result<Advance> {
        loop {
            let item = match self.planner.advance(plan) {
                Advance::EndOfSession => return Ok(Advance::EndOfSession),
                Advance::Exercise(item) => item,
            };
            if item.origin == ItemOrigin::New {
                return Ok(Advance::Exercise(item));
            }
            match self.db.load_word_state(item.word_id) {
                Ok(Some(_)) => return Ok(Advance::Exercise(item)),
                Ok(None) => {
                    let err = TrainingError::MissingWordState { word_id: item.word_id };
                    tracing::warn!(plan_id = %plan.id, %err, "skipping exercise");
                }
                Err(CoreError::Database(err @ DatabaseError::CorruptRow { .. })) => {
                    tracing::warn!(plan_id = %plan.id, word_id = item.word_id, %err, "skipping exercise");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Commit an answer.
    ///
    /// # Errors
    /// Exercise-scoped [`TrainingError`]s leave all state untouched and the
    /// session can continue; storage errors are returned as-is.
    pub fn record(
        &mut self,
        plan: &mut SessionPlan,
        answer: &ExerciseAnswer,
        now: DateTime<Utc>,
    ) -> Result<CommitResult> {
        let span = tracing::info_span!("record", plan_id = %plan.id, word_id = answer.word_id);
        let _enter = span.enter();

        let ctx = RecordContext {
            db: &mut self.db,
            catalog: &self.catalog,
            scheduler: &self.scheduler,
            gate: &mut self.gate,
            planner: &self.planner,
        };
        let result = self.recorder.record(ctx, plan, answer, now);
        if let Err(err) = &result {
            tracing::warn!(%err, "answer not recorded");
        }
        result
    }

    /// # Errors
    /// Propagates database failures.
    pub fn current_tier_progress(&self) -> Result<TierProgress> {
        self.gate.progress(&self.catalog, &self.db)
    }

    /// Every tier with its recall numbers.
    ///
    /// # Errors
    /// Propagates database failures.
    pub fn tier_overview(&self) -> Result<Vec<TierOverview>> {
        let mut out = Vec::with_capacity(self.gate.tiers().len());
        for record in self.gate.tiers() {
            if let Some(stats) = self.gate.stats(record.tier_number, &self.catalog, &self.db)? {
                out.push(TierOverview {
                    record: record.clone(),
                    stats,
                });
            }
        }
        Ok(out)
    }

    /// # Errors
    /// Propagates database failures.
    pub fn today(&self, today: NaiveDate) -> Result<DailyStats> {
        stats::today(&self.db, today)
    }

    /// # Errors
    /// Propagates database failures.
    pub fn dashboard(&self, today: NaiveDate) -> Result<Dashboard> {
        stats::dashboard(&self.db, today)
    }

    /// # Errors
    /// Propagates database failures.
    pub fn heatmap(&self, year: i32) -> Result<Vec<HeatmapDay>> {
        stats::heatmap(&self.db, year)
    }
}
