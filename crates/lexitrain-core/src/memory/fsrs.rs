//! Default in-process card scheduler based on FSRS.
//!
//! Learning and Relearning cards move in short minute-scale steps; Review
//! cards are scheduled in whole days from the stability estimate.

use chrono::{DateTime, Duration, Utc};

use super::{CardScheduler, MemoryState, Rating, ScheduleOutcome, SchedulerError, StateKind};

const DECAY: f64 = -0.5;
const FACTOR: f64 = 19.0 / 81.0;
const MIN_STABILITY: f64 = 0.1;
const MAX_INTERVAL_DAYS: f64 = 36500.0;

#[derive(Debug, Clone)]
struct FsrsParams {
    w: [f64; 17],
}

impl Default for FsrsParams {
    fn default() -> Self {
        Self {
            w: [
                0.4, 0.6, 2.4, 5.8, // initial stability per rating
                4.93, 0.94, 0.86, 0.01, 1.49, //
                0.14, 0.94, 2.18, 0.05, 0.34, //
                1.26, 0.29, 2.61, //
            ],
        }
    }
}

/// FSRS scheduler with fixed learning steps.
#[derive(Debug, Clone)]
pub struct FsrsScheduler {
    params: FsrsParams,
    desired_retention: f64,
}

impl FsrsScheduler {
    /// Retention is clamped to `0.7..=0.99`.
    pub fn new(desired_retention: f64) -> Self {
        Self {
            params: FsrsParams::default(),
            desired_retention: desired_retention.clamp(0.7, 0.99),
        }
    }

    pub fn desired_retention(&self) -> f64 {
        self.desired_retention
    }

    fn initial_stability(&self, rating: Rating) -> f64 {
        self.params.w[(rating.as_i32() - 1) as usize].max(MIN_STABILITY)
    }

    fn initial_difficulty(&self, rating: Rating) -> f64 {
        let w = &self.params.w;
        (w[4] - (rating.as_i32() - 3) as f64 * w[5]).clamp(1.0, 10.0)
    }

    fn next_difficulty(&self, d: f64, rating: Rating) -> f64 {
        let w = &self.params.w;
        let d_new = d - w[6] * (rating.as_i32() - 3) as f64;
        // Mean reversion towards the Easy-initial difficulty.
        let target = w[4] - w[5];
        (w[7] * target + (1.0 - w[7]) * d_new).clamp(1.0, 10.0)
    }

    fn recall_stability(&self, d: f64, s: f64, r: f64, rating: Rating) -> f64 {
        let w = &self.params.w;
        let hard_penalty = if rating == Rating::Hard { w[15] } else { 1.0 };
        let easy_bonus = if rating == Rating::Easy { w[16] } else { 1.0 };
        let growth = w[8].exp()
            * (11.0 - d)
            * s.powf(-w[9])
            * ((1.0 - r) * w[10]).exp_m1()
            * hard_penalty
            * easy_bonus;
        (s * (1.0 + growth)).max(MIN_STABILITY)
    }

    fn forget_stability(&self, d: f64, s: f64, r: f64) -> f64 {
        let w = &self.params.w;
        let new_s = w[11] * d.powf(-w[12]) * ((s + 1.0).powf(w[13]) - 1.0) * ((1.0 - r) * w[14]).exp();
        new_s.min(s).max(MIN_STABILITY)
    }

    fn interval_days(&self, stability: f64) -> i64 {
        let interval = stability / FACTOR * (self.desired_retention.powf(1.0 / DECAY) - 1.0);
        interval.round().clamp(1.0, MAX_INTERVAL_DAYS) as i64
    }

    fn learning_step(rating: Rating) -> Duration {
        match rating {
            Rating::Again => Duration::minutes(1),
            Rating::Hard => Duration::minutes(5),
            Rating::Good | Rating::Easy => Duration::minutes(10),
        }
    }
}

impl Default for FsrsScheduler {
    fn default() -> Self {
        Self::new(0.9)
    }
}

/// Probability of recall after `elapsed_days` at the given stability.
pub fn retrievability(stability: f64, elapsed_days: f64) -> f64 {
    if stability <= 0.0 {
        return 0.0;
    }
    (1.0 + FACTOR * elapsed_days.max(0.0) / stability).powf(DECAY)
}

impl CardScheduler for FsrsScheduler {
    fn advance(
        &self,
        state: &MemoryState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        if !state.stability.is_finite() || !state.difficulty.is_finite() {
            return Err(SchedulerError::InvalidState(format!(
                "non-finite stability {} / difficulty {}",
                state.stability, state.difficulty
            )));
        }

        let mut next = state.clone();
        next.reps = state.reps + 1;
        next.last_review_at = Some(now);

        let fresh = state.state_kind == StateKind::New || state.stability <= 0.0;
        if fresh {
            next.stability = self.initial_stability(rating);
            next.difficulty = self.initial_difficulty(rating);
            next.state_kind = if rating == Rating::Easy {
                StateKind::Review
            } else {
                StateKind::Learning
            };
        } else {
            let elapsed_days = state
                .last_review_at
                .map(|t| (now - t).num_seconds() as f64 / 86_400.0)
                .unwrap_or(0.0);
            let r = retrievability(state.stability, elapsed_days);
            next.difficulty = self.next_difficulty(state.difficulty, rating);

            match (state.state_kind, rating) {
                (StateKind::Review, Rating::Again) => {
                    next.stability = self.forget_stability(state.difficulty, state.stability, r);
                    next.lapses = state.lapses + 1;
                    next.state_kind = StateKind::Relearning;
                }
                (_, Rating::Again) => {
                    next.stability = self.forget_stability(state.difficulty, state.stability, r);
                }
                (kind, _) => {
                    next.stability = self.recall_stability(state.difficulty, state.stability, r, rating);
                    if kind.is_in_progress() && rating == Rating::Hard {
                        next.state_kind = kind;
                    } else {
                        next.state_kind = StateKind::Review;
                    }
                }
            }
        }

        next.due_at = if next.state_kind.is_in_progress() {
            now + Self::learning_step(rating)
        } else {
            now + Duration::days(self.interval_days(next.stability))
        };

        let due_at = next.due_at;
        Ok(ScheduleOutcome {
            memory_state: next,
            due_at,
        })
    }
}
