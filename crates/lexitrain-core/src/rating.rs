//! Rating derivation.
//!
//! Turns a raw answer into one of the four [`Rating`] levels. The decision
//! table is evaluated top to bottom:
//!
//! 1. skipped / revealed            -> Again
//! 2. wrong, no near-miss distance  -> Again
//! 3. wrong, typed, distance 1, target longer than 4 chars -> Hard
//! 4. correct and faster than the level's threshold -> Easy
//! 5. correct                       -> Good
//!
//! Anything else that is wrong falls through to Again.

use serde::{Deserialize, Serialize};

use crate::error::TrainingError;
use crate::memory::Rating;
use crate::word::WordId;

/// Longest typo tolerated by the near-miss rule.
pub const NEAR_MISS_DISTANCE: u32 = 1;
/// The near-miss rule only applies to targets longer than this.
pub const NEAR_MISS_MIN_LEN: usize = 4;

pub const MIN_EXERCISE_LEVEL: u8 = 1;
pub const MAX_EXERCISE_LEVEL: u8 = 7;

/// Exercise kind for each level 1-7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    Introduction,
    Recognition,
    Recall,
    Context,
    SentenceBuilder,
    FreeProduction,
    Listening,
}

impl ExerciseKind {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(ExerciseKind::Introduction),
            2 => Some(ExerciseKind::Recognition),
            3 => Some(ExerciseKind::Recall),
            4 => Some(ExerciseKind::Context),
            5 => Some(ExerciseKind::SentenceBuilder),
            6 => Some(ExerciseKind::FreeProduction),
            7 => Some(ExerciseKind::Listening),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        self as u8 + 1
    }

    /// Kinds where the learner types the target word character by character.
    pub fn is_typed(self) -> bool {
        matches!(self, ExerciseKind::Recall | ExerciseKind::Listening)
    }

    pub fn is_multiple_choice(self) -> bool {
        matches!(self, ExerciseKind::Recognition | ExerciseKind::Context)
    }

    pub fn label(self) -> &'static str {
        match self {
            ExerciseKind::Introduction => "Introduction",
            ExerciseKind::Recognition => "Recognition",
            ExerciseKind::Recall => "Recall",
            ExerciseKind::Context => "Context",
            ExerciseKind::SentenceBuilder => "Sentence Builder",
            ExerciseKind::FreeProduction => "Free Production",
            ExerciseKind::Listening => "Listening",
        }
    }
}

/// What the learner submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawAnswer {
    /// Free text compared against `expected`.
    Typed { given: String, expected: String },
    /// One option picked out of a fixed set.
    Choice { chosen: String, expected: String },
    /// Learner confirmed having seen the card (introduction, free production).
    Acknowledged,
    /// Learner gave up or asked to reveal the answer.
    Skipped,
}

/// One answered exercise, produced by the caller and consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseAnswer {
    pub word_id: WordId,
    pub exercise_level: u8,
    pub raw_answer: RawAnswer,
    pub response_time_ms: u64,
}

/// Normalised facts about an answer, the input of the decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSignal {
    pub exercise_level: u8,
    pub correct: bool,
    pub skipped: bool,
    pub response_time_ms: u64,
    /// Levenshtein distance for typed answers, `None` for choice answers.
    pub edit_distance: Option<u32>,
    /// Character length of the expected answer.
    pub target_len: usize,
}

pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Character-level Levenshtein distance.
pub fn levenshtein_distance(a: &str, b: &str) -> u32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len() as u32;
    }
    if b.is_empty() {
        return a.len() as u32;
    }

    let mut prev: Vec<u32> = (0..=b.len() as u32).collect();
    let mut curr = vec![0u32; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i as u32 + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + u32::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Validate an answer and reduce it to an [`AnswerSignal`].
///
/// # Errors
/// Returns `InvalidAnswer` for empty submissions and out-of-range levels.
pub fn evaluate(answer: &ExerciseAnswer) -> Result<AnswerSignal, TrainingError> {
    let invalid = |reason: &str| TrainingError::InvalidAnswer {
        word_id: answer.word_id,
        reason: reason.to_string(),
    };

    if ExerciseKind::from_level(answer.exercise_level).is_none() {
        return Err(invalid("exercise level outside 1..=7"));
    }

    let mut signal = AnswerSignal {
        exercise_level: answer.exercise_level,
        correct: false,
        skipped: false,
        response_time_ms: answer.response_time_ms,
        edit_distance: None,
        target_len: 0,
    };

    match &answer.raw_answer {
        RawAnswer::Typed { given, expected } => {
            let given = normalize_text(given);
            let expected = normalize_text(expected);
            if given.is_empty() {
                return Err(invalid("empty answer"));
            }
            if expected.is_empty() {
                return Err(invalid("no expected answer to compare against"));
            }
            let distance = levenshtein_distance(&given, &expected);
            signal.correct = distance == 0;
            signal.edit_distance = Some(distance);
            signal.target_len = expected.chars().count();
        }
        RawAnswer::Choice { chosen, expected } => {
            let chosen = normalize_text(chosen);
            let expected = normalize_text(expected);
            if chosen.is_empty() {
                return Err(invalid("no option selected"));
            }
            signal.correct = chosen == expected;
            signal.target_len = expected.chars().count();
        }
        RawAnswer::Acknowledged => {
            signal.correct = true;
        }
        RawAnswer::Skipped => {
            signal.skipped = true;
        }
    }

    Ok(signal)
}

/// Fast-answer thresholds in milliseconds, indexed by level 1-7.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastAnswerThresholds(pub [u64; 7]);

impl Default for FastAnswerThresholds {
    fn default() -> Self {
        Self([3000, 3000, 5000, 5000, 15000, 20000, 8000])
    }
}

impl FastAnswerThresholds {
    pub fn for_level(&self, level: u8) -> u64 {
        let idx = level.clamp(MIN_EXERCISE_LEVEL, MAX_EXERCISE_LEVEL) as usize - 1;
        self.0[idx]
    }
}

/// Maps an [`AnswerSignal`] to a [`Rating`].
#[derive(Debug, Clone, Default)]
pub struct RatingDeriver {
    thresholds: FastAnswerThresholds,
}

impl RatingDeriver {
    pub fn new(thresholds: FastAnswerThresholds) -> Self {
        Self { thresholds }
    }

    pub fn derive(&self, signal: &AnswerSignal) -> Rating {
        if signal.skipped {
            return Rating::Again;
        }

        if !signal.correct {
            let near_miss = match signal.edit_distance {
                None | Some(0) => false,
                Some(d) => {
                    d <= NEAR_MISS_DISTANCE
                        && signal.target_len > NEAR_MISS_MIN_LEN
                        && ExerciseKind::from_level(signal.exercise_level)
                            .map(ExerciseKind::is_typed)
                            .unwrap_or(false)
                }
            };
            return if near_miss { Rating::Hard } else { Rating::Again };
        }

        if signal.response_time_ms < self.thresholds.for_level(signal.exercise_level) {
            Rating::Easy
        } else {
            Rating::Good
        }
    }

    /// Convenience for `evaluate` followed by `derive`.
    ///
    /// # Errors
    /// Propagates `InvalidAnswer` from [`evaluate`].
    pub fn derive_answer(&self, answer: &ExerciseAnswer) -> Result<(AnswerSignal, Rating), TrainingError> {
        let signal = evaluate(answer)?;
        Ok((signal, self.derive(&signal)))
    }
}
