//! Integration tests for a full training session.
//!
//! These drive the engine end to end against an in-memory database:
//! planning, advancing, committing answers, re-queueing failed words and
//! unlocking tiers.

use chrono::{DateTime, Duration, TimeZone, Utc};
use lexitrain_core::{
    Advance, CardScheduler, Config, CoreError, Database, ExerciseAnswer, ItemOrigin, LearnerWordState,
    MemoryCatalog, MemoryState, Rating, RawAnswer, ScheduleOutcome, SchedulerError, SessionMode, StateKind,
    TrainingEngine, TrainingError, TransitionReason, WordRef,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 5, 18, 0, 0).unwrap()
}

/// Words 1..=n with rank equal to id.
fn catalog(n: i64) -> MemoryCatalog {
    MemoryCatalog::new((1..=n).map(|id| WordRef {
        id,
        frequency_rank: id as u32,
        part_of_speech: None,
        lemma: format!("word{id}"),
        translations: vec![format!("mot{id}")],
    }))
}

fn config() -> Config {
    let mut config = Config::default();
    config.tiers.boundaries = vec![10, 20];
    config
}

/// Introduced word in Review, overdue by a day.
fn review_state(id: i64, level: u8) -> LearnerWordState {
    let mut s = LearnerWordState::unseen(id, id as u32, now() - Duration::days(20));
    s.mastery_level = level;
    s.memory_state = MemoryState {
        stability: 5.0,
        difficulty: 5.0,
        reps: 4,
        lapses: 0,
        state_kind: StateKind::Review,
        last_review_at: Some(now() - Duration::days(6)),
        due_at: now() - Duration::days(1),
    };
    s.last_answered_at = Some(now() - Duration::days(6));
    s
}

fn seeded_db(states: &[LearnerWordState]) -> Database {
    let db = Database::open_memory().unwrap();
    for s in states {
        db.save_word_state(s).unwrap();
    }
    db
}

fn typed(word_id: i64, level: u8, given: &str, expected: &str, ms: u64) -> ExerciseAnswer {
    ExerciseAnswer {
        word_id,
        exercise_level: level,
        raw_answer: RawAnswer::Typed {
            given: given.into(),
            expected: expected.into(),
        },
        response_time_ms: ms,
    }
}

fn acknowledged(word_id: i64, ms: u64) -> ExerciseAnswer {
    ExerciseAnswer {
        word_id,
        exercise_level: 1,
        raw_answer: RawAnswer::Acknowledged,
        response_time_ms: ms,
    }
}

fn expect_exercise(advance: Advance) -> lexitrain_core::ExerciseItem {
    match advance {
        Advance::Exercise(item) => item,
        Advance::EndOfSession => panic!("session ended early"),
    }
}

struct OfflineScheduler;

impl CardScheduler for OfflineScheduler {
    fn advance(
        &self,
        _state: &MemoryState,
        _rating: Rating,
        _now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        Err(SchedulerError::Unavailable("offline".into()))
    }
}

#[test]
fn test_fresh_learner_gets_new_words_from_first_tier() {
    let engine = TrainingEngine::new(Database::open_memory().unwrap(), catalog(20), config(), now()).unwrap();

    let plan = engine.plan(600, SessionMode::Full, now()).unwrap();

    assert_eq!(plan.new_word_count, 10);
    assert_eq!(plan.review_word_count, 0);
    assert!(plan
        .items
        .iter()
        .filter(|i| i.origin == ItemOrigin::New)
        .all(|i| i.word_id <= 10 && i.exercise_level == 1));
    assert!(lexitrain_core::planner::is_well_spaced(&plan.items));
}

#[test]
fn test_introduction_creates_state_and_counts_against_quota() {
    let mut engine = TrainingEngine::new(Database::open_memory().unwrap(), catalog(20), config(), now()).unwrap();
    let mut plan = engine.plan(600, SessionMode::Full, now()).unwrap();

    let item = expect_exercise(engine.advance(&mut plan).unwrap());
    assert_eq!(item.origin, ItemOrigin::New);

    let result = engine.record(&mut plan, &acknowledged(item.word_id, 5000), now()).unwrap();
    assert_eq!(result.rating, Rating::Good);
    assert_eq!(result.previous_mastery_level, 0);
    assert_eq!(result.new_mastery_level, 1);
    assert_eq!(result.transition, TransitionReason::Introduced);
    assert!(result.requeued_at.is_none());

    let state = engine.word_state(item.word_id).unwrap().unwrap();
    assert_eq!(state.mastery_level, 1);
    assert_eq!(state.memory_state.state_kind, StateKind::Learning);

    let today = engine.today(now().date_naive()).unwrap();
    assert_eq!(today.words_learned, 1);
    assert_eq!(today.words_reviewed, 1);
    assert_eq!(today.correct_count, 1);

    let later = now() + Duration::minutes(30);
    let next = engine.plan(600, SessionMode::Full, later).unwrap();
    assert_eq!(next.new_word_count, 9);
    assert!(next
        .items
        .iter()
        .any(|i| i.word_id == item.word_id && i.origin != ItemOrigin::New));
}

#[test]
fn test_failed_word_is_requeued_three_slots_ahead() {
    let states: Vec<_> = (1..=5).map(|id| review_state(id, 3)).collect();
    let mut engine = TrainingEngine::new(seeded_db(&states), catalog(20), config(), now()).unwrap();
    let mut plan = engine.plan(300, SessionMode::ReviewOnly, now()).unwrap();
    assert_eq!(plan.len(), 5);

    let item = expect_exercise(engine.advance(&mut plan).unwrap());
    let answer = typed(item.word_id, 3, "zzz", "apple", 4000);
    let result = engine.record(&mut plan, &answer, now()).unwrap();

    assert_eq!(result.rating, Rating::Again);
    assert!(!result.correct);
    assert_eq!(result.requeued_at, Some(4));
    assert_eq!(plan.len(), 6);
    assert_eq!(plan.items[4].word_id, item.word_id);
    assert_eq!(plan.items[4].origin, ItemOrigin::Requeued);
    assert!((1..=3).contains(&result.new_mastery_level));

    let mut seen = Vec::new();
    while let Advance::Exercise(next) = engine.advance(&mut plan).unwrap() {
        seen.push(next.word_id);
    }
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[3], item.word_id);
    assert!(!seen[..2].contains(&item.word_id));
}

#[test]
fn test_scenario_a_three_goods_promote_through_engine() {
    let mut engine = TrainingEngine::new(seeded_db(&[review_state(1, 3)]), catalog(20), config(), now()).unwrap();
    let mut plan = engine.plan(300, SessionMode::ReviewOnly, now()).unwrap();

    let mut last = None;
    for _ in 0..3 {
        let answer = typed(1, 3, "word1", "word1", 9000);
        last = Some(engine.record(&mut plan, &answer, now()).unwrap());
    }

    let last = last.unwrap();
    assert_eq!(last.rating, Rating::Good);
    assert_eq!(last.new_mastery_level, 4);
    assert_eq!(last.transition, TransitionReason::Promoted);
    assert_eq!(engine.word_state(1).unwrap().unwrap().mastery_level, 4);
}

#[test]
fn test_scenario_d_quick_plan_without_new_candidates() {
    // Every tier-1 word is already introduced, so only reviews remain.
    let states: Vec<_> = (1..=10).map(|id| review_state(id, 2)).collect();
    let engine = TrainingEngine::new(seeded_db(&states), catalog(10), config(), now()).unwrap();

    let plan = engine.plan(300, SessionMode::Quick, now()).unwrap();

    assert_eq!(plan.new_word_count, 0);
    assert!(plan.review_word_count > 0);
    assert!(plan.estimated_seconds <= 330);
}

#[test]
fn test_tier_unlocks_when_commit_reaches_threshold() {
    let mut states: Vec<_> = (1..=7).map(|id| review_state(id, 3)).collect();
    let mut almost = review_state(8, 2);
    almost.consecutive_correct = 2;
    states.push(almost);
    let mut engine = TrainingEngine::new(seeded_db(&states), catalog(20), config(), now()).unwrap();
    assert!(!engine.gate().is_unlocked(2));

    let mut plan = engine.plan(300, SessionMode::ReviewOnly, now()).unwrap();
    let answer = ExerciseAnswer {
        word_id: 8,
        exercise_level: 2,
        raw_answer: RawAnswer::Choice {
            chosen: "mot8".into(),
            expected: "mot8".into(),
        },
        response_time_ms: 6000,
    };
    let result = engine.record(&mut plan, &answer, now()).unwrap();

    assert_eq!(result.new_mastery_level, 3);
    assert_eq!(result.tier_unlocked, Some(2));
    assert!(engine.gate().is_unlocked(2));

    let stored = engine.database().load_tiers().unwrap();
    assert!(stored.iter().any(|t| t.tier_number == 2 && t.unlocked));

    let progress = engine.current_tier_progress().unwrap();
    assert_eq!(progress.tier_number, 2);
    assert_eq!(progress.unlocked_tiers, vec![1, 2]);

    // New words now come from tier 2 as well.
    let next = engine.plan(600, SessionMode::Full, now()).unwrap();
    assert!(next
        .items
        .iter()
        .any(|i| i.origin == ItemOrigin::New && i.word_id > 10));
}

#[test]
fn test_unlocked_tier_survives_restart() {
    let mut states: Vec<_> = (1..=7).map(|id| review_state(id, 3)).collect();
    let mut almost = review_state(8, 2);
    almost.consecutive_correct = 2;
    states.push(almost);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lexitrain.db");
    {
        let db = Database::open_at(&path).unwrap();
        for s in &states {
            db.save_word_state(s).unwrap();
        }
        let mut engine = TrainingEngine::new(db, catalog(20), config(), now()).unwrap();
        let mut plan = engine.plan(300, SessionMode::ReviewOnly, now()).unwrap();
        let answer = typed(8, 3, "word8", "word8", 9000);
        engine.record(&mut plan, &answer, now()).unwrap();
        assert!(engine.gate().is_unlocked(2));
    }

    let reopened = TrainingEngine::new(Database::open_at(&path).unwrap(), catalog(20), config(), now()).unwrap();
    assert!(reopened.gate().is_unlocked(2));
}

#[test]
fn test_scheduler_outage_keeps_memory_state_but_applies_mastery() {
    let seeded = review_state(1, 3);
    let mut engine =
        TrainingEngine::with_scheduler(seeded_db(&[seeded.clone()]), catalog(20), OfflineScheduler, config(), now())
            .unwrap();
    let mut plan = engine.plan(300, SessionMode::ReviewOnly, now()).unwrap();

    let result = engine.record(&mut plan, &typed(1, 3, "nope", "word1", 4000), now()).unwrap();

    assert!(result.scheduler_degraded);
    assert_eq!(result.rating, Rating::Again);
    assert_eq!(result.next_due_at, seeded.memory_state.due_at);
    assert!(result.requeued_at.is_some());

    let stored = engine.word_state(1).unwrap().unwrap();
    assert_eq!(stored.memory_state, seeded.memory_state);
    assert_eq!(stored.consecutive_wrong, 1);
    assert_eq!(engine.database().recent_reviews(10).unwrap().len(), 1);
}

#[test]
fn test_failed_commit_rolls_back_everything() {
    let mut states: Vec<_> = (1..=7).map(|id| review_state(id, 3)).collect();
    let mut almost = review_state(8, 2);
    almost.consecutive_correct = 2;
    states.push(almost.clone());
    let mut engine = TrainingEngine::new(seeded_db(&states), catalog(20), config(), now()).unwrap();
    let mut plan = engine.plan(300, SessionMode::ReviewOnly, now()).unwrap();
    let before_len = plan.len();

    engine.database().conn().execute("DROP TABLE reviews", []).unwrap();

    let err = engine
        .record(&mut plan, &typed(8, 3, "word8", "word8", 9000), now())
        .unwrap_err();
    assert!(matches!(err, CoreError::Database(_)));
    assert!(!err.is_exercise_scoped());

    assert_eq!(engine.word_state(8).unwrap().unwrap(), almost);
    assert!(!engine.gate().is_unlocked(2));
    assert_eq!(engine.today(now().date_naive()).unwrap().words_reviewed, 0);
    assert_eq!(plan.len(), before_len);
}

#[test]
fn test_invalid_answer_leaves_state_untouched() {
    let seeded = review_state(1, 3);
    let mut engine = TrainingEngine::new(seeded_db(&[seeded.clone()]), catalog(20), config(), now()).unwrap();
    let mut plan = engine.plan(300, SessionMode::ReviewOnly, now()).unwrap();

    let err = engine.record(&mut plan, &typed(1, 3, "   ", "word1", 4000), now()).unwrap_err();

    assert!(matches!(err, CoreError::Training(TrainingError::InvalidAnswer { word_id: 1, .. })));
    assert!(err.is_exercise_scoped());
    assert_eq!(engine.word_state(1).unwrap().unwrap(), seeded);
    assert!(engine.database().recent_reviews(10).unwrap().is_empty());
}

#[test]
fn test_review_of_unknown_state_is_rejected() {
    let mut engine = TrainingEngine::new(Database::open_memory().unwrap(), catalog(20), config(), now()).unwrap();
    let mut plan = engine.plan(300, SessionMode::Full, now()).unwrap();

    let err = engine.record(&mut plan, &typed(3, 3, "word3", "word3", 4000), now()).unwrap_err();
    assert!(matches!(err, CoreError::Training(TrainingError::MissingWordState { word_id: 3 })));

    let err = engine.record(&mut plan, &acknowledged(999, 2000), now()).unwrap_err();
    assert!(matches!(err, CoreError::Training(TrainingError::UnknownWord { word_id: 999 })));
}

#[test]
fn test_advance_skips_reviews_whose_state_vanished() {
    let states: Vec<_> = (1..=3).map(|id| review_state(id, 3)).collect();
    let engine = TrainingEngine::new(seeded_db(&states), catalog(20), config(), now()).unwrap();
    let mut plan = engine.plan(300, SessionMode::ReviewOnly, now()).unwrap();
    let first = plan.items[0].word_id;

    engine
        .database()
        .conn()
        .execute("DELETE FROM learner_words WHERE word_id = ?1", [first])
        .unwrap();

    let item = expect_exercise(engine.advance(&mut plan).unwrap());
    assert_ne!(item.word_id, first);
    assert_eq!(plan.next_index, 2);
}

#[test]
fn test_scheduler_uses_configured_retention() {
    let mut config = config();
    config.scheduler.desired_retention = 0.8;
    let engine = TrainingEngine::new(seeded_db(&[]), catalog(20), config, now()).unwrap();
    assert_eq!(engine.scheduler().desired_retention(), 0.8);
}

#[test]
fn test_plan_leaves_out_unreadable_rows() {
    let states: Vec<_> = (1..=3).map(|id| review_state(id, 3)).collect();
    let engine = TrainingEngine::new(seeded_db(&states), catalog(20), config(), now()).unwrap();
    engine
        .database()
        .conn()
        .execute("UPDATE learner_words SET state_kind = 9 WHERE word_id = 2", [])
        .unwrap();

    let plan = engine.plan(300, SessionMode::ReviewOnly, now()).unwrap();

    let ids: Vec<i64> = plan.items.iter().map(|i| i.word_id).collect();
    assert!(ids.contains(&1));
    assert!(ids.contains(&3));
    assert!(!ids.contains(&2));
}

#[test]
fn test_dashboard_reflects_committed_answers() {
    let mut engine = TrainingEngine::new(seeded_db(&[review_state(1, 3)]), catalog(20), config(), now()).unwrap();
    let mut plan = engine.plan(300, SessionMode::ReviewOnly, now()).unwrap();
    engine.record(&mut plan, &typed(1, 3, "word1", "word1", 9000), now()).unwrap();
    engine.record(&mut plan, &typed(1, 3, "nope", "word1", 9000), now()).unwrap();

    let dash = engine.dashboard(now().date_naive()).unwrap();
    assert_eq!(dash.today.words_reviewed, 2);
    assert_eq!(dash.today.correct_count, 1);
    assert!((dash.accuracy - 0.5).abs() < 1e-9);
    assert_eq!(dash.streak_days, 1);
    assert_eq!(dash.words_introduced, 1);
    assert_eq!(dash.coverage_percent, 0.5);

    let heatmap = engine.heatmap(2026).unwrap();
    let today = heatmap.iter().find(|day| day.date == now().date_naive()).unwrap();
    assert_eq!((today.reviews, today.intensity), (2, 4));
}
