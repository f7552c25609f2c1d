//! SQLite-based learner storage.
//!
//! Provides persistent storage for:
//! - Learner word states (mastery, streak counters, memory state)
//! - The append-only review log
//! - Tier unlock records
//! - Per-day aggregates
//!
//! Write helpers take a plain `&Connection` so the recorder can run them
//! inside one transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{data_dir, migrations};
use crate::error::{DatabaseError, Result};
use crate::mastery::{LearnerWordState, MAX_LEVEL, RECALL_LEVEL};
use crate::memory::{MemoryState, Rating, StateKind};
use crate::tier::{LevelSource, TierRecord};
use crate::word::{RankRange, WordId};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One committed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLogEntry {
    pub word_id: WordId,
    pub exercise_level: u8,
    pub rating: Rating,
    pub correct: bool,
    pub response_time_ms: u64,
    pub mastery_before: u8,
    pub mastery_after: u8,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub words_reviewed: u32,
    pub words_learned: u32,
    pub correct_count: u32,
    pub time_spent_ms: u64,
}

impl DailyStats {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            words_reviewed: 0,
            words_learned: 0,
            correct_count: 0,
            time_spent_ms: 0,
        }
    }

    /// Share of correct answers, 0.0 on a day without reviews.
    pub fn accuracy(&self) -> f64 {
        if self.words_reviewed == 0 {
            0.0
        } else {
            f64::from(self.correct_count) / f64::from(self.words_reviewed)
        }
    }
}

/// Increment applied to one day's aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyDelta {
    pub reviewed: u32,
    pub learned: u32,
    pub correct: u32,
    pub time_spent_ms: u64,
}

/// SQLite database for learner progress.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/lexitrain.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("lexitrain.db");
        Self::open_at(&path)
    }

    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let db = Self { conn };
        db.migrate()?;
        tracing::debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    /// Start a transaction; dropping it without `commit` rolls back.
    ///
    /// # Errors
    /// Returns an error if SQLite refuses to begin the transaction.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// # Errors
    /// Returns an error on query failure or an undecodable row.
    pub fn load_word_state(&self, word_id: WordId) -> Result<Option<LearnerWordState>> {
        load_word_state(&self.conn, word_id)
    }

    /// Every learner word that decodes. Rows with out-of-range values are
    /// logged and left out.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub fn load_all_states(&self) -> Result<Vec<LearnerWordState>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {WORD_COLUMNS} FROM learner_words ORDER BY word_id"))?;
        let rows = stmt.query_map([], RawWordRow::read)?;
        let mut out = Vec::new();
        for row in rows {
            let row = row?;
            let word_id = row.word_id;
            match row.into_state() {
                Ok(state) => out.push(state),
                Err(err) => tracing::warn!(word_id, %err, "skipping unreadable learner word"),
            }
        }
        Ok(out)
    }

    /// # Errors
    /// Returns an error if the write fails.
    pub fn save_word_state(&self, state: &LearnerWordState) -> Result<()> {
        save_word_state(&self.conn, state)
    }

    /// # Errors
    /// Returns an error on query failure or an undecodable row.
    pub fn load_tiers(&self) -> Result<Vec<TierRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT tier_number, range_start, range_end, unlocked, unlocked_at
             FROM tiers ORDER BY tier_number",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut tiers = Vec::new();
        for row in rows {
            let (tier_number, start, end, unlocked, unlocked_at) = row?;
            tiers.push(TierRecord {
                tier_number,
                rank_range: RankRange::new(start, end),
                unlocked,
                unlocked_at: parse_optional_ts("tiers", unlocked_at)?,
            });
        }
        Ok(tiers)
    }

    /// # Errors
    /// Returns an error if any write fails; earlier rows stay written.
    pub fn save_tiers(&self, tiers: &[TierRecord]) -> Result<()> {
        for tier in tiers {
            save_tier(&self.conn, tier)?;
        }
        Ok(())
    }

    /// Aggregates for one day, zeros when nothing was recorded.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub fn daily_stats(&self, date: NaiveDate) -> Result<DailyStats> {
        let row = self
            .conn
            .query_row(
                "SELECT words_reviewed, words_learned, correct_count, time_spent_ms
                 FROM daily_stats WHERE date = ?1",
                params![date.format(DATE_FORMAT).to_string()],
                |row| {
                    Ok(DailyStats {
                        date,
                        words_reviewed: row.get(0)?,
                        words_learned: row.get(1)?,
                        correct_count: row.get(2)?,
                        time_spent_ms: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_else(|| DailyStats::empty(date)))
    }

    /// Days with at least one review, newest first.
    ///
    /// # Errors
    /// Returns an error on query failure or an undecodable date.
    pub fn study_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date FROM daily_stats WHERE words_reviewed > 0 ORDER BY date DESC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut dates = Vec::new();
        for raw in rows {
            let raw = raw?;
            let date = NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| DatabaseError::CorruptRow {
                table: "daily_stats",
                message: format!("bad date '{raw}': {e}"),
            })?;
            dates.push(date);
        }
        Ok(dates)
    }

    /// Reviews per day for days in `from..=to` that saw any, oldest first.
    ///
    /// # Errors
    /// Returns an error on query failure or an undecodable date.
    pub fn reviews_per_day(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<(NaiveDate, u32)>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, words_reviewed FROM daily_stats
             WHERE date >= ?1 AND date <= ?2 AND words_reviewed > 0
             ORDER BY date",
        )?;
        let rows = stmt.query_map(
            params![from.format(DATE_FORMAT).to_string(), to.format(DATE_FORMAT).to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
        )?;
        let mut out = Vec::new();
        for row in rows {
            let (raw, count) = row?;
            let date = NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| DatabaseError::CorruptRow {
                table: "daily_stats",
                message: format!("bad date '{raw}': {e}"),
            })?;
            out.push((date, count));
        }
        Ok(out)
    }

    /// Word counts per mastery level, index 0 through 7.
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub fn level_distribution(&self) -> Result<[u32; 8]> {
        let mut stmt = self
            .conn
            .prepare("SELECT mastery_level, COUNT(*) FROM learner_words GROUP BY mastery_level")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, u8>(0)?, row.get::<_, u32>(1)?)))?;
        let mut out = [0u32; 8];
        for row in rows {
            let (level, count) = row?;
            if level <= MAX_LEVEL {
                out[level as usize] = count;
            }
        }
        Ok(out)
    }

    /// # Errors
    /// Returns an error on query failure or an undecodable row.
    pub fn recent_reviews(&self, limit: usize) -> Result<Vec<ReviewLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT word_id, exercise_level, rating, correct, response_time_ms,
                    mastery_before, mastery_after, reviewed_at
             FROM reviews ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, WordId>(0)?,
                row.get::<_, u8>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, u64>(4)?,
                row.get::<_, u8>(5)?,
                row.get::<_, u8>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (word_id, exercise_level, rating, correct, response_time_ms, before, after, at) = row?;
            let rating = Rating::from_i32(rating).ok_or_else(|| DatabaseError::CorruptRow {
                table: "reviews",
                message: format!("rating {rating} out of range"),
            })?;
            out.push(ReviewLogEntry {
                word_id,
                exercise_level,
                rating,
                correct,
                response_time_ms,
                mastery_before: before,
                mastery_after: after,
                reviewed_at: parse_ts("reviews", &at)?,
            });
        }
        Ok(out)
    }
}

impl LevelSource for Connection {
    fn recalled_in_range(&self, range: RankRange) -> Result<u32> {
        let count = self.query_row(
            "SELECT COUNT(*) FROM learner_words
             WHERE frequency_rank BETWEEN ?1 AND ?2 AND mastery_level >= ?3",
            params![range.start, range.end, RECALL_LEVEL],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }
}

impl LevelSource for Database {
    fn recalled_in_range(&self, range: RankRange) -> Result<u32> {
        self.conn.recalled_in_range(range)
    }
}

const WORD_COLUMNS: &str = "word_id, frequency_rank, mastery_level, consecutive_correct, consecutive_wrong,
    stability, difficulty, reps, lapses, state_kind, last_review_at, due_at, created_at, last_answered_at";

/// Column values as stored, decoded into domain types afterwards.
struct RawWordRow {
    word_id: WordId,
    frequency_rank: u32,
    mastery_level: u8,
    consecutive_correct: u32,
    consecutive_wrong: u32,
    stability: f64,
    difficulty: f64,
    reps: u32,
    lapses: u32,
    state_kind: i32,
    last_review_at: Option<String>,
    due_at: String,
    created_at: String,
    last_answered_at: Option<String>,
}

impl RawWordRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            word_id: row.get(0)?,
            frequency_rank: row.get(1)?,
            mastery_level: row.get(2)?,
            consecutive_correct: row.get(3)?,
            consecutive_wrong: row.get(4)?,
            stability: row.get(5)?,
            difficulty: row.get(6)?,
            reps: row.get(7)?,
            lapses: row.get(8)?,
            state_kind: row.get(9)?,
            last_review_at: row.get(10)?,
            due_at: row.get(11)?,
            created_at: row.get(12)?,
            last_answered_at: row.get(13)?,
        })
    }

    fn into_state(self) -> Result<LearnerWordState, DatabaseError> {
        let state_kind = StateKind::from_i32(self.state_kind).ok_or_else(|| DatabaseError::CorruptRow {
            table: "learner_words",
            message: format!("word {}: state_kind {} out of range", self.word_id, self.state_kind),
        })?;
        if self.mastery_level > MAX_LEVEL {
            return Err(DatabaseError::CorruptRow {
                table: "learner_words",
                message: format!("word {}: mastery_level {}", self.word_id, self.mastery_level),
            });
        }
        Ok(LearnerWordState {
            word_id: self.word_id,
            frequency_rank: self.frequency_rank,
            mastery_level: self.mastery_level,
            consecutive_correct: self.consecutive_correct,
            consecutive_wrong: self.consecutive_wrong,
            memory_state: MemoryState {
                stability: self.stability,
                difficulty: self.difficulty,
                reps: self.reps,
                lapses: self.lapses,
                state_kind,
                last_review_at: parse_optional_ts("learner_words", self.last_review_at)?,
                due_at: parse_ts("learner_words", &self.due_at)?,
            },
            created_at: parse_ts("learner_words", &self.created_at)?,
            last_answered_at: parse_optional_ts("learner_words", self.last_answered_at)?,
        })
    }
}

fn parse_ts(table: &'static str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow {
            table,
            message: format!("bad timestamp '{raw}': {e}"),
        })
}

fn parse_optional_ts(table: &'static str, raw: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    raw.map(|s| parse_ts(table, &s)).transpose()
}

/// # Errors
/// Returns an error on query failure or an undecodable row.
pub fn load_word_state(conn: &Connection, word_id: WordId) -> Result<Option<LearnerWordState>> {
    let raw = conn
        .query_row(
            &format!("SELECT {WORD_COLUMNS} FROM learner_words WHERE word_id = ?1"),
            params![word_id],
            RawWordRow::read,
        )
        .optional()?;
    Ok(raw.map(RawWordRow::into_state).transpose()?)
}

/// Insert or replace one learner word.
///
/// # Errors
/// Returns an error if the write fails.
pub fn save_word_state(conn: &Connection, state: &LearnerWordState) -> Result<()> {
    let m = &state.memory_state;
    conn.execute(
        "INSERT INTO learner_words (
            word_id, frequency_rank, mastery_level, consecutive_correct, consecutive_wrong,
            stability, difficulty, reps, lapses, state_kind, last_review_at, due_at,
            created_at, last_answered_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(word_id) DO UPDATE SET
            frequency_rank = excluded.frequency_rank,
            mastery_level = excluded.mastery_level,
            consecutive_correct = excluded.consecutive_correct,
            consecutive_wrong = excluded.consecutive_wrong,
            stability = excluded.stability,
            difficulty = excluded.difficulty,
            reps = excluded.reps,
            lapses = excluded.lapses,
            state_kind = excluded.state_kind,
            last_review_at = excluded.last_review_at,
            due_at = excluded.due_at,
            last_answered_at = excluded.last_answered_at",
        params![
            state.word_id,
            state.frequency_rank,
            state.mastery_level,
            state.consecutive_correct,
            state.consecutive_wrong,
            m.stability,
            m.difficulty,
            m.reps,
            m.lapses,
            m.state_kind.as_i32(),
            m.last_review_at.map(|t| t.to_rfc3339()),
            m.due_at.to_rfc3339(),
            state.created_at.to_rfc3339(),
            state.last_answered_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

/// # Errors
/// Returns an error if the insert fails.
pub fn insert_review(conn: &Connection, entry: &ReviewLogEntry) -> Result<i64> {
    conn.execute(
        "INSERT INTO reviews (word_id, exercise_level, rating, correct, response_time_ms,
                              mastery_before, mastery_after, reviewed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.word_id,
            entry.exercise_level,
            entry.rating.as_i32(),
            entry.correct,
            entry.response_time_ms,
            entry.mastery_before,
            entry.mastery_after,
            entry.reviewed_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// # Errors
/// Returns an error if the upsert fails.
pub fn bump_daily_stats(conn: &Connection, date: NaiveDate, delta: DailyDelta) -> Result<()> {
    conn.execute(
        "INSERT INTO daily_stats (date, words_reviewed, words_learned, correct_count, time_spent_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(date) DO UPDATE SET
            words_reviewed = words_reviewed + excluded.words_reviewed,
            words_learned = words_learned + excluded.words_learned,
            correct_count = correct_count + excluded.correct_count,
            time_spent_ms = time_spent_ms + excluded.time_spent_ms",
        params![
            date.format(DATE_FORMAT).to_string(),
            delta.reviewed,
            delta.learned,
            delta.correct,
            delta.time_spent_ms,
        ],
    )?;
    Ok(())
}

/// # Errors
/// Returns an error if the upsert fails.
pub fn save_tier(conn: &Connection, tier: &TierRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO tiers (tier_number, range_start, range_end, unlocked, unlocked_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(tier_number) DO UPDATE SET
            range_start = excluded.range_start,
            range_end = excluded.range_end,
            unlocked = excluded.unlocked,
            unlocked_at = excluded.unlocked_at",
        params![
            tier.tier_number,
            tier.rank_range.start,
            tier.rank_range.end,
            tier.unlocked,
            tier.unlocked_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 18, 45, 0).unwrap()
    }

    fn sample_state() -> LearnerWordState {
        let mut s = LearnerWordState::unseen(42, 120, t0());
        s.mastery_level = 3;
        s.consecutive_correct = 2;
        s.memory_state.state_kind = StateKind::Review;
        s.memory_state.stability = 4.5;
        s.memory_state.difficulty = 5.25;
        s.memory_state.reps = 6;
        s.memory_state.last_review_at = Some(t0());
        s.memory_state.due_at = t0() + Duration::days(4);
        s.last_answered_at = Some(t0());
        s
    }

    #[test]
    fn word_state_roundtrip() {
        let db = Database::open_memory().unwrap();
        let state = sample_state();
        db.save_word_state(&state).unwrap();
        assert_eq!(db.load_word_state(42).unwrap(), Some(state.clone()));
        assert!(db.load_word_state(7).unwrap().is_none());

        let mut updated = state;
        updated.mastery_level = 4;
        db.save_word_state(&updated).unwrap();
        assert_eq!(db.load_all_states().unwrap(), vec![updated]);
    }

    #[test]
    fn corrupt_state_kind_is_reported() {
        let db = Database::open_memory().unwrap();
        db.save_word_state(&sample_state()).unwrap();
        db.conn()
            .execute("UPDATE learner_words SET state_kind = 9", [])
            .unwrap();
        assert!(db.load_word_state(42).is_err());
        assert!(db.load_all_states().unwrap().is_empty());
    }

    #[test]
    fn daily_stats_accumulate() {
        let db = Database::open_memory().unwrap();
        let day = t0().date_naive();
        assert_eq!(db.daily_stats(day).unwrap(), DailyStats::empty(day));
        let delta = DailyDelta {
            reviewed: 1,
            learned: 1,
            correct: 1,
            time_spent_ms: 2500,
        };
        bump_daily_stats(db.conn(), day, delta).unwrap();
        bump_daily_stats(db.conn(), day, DailyDelta { reviewed: 1, ..Default::default() }).unwrap();
        let stats = db.daily_stats(day).unwrap();
        assert_eq!(stats.words_reviewed, 2);
        assert_eq!(stats.words_learned, 1);
        assert!((stats.accuracy() - 0.5).abs() < 1e-9);
        assert_eq!(db.study_dates().unwrap(), vec![day]);
    }

    #[test]
    fn tiers_roundtrip() {
        let db = Database::open_memory().unwrap();
        let tiers = crate::tier::layout(&[100, 200], t0()).unwrap();
        db.save_tiers(&tiers).unwrap();
        assert_eq!(db.load_tiers().unwrap(), tiers);
    }

    #[test]
    fn level_source_counts_recalled_words_in_range() {
        let db = Database::open_memory().unwrap();
        for (id, rank, level) in [(1, 10, 3), (2, 20, 2), (3, 30, 5), (4, 300, 7)] {
            let mut s = sample_state();
            s.word_id = id;
            s.frequency_rank = rank;
            s.mastery_level = level;
            db.save_word_state(&s).unwrap();
        }
        assert_eq!(db.recalled_in_range(RankRange::new(0, 100)).unwrap(), 2);
        assert_eq!(db.level_distribution().unwrap()[3], 1);
    }

    #[test]
    fn rolled_back_transaction_leaves_no_rows() {
        let mut db = Database::open_memory().unwrap();
        {
            let tx = db.transaction().unwrap();
            save_word_state(&tx, &sample_state()).unwrap();
        }
        assert!(db.load_all_states().unwrap().is_empty());
    }

    #[test]
    fn review_log_is_readable() {
        let db = Database::open_memory().unwrap();
        let entry = ReviewLogEntry {
            word_id: 42,
            exercise_level: 3,
            rating: Rating::Hard,
            correct: false,
            response_time_ms: 4100,
            mastery_before: 3,
            mastery_after: 3,
            reviewed_at: t0(),
        };
        insert_review(db.conn(), &entry).unwrap();
        assert_eq!(db.recent_reviews(5).unwrap(), vec![entry]);
    }

    #[test]
    fn open_at_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.db");
        let db = Database::open_at(&path).unwrap();
        db.save_word_state(&sample_state()).unwrap();
        drop(db);
        let reopened = Database::open_at(&path).unwrap();
        assert_eq!(reopened.load_all_states().unwrap().len(), 1);
    }
}
