//! Database schema migrations for lexitrain.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| row.get::<_, i32>(0))
        .unwrap_or_else(|e| {
            if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                tracing::warn!(error = %e, "failed to read schema_version");
            }
            0
        })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: learner words, review log and tiers.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS learner_words (
            word_id             INTEGER PRIMARY KEY,
            frequency_rank      INTEGER NOT NULL,
            mastery_level       INTEGER NOT NULL DEFAULT 0,
            consecutive_correct INTEGER NOT NULL DEFAULT 0,
            consecutive_wrong   INTEGER NOT NULL DEFAULT 0,
            stability           REAL NOT NULL DEFAULT 0,
            difficulty          REAL NOT NULL DEFAULT 0,
            reps                INTEGER NOT NULL DEFAULT 0,
            lapses              INTEGER NOT NULL DEFAULT 0,
            state_kind          INTEGER NOT NULL DEFAULT 0,
            last_review_at      TEXT,
            due_at              TEXT NOT NULL,
            created_at          TEXT NOT NULL,
            last_answered_at    TEXT
        );

        CREATE TABLE IF NOT EXISTS reviews (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            word_id             INTEGER NOT NULL,
            exercise_level      INTEGER NOT NULL,
            rating              INTEGER NOT NULL,
            correct             INTEGER NOT NULL,
            response_time_ms    INTEGER NOT NULL,
            mastery_before      INTEGER NOT NULL,
            mastery_after       INTEGER NOT NULL,
            reviewed_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tiers (
            tier_number INTEGER PRIMARY KEY,
            range_start INTEGER NOT NULL,
            range_end   INTEGER NOT NULL,
            unlocked    INTEGER NOT NULL DEFAULT 0,
            unlocked_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_learner_words_due_at ON learner_words(due_at);
        CREATE INDEX IF NOT EXISTS idx_learner_words_rank ON learner_words(frequency_rank, mastery_level);
        CREATE INDEX IF NOT EXISTS idx_reviews_reviewed_at ON reviews(reviewed_at);
        CREATE INDEX IF NOT EXISTS idx_reviews_word_id ON reviews(word_id);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: per-day aggregates for the dashboard and the new-word quota.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS daily_stats (
            date           TEXT PRIMARY KEY,
            words_reviewed INTEGER NOT NULL DEFAULT 0,
            words_learned  INTEGER NOT NULL DEFAULT 0,
            correct_count  INTEGER NOT NULL DEFAULT 0,
            time_spent_ms  INTEGER NOT NULL DEFAULT 0
        );",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}
