//! Canonical table DDL.
//!
//! Table and index creation is idempotent and safe to run at the start of
//! every mutating operation. Statements take validated identifiers from
//! [`TableNames`](crate::config::TableNames) only.

use super::sql::map_storage_error;
use crate::Result;
use rusqlite::Connection;

/// Columns every canonical table must carry.
pub const CANONICAL_COLUMNS: &[&str] = &[
    "id",
    "session_id",
    "domain_code",
    "exercise_code",
    "item_id",
    "payload",
    "correct",
    "reaction_ms",
    "created_at",
];

/// Columns every legacy table must carry.
pub const LEGACY_COLUMNS: &[&str] = &["session_id", "item_id", "correct", "reaction_ms"];

/// Name of the natural-key unique index on a canonical table.
#[must_use]
pub fn natural_key_index(table: &str) -> String {
    format!("idx_{table}_natural_key")
}

/// Creates the canonical table and its supporting indexes if absent.
///
/// Indexes cover lookups by session, session + domain code,
/// session + exercise code, and session + creation time.
///
/// # Errors
///
/// Returns a classified storage error if the DDL fails.
pub fn ensure_canonical_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            domain_code TEXT,
            exercise_code TEXT,
            item_id TEXT,
            payload TEXT,
            correct INTEGER,
            reaction_ms INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_session ON {table} (session_id);
        CREATE INDEX IF NOT EXISTS idx_{table}_session_domain ON {table} (session_id, domain_code);
        CREATE INDEX IF NOT EXISTS idx_{table}_session_exercise ON {table} (session_id, exercise_code);
        CREATE INDEX IF NOT EXISTS idx_{table}_session_created ON {table} (session_id, created_at);"
    ))
    .map_err(map_storage_error("ensure_canonical_table"))
}

/// Collapses rows sharing `(session_id, exercise_code, item_id)` onto the
/// oldest row, then creates the natural-key unique index.
///
/// Rows with a `NULL` key column are never duplicates of each other, matching
/// how the unique index treats them.
///
/// Returns the number of duplicate rows removed. Must run inside the same
/// transaction as the upserts that rely on the index.
///
/// # Errors
///
/// Returns a classified storage error if the cleanup or index creation fails.
pub fn ensure_natural_key(conn: &Connection, table: &str) -> Result<u64> {
    let removed = conn
        .execute(
            &format!(
                "DELETE FROM {table} WHERE id IN (
                    SELECT t.id FROM {table} t
                    WHERE t.exercise_code IS NOT NULL AND t.item_id IS NOT NULL
                      AND t.id > (
                        SELECT MIN(k.id) FROM {table} k
                        WHERE k.session_id = t.session_id
                          AND k.exercise_code = t.exercise_code
                          AND k.item_id = t.item_id
                      )
                )"
            ),
            [],
        )
        .map_err(map_storage_error("dedupe_natural_key"))?;

    conn.execute_batch(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} (session_id, exercise_code, item_id);",
        index = natural_key_index(table)
    ))
    .map_err(map_storage_error("create_natural_key_index"))?;

    Ok(u64::try_from(removed).unwrap_or_default())
}

/// Counts canonical rows, optionally for one session.
///
/// # Errors
///
/// Returns a classified storage error if the count fails.
pub fn count_rows(conn: &Connection, table: &str, session_id: Option<i64>) -> Result<u64> {
    let map_err = map_storage_error("count_canonical_rows");
    let count: i64 = match session_id {
        Some(id) => conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE session_id = ?1"),
            [id],
            |row| row.get(0),
        ),
        None => conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        }),
    }
    .map_err(map_err)?;
    Ok(u64::try_from(count).unwrap_or_default())
}
