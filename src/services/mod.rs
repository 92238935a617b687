//! Business logic services.
//!
//! Services orchestrate the shared [`TelemetryStore`](crate::storage::TelemetryStore)
//! and provide the high-level operations:
//!
//! - [`BackfillService`]: legacy-to-canonical migration
//! - [`SessionRowsService`]: per-session union reads
//! - [`aggregate()`]: grouped statistics over normalized rows
//! - [`ProgressService`]: session progress and panel metrics
//! - [`IngestService`]: batch upserts of trial records

mod aggregate;
mod backfill;
mod ingest;
mod progress;
mod session_rows;

pub use aggregate::aggregate;
pub use backfill::BackfillService;
pub use ingest::IngestService;
pub use progress::{
    MAX_RECENT_RESPONSES, MetricsFilter, ProgressService, RowFilter, SessionProgress,
};
pub use session_rows::{
    DateWindow, RowSource, SessionRows, SessionRowsService, SourceAvailability,
};

/// Shared table fixtures for service unit tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::storage::TelemetryStore;
    use crate::storage::sqlite::schema;
    use rusqlite::params;

    /// Canonical row as read back by [`canonical_rows`]:
    /// `(session, domain, exercise, item, payload, correct, reaction)`.
    pub type CanonicalRow = (i64, String, String, String, String, i64, i64);

    /// Canonical row as written by [`canonical_insert`]:
    /// `(session, domain, exercise, item, correct, reaction, created_at)`.
    pub type CanonicalSeed<'a> = (
        i64,
        Option<&'a str>,
        Option<&'a str>,
        &'a str,
        &'a str,
        Option<i64>,
        &'a str,
    );

    fn exec(store: &TelemetryStore, sql: &str) {
        store
            .with_connection(|conn| {
                conn.execute_batch(sql).unwrap();
                Ok(())
            })
            .unwrap();
    }

    /// Creates the legacy response table. `correct` has no declared type so
    /// text flags are stored as written.
    pub fn legacy_schema(store: &TelemetryStore) {
        exec(
            store,
            "CREATE TABLE legacy_response (
                id INTEGER PRIMARY KEY,
                session_id INTEGER,
                item_id INTEGER,
                correct,
                reaction_ms INTEGER
            );",
        );
    }

    /// Creates and fills the item, domain and exercise catalogs.
    ///
    /// Item 10 resolves to `MCP`/`MCP_DIGITS`, item 11 to `VPM` with an
    /// unknown exercise, item 12 to nothing.
    pub fn catalogs(store: &TelemetryStore) {
        exec(
            store,
            "CREATE TABLE item (item_id INTEGER PRIMARY KEY, domain_id INTEGER, exercise_id INTEGER);
             CREATE TABLE domain_catalog (domain_id INTEGER PRIMARY KEY, code TEXT);
             CREATE TABLE exercise_catalog (exercise_id INTEGER PRIMARY KEY, code TEXT);
             INSERT INTO domain_catalog VALUES (1, 'MCP'), (2, 'VPM');
             INSERT INTO exercise_catalog VALUES (100, 'MCP_DIGITS');
             INSERT INTO item VALUES (10, 1, 100), (11, 2, 999), (12, 42, NULL);",
        );
    }

    /// Creates empty item and domain catalogs.
    pub fn item_and_domain_catalog_without_entries(store: &TelemetryStore) {
        exec(
            store,
            "CREATE TABLE item (item_id INTEGER PRIMARY KEY, domain_id INTEGER, exercise_id INTEGER);
             CREATE TABLE domain_catalog (domain_id INTEGER PRIMARY KEY, code TEXT);",
        );
    }

    /// Inserts legacy rows `(session, item, correct, reaction)`.
    pub fn legacy_rows(store: &TelemetryStore, rows: &[(i64, i64, &str, i64)]) {
        store
            .with_connection(|conn| {
                for (session, item, correct, reaction) in rows {
                    conn.execute(
                        "INSERT INTO legacy_response (session_id, item_id, correct, reaction_ms) \
                         VALUES (?1, ?2, ?3, ?4)",
                        params![session, item, correct, reaction],
                    )
                    .unwrap();
                }
                Ok(())
            })
            .unwrap();
    }

    /// Creates the session catalog holding `ids`.
    pub fn session_catalog(store: &TelemetryStore, ids: &[i64]) {
        store
            .with_connection(|conn| {
                conn.execute_batch("CREATE TABLE assessment_session (id INTEGER PRIMARY KEY);")
                    .unwrap();
                for id in ids {
                    conn.execute("INSERT INTO assessment_session (id) VALUES (?1)", [id])
                        .unwrap();
                }
                Ok(())
            })
            .unwrap();
    }

    /// Creates the canonical table and inserts rows with explicit timestamps.
    pub fn canonical_insert(store: &TelemetryStore, rows: &[CanonicalSeed<'_>]) {
        store
            .with_connection(|conn| {
                schema::ensure_canonical_table(conn, "trial_response")?;
                for (session, domain, exercise, item, correct, reaction, created_at) in rows {
                    conn.execute(
                        "INSERT INTO trial_response \
                           (session_id, domain_code, exercise_code, item_id, payload, correct, reaction_ms, created_at) \
                         VALUES (?1, ?2, ?3, ?4, 'LIVE', ?5, ?6, ?7)",
                        params![session, domain, exercise, item, correct, reaction, created_at],
                    )
                    .unwrap();
                }
                Ok(())
            })
            .unwrap();
    }

    /// Reads every canonical row in insertion order.
    pub fn canonical_rows(store: &TelemetryStore) -> Vec<CanonicalRow> {
        store
            .with_connection(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT session_id, domain_code, exercise_code, item_id, payload, correct, reaction_ms \
                         FROM trial_response ORDER BY id",
                    )
                    .unwrap();
                Ok(stmt
                    .query_map([], |r| {
                        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?))
                    })
                    .unwrap()
                    .map(|r| r.unwrap())
                    .collect())
            })
            .unwrap()
    }
}
