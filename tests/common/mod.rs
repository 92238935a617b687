//! Shared fixtures for integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use cogtrace::{CogtraceConfig, TelemetryStore};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A database file in a temporary directory.
pub struct TestDb {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.db");
        Self { dir, path }
    }

    pub fn config(&self) -> CogtraceConfig {
        CogtraceConfig::default().with_db_path(&self.path)
    }

    /// Opens a new store on the file; each call is an independent connection.
    pub fn store(&self) -> Arc<TelemetryStore> {
        Arc::new(TelemetryStore::open(&self.config()).unwrap())
    }

    /// Opens a raw connection for seeding.
    pub fn raw(&self) -> Connection {
        Connection::open(&self.path).unwrap()
    }
}

pub fn legacy_schema(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE legacy_response (
            id INTEGER PRIMARY KEY,
            session_id INTEGER,
            item_id INTEGER,
            correct,
            reaction_ms INTEGER
        );",
    )
    .unwrap();
}

/// Item 10 → MCP / `MCP_DIGITS`, item 11 → VPM / unknown exercise,
/// item 12 → unknown domain.
pub fn catalogs(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE item (item_id INTEGER PRIMARY KEY, domain_id INTEGER, exercise_id INTEGER);
         CREATE TABLE domain_catalog (domain_id INTEGER PRIMARY KEY, code TEXT);
         CREATE TABLE exercise_catalog (exercise_id INTEGER PRIMARY KEY, code TEXT);
         INSERT INTO domain_catalog VALUES (1, 'MCP'), (2, 'VPM');
         INSERT INTO exercise_catalog VALUES (100, 'MCP_DIGITS');
         INSERT INTO item VALUES (10, 1, 100), (11, 2, 999), (12, 42, NULL);",
    )
    .unwrap();
}

/// Item and domain catalogs without an exercise catalog.
pub fn domain_catalogs(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE item (item_id INTEGER PRIMARY KEY, domain_id INTEGER, exercise_id INTEGER);
         CREATE TABLE domain_catalog (domain_id INTEGER PRIMARY KEY, code TEXT);
         INSERT INTO domain_catalog VALUES (1, 'MCP'), (2, 'VPM');
         INSERT INTO item VALUES (10, 1, NULL), (11, 2, NULL);",
    )
    .unwrap();
}

pub fn session_catalog(conn: &Connection, ids: &[i64]) {
    conn.execute_batch("CREATE TABLE assessment_session (id INTEGER PRIMARY KEY);")
        .unwrap();
    for id in ids {
        conn.execute("INSERT INTO assessment_session (id) VALUES (?1)", [id])
            .unwrap();
    }
}

/// Inserts legacy rows `(session, item, correct, reaction)`.
pub fn legacy_rows(conn: &Connection, rows: &[(i64, i64, &str, i64)]) {
    for (session, item, correct, reaction) in rows {
        conn.execute(
            "INSERT INTO legacy_response (session_id, item_id, correct, reaction_ms) VALUES (?1, ?2, ?3, ?4)",
            params![session, item, correct, reaction],
        )
        .unwrap();
    }
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

pub fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}
