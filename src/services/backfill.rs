//! Legacy-to-canonical backfill.
//!
//! Copies legacy response rows into the canonical table, tagged with the
//! configured migration tag. A run is one `BEGIN IMMEDIATE` transaction:
//! the scoped `before` count, the content-equality dedup check, the bulk
//! insert and the `after` count all see the same state, so two racing runs
//! serialize and the second inserts nothing.
//!
//! # Dedup rule
//!
//! A legacy row is skipped when a canonical row already exists with the same
//! session, the same item id (as text), the same reaction time, the same
//! normalized correctness, and the migration tag as payload. Live-submitted
//! canonical rows never match, so they coexist with migrated ones.
//!
//! A scoped run also reports the union-read statistics of its session, read
//! inside the same transaction.

use super::aggregate::aggregate;
use super::session_rows::{DateWindow, read_session_rows};
use crate::models::{BackfillPreview, BackfillResult, SessionId};
use crate::storage::sqlite::schema::{self, LEGACY_COLUMNS};
use crate::storage::sqlite::{
    CatalogJoin, SqliteIntrospector, correct_flag_sql, map_storage_error, session_scope_clause,
};
use crate::config::TableNames;
use crate::storage::{SchemaIntrospector, TelemetryStore};
use crate::Result;
use rusqlite::{Connection, params, params_from_iter};
use std::sync::Arc;
use tracing::instrument;

/// Migrates legacy responses into the canonical table.
pub struct BackfillService {
    store: Arc<TelemetryStore>,
}

impl BackfillService {
    /// Creates a backfill service over a shared store.
    #[must_use]
    pub const fn new(store: Arc<TelemetryStore>) -> Self {
        Self { store }
    }

    /// Backfills one session, or every session when `session_id` is `None`.
    ///
    /// Missing sources are not errors: without a legacy table the result is
    /// zero-effect with a `note`; without catalogs codes resolve to `"UNK"`;
    /// with a session catalog, rows of unknown sessions are left behind and
    /// their ids reported in `skipped_sessions`. A scoped run carries a
    /// `preview` of its session's statistics.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Transient`] if the write lock or a uniqueness
    /// race persists past the retry budget, and
    /// [`crate::Error::StorageUnavailable`] for any other storage fault. In
    /// both cases nothing was committed.
    #[instrument(skip(self), fields(operation = "backfill", backend = "sqlite"))]
    pub fn backfill(&self, session_id: Option<SessionId>) -> Result<BackfillResult> {
        let config = self.store.config();
        let tables = &config.tables;
        let tag = config.migration_tag.as_str();
        let scope = session_id.map(SessionId::get);

        let result = self.store.write("backfill", |tx| {
            let mut result = backfill_in(tx, tables, tag, scope)?;
            if let Some(id) = session_id {
                let (_, rows) = read_session_rows(tx, tables, tag, id, DateWindow::default())?;
                result.preview = Some(BackfillPreview {
                    session_id: id,
                    stats: aggregate(rows),
                });
            }
            Ok(result)
        })?;

        if let Some(note) = &result.note {
            tracing::info!(note = %note, "Backfill skipped");
        } else {
            tracing::info!(
                inserted = result.inserted,
                before = result.before,
                after = result.after,
                skipped_sessions = result.skipped_sessions.len(),
                "Backfill complete"
            );
        }
        Ok(result)
    }
}

/// Runs one backfill pass on an open transaction.
fn backfill_in(
    conn: &Connection,
    tables: &TableNames,
    tag: &str,
    scope: Option<i64>,
) -> Result<BackfillResult> {
    let introspector = SqliteIntrospector::new(conn);
    if !introspector.has_columns(&tables.legacy, LEGACY_COLUMNS)? {
        let note = if introspector.table_exists(&tables.legacy)? {
            format!(
                "legacy table '{}' lacks required columns; nothing to backfill",
                tables.legacy
            )
        } else {
            format!("legacy table '{}' not found; nothing to backfill", tables.legacy)
        };
        return Ok(BackfillResult::noop(note));
    }

    schema::ensure_canonical_table(conn, &tables.canonical)?;
    let before = schema::count_rows(conn, &tables.canonical, scope)?;

    let guarded = introspector.has_columns(&tables.session_catalog, &["id"])?;
    let plan = CatalogJoin::plan(&introspector, tables, "r")?;
    if !plan.resolves_domain {
        tracing::debug!("Catalog chain incomplete; unresolved codes become UNK");
    }

    let sql = insert_sql(tables, &plan, scope.is_some(), guarded);
    let map_err = map_storage_error("backfill_insert");
    match scope {
        Some(id) => conn.execute(&sql, params![tag, id]),
        None => conn.execute(&sql, params![tag]),
    }
    .map_err(map_err)?;

    let after = schema::count_rows(conn, &tables.canonical, scope)?;
    let skipped = if guarded {
        skipped_sessions(conn, tables, scope)?
    } else {
        Vec::new()
    };

    Ok(BackfillResult::from_counts(before, after, skipped))
}

/// Builds the projecting insert. `?1` is the migration tag, `?2` the session scope.
fn insert_sql(tables: &TableNames, plan: &CatalogJoin, scoped: bool, guarded: bool) -> String {
    let flag = correct_flag_sql("r.correct");
    let item = "CAST(r.item_id AS TEXT)";
    let reaction = "MAX(COALESCE(r.reaction_ms, 0), 0)";

    let mut filters = String::from("r.session_id IS NOT NULL");
    filters.push_str(&session_scope_clause("r.session_id", scoped, 2));
    if guarded {
        filters.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM {sessions} s WHERE s.id = r.session_id)",
            sessions = tables.session_catalog
        ));
    }

    format!(
        "INSERT INTO {canonical} \
           (session_id, domain_code, exercise_code, item_id, payload, correct, reaction_ms, created_at) \
         SELECT r.session_id, {domain}, {exercise}, {item}, ?1, {flag}, {reaction}, CURRENT_TIMESTAMP \
         FROM {legacy} r{joins} \
         WHERE {filters} \
           AND NOT EXISTS ( \
             SELECT 1 FROM {canonical} c \
             WHERE c.session_id = r.session_id \
               AND c.item_id IS {item} \
               AND c.reaction_ms IS {reaction} \
               AND c.correct = {flag} \
               AND c.payload = ?1) \
         ON CONFLICT DO NOTHING",
        canonical = tables.canonical,
        legacy = tables.legacy,
        domain = plan.domain_code_sql(),
        exercise = plan.exercise_code_sql(),
        joins = plan.joins,
    )
}

/// Distinct legacy session ids with no row in the session catalog.
fn skipped_sessions(conn: &Connection, tables: &TableNames, scope: Option<i64>) -> Result<Vec<i64>> {
    let map_err = map_storage_error("backfill_skipped_sessions");
    let scope_filter = session_scope_clause("r.session_id", scope.is_some(), 1);
    let sql = format!(
        "SELECT DISTINCT r.session_id FROM {legacy} r \
         WHERE r.session_id IS NOT NULL{scope_filter} \
           AND NOT EXISTS (SELECT 1 FROM {sessions} s WHERE s.id = r.session_id) \
         ORDER BY r.session_id",
        legacy = tables.legacy,
        sessions = tables.session_catalog,
    );

    let mut stmt = conn.prepare(&sql).map_err(&map_err)?;
    let rows = stmt
        .query_map(params_from_iter(scope), |row| row.get::<_, i64>(0))
        .map_err(&map_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(&map_err)
}
