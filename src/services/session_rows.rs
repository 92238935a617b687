//! Union reads across canonical and legacy sources.
//!
//! A session's rows may live in the canonical table, the legacy table, or
//! both, depending on how far a deployment is through its migration. The
//! source is planned once per read from what the schema currently offers:
//!
//! | Canonical | Legacy + item + domain catalog | Legacy only | Source |
//! |-----------|--------------------------------|-------------|--------|
//! | yes | yes | - | [`RowSource::Union`] |
//! | yes | no | - | [`RowSource::CanonicalOnly`] |
//! | no | yes | - | [`RowSource::LegacyJoined`] |
//! | no | no | yes | [`RowSource::LegacyBare`] |
//! | no | no | no | [`RowSource::Empty`] |
//!
//! In the union, legacy rows that already have a content-equal migrated
//! canonical row are left out, so a session reads the same before and after
//! its backfill.
//!
//! A bounded [`DateWindow`] restricts the read to canonical rows created
//! inside it. Legacy rows carry no creation time and never pass a bound.

use crate::config::TableNames;
use crate::models::{Correctness, LegacyResponse, NormalizedRow, SessionId};
use crate::storage::sqlite::schema::{CANONICAL_COLUMNS, LEGACY_COLUMNS};
use crate::storage::sqlite::{
    CatalogJoin, SqliteIntrospector, code_or_unknown_sql, correct_flag_sql, map_storage_error,
};
use crate::storage::{SchemaIntrospector, TelemetryStore};
use crate::{Error, Result, UNKNOWN_CODE};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params_from_iter};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Where a session's rows are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSource {
    /// Canonical rows plus not-yet-migrated legacy rows joined through the catalogs.
    Union,
    /// Canonical rows only.
    CanonicalOnly,
    /// Legacy rows joined through the catalogs; exercise is always `"UNK"`.
    LegacyJoined,
    /// Legacy rows without catalogs; both codes are `"UNK"`.
    LegacyBare,
    /// No source exists.
    Empty,
}

impl RowSource {
    /// Returns the source as a short label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Union => "union",
            Self::CanonicalOnly => "canonical",
            Self::LegacyJoined => "legacy_joined",
            Self::LegacyBare => "legacy_bare",
            Self::Empty => "empty",
        }
    }
}

/// Which row sources the schema currently offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceAvailability {
    /// Canonical table with all of its columns.
    pub canonical: bool,
    /// Legacy table with all of its columns.
    pub legacy: bool,
    /// Item table and domain catalog, the minimum for the joined legacy read.
    pub catalogs: bool,
}

impl SourceAvailability {
    /// Inspects the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if introspection fails.
    pub fn detect(introspector: &dyn SchemaIntrospector, tables: &TableNames) -> Result<Self> {
        Ok(Self {
            canonical: introspector.has_columns(&tables.canonical, CANONICAL_COLUMNS)?,
            legacy: introspector.has_columns(&tables.legacy, LEGACY_COLUMNS)?,
            catalogs: introspector.table_exists(&tables.item)?
                && introspector.table_exists(&tables.domain_catalog)?,
        })
    }

    /// Chooses the row source.
    #[must_use]
    pub const fn row_source(self) -> RowSource {
        let joined = self.legacy && self.catalogs;
        match (self.canonical, joined, self.legacy) {
            (true, true, _) => RowSource::Union,
            (true, false, _) => RowSource::CanonicalOnly,
            (false, true, _) => RowSource::LegacyJoined,
            (false, false, true) => RowSource::LegacyBare,
            (false, false, false) => RowSource::Empty,
        }
    }
}

/// Inclusive creation-date bounds on canonical rows.
///
/// `to` covers the whole day, so `from == to` selects a single day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    /// First day included.
    pub from: Option<NaiveDate>,
    /// Last day included.
    pub to: Option<NaiveDate>,
}

impl DateWindow {
    /// Creates a window from optional bounds.
    #[must_use]
    pub const fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    /// Returns true if either bound is set.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    /// Checks that the bounds are in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when `from` is after `to`.
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(Error::InvalidInput(format!(
                    "date range is inverted: {from} is after {to}"
                )));
            }
        }
        Ok(())
    }

    /// Appends `AND` clauses on `column` for each set bound, binding the dates
    /// as the next positional parameters.
    pub(crate) fn push_sql(&self, column: &str, sql: &mut String, values: &mut Vec<Value>) {
        for (bound, op) in [(self.from, ">="), (self.to, "<=")] {
            if let Some(day) = bound {
                values.push(Value::Text(day.format("%Y-%m-%d").to_string()));
                sql.push_str(&format!(" AND date({column}) {op} ?{}", values.len()));
            }
        }
    }
}

/// Normalized rows of one session, read from a single snapshot.
///
/// The rows are collected inside the read transaction and handed out as an
/// owning iterator, so consuming them never holds the store lock.
#[derive(Debug, Clone)]
pub struct SessionRows {
    source: RowSource,
    rows: std::vec::IntoIter<NormalizedRow>,
}

impl SessionRows {
    /// Wraps rows read from `source`.
    #[must_use]
    pub fn new(source: RowSource, rows: Vec<NormalizedRow>) -> Self {
        Self {
            source,
            rows: rows.into_iter(),
        }
    }

    /// Returns the source the rows came from.
    #[must_use]
    pub const fn source(&self) -> RowSource {
        self.source
    }
}

impl Iterator for SessionRows {
    type Item = NormalizedRow;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for SessionRows {}

/// Reads normalized rows for sessions.
pub struct SessionRowsService {
    store: Arc<TelemetryStore>,
}

impl SessionRowsService {
    /// Creates a reader over a shared store.
    #[must_use]
    pub const fn new(store: Arc<TelemetryStore>) -> Self {
        Self { store }
    }

    /// Returns every row of a session from whichever sources exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the read fails. Missing
    /// sources are not errors.
    #[instrument(skip(self), fields(operation = "rows_for_session", backend = "sqlite"))]
    pub fn rows_for_session(&self, session_id: SessionId) -> Result<SessionRows> {
        let config = self.store.config();
        let (source, rows) = self.store.read("rows_for_session", |tx| {
            read_session_rows(
                tx,
                &config.tables,
                &config.migration_tag,
                session_id,
                DateWindow::default(),
            )
        })?;
        tracing::debug!(source = source.as_str(), rows = rows.len(), "Read session rows");
        Ok(SessionRows::new(source, rows))
    }

    /// Returns the raw legacy rows of a session, correctness normalized.
    ///
    /// Empty when the legacy table is absent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StorageUnavailable`] if the read fails.
    #[instrument(skip(self), fields(operation = "legacy_responses", backend = "sqlite"))]
    pub fn legacy_responses(&self, session_id: SessionId) -> Result<Vec<LegacyResponse>> {
        let tables = self.store.tables();
        self.store.read("legacy_responses", |tx| {
            if !SqliteIntrospector::new(tx).has_columns(&tables.legacy, LEGACY_COLUMNS)? {
                return Ok(Vec::new());
            }
            read_legacy(tx, &tables.legacy, session_id)
        })
    }
}

/// Plans and runs the union read on an open transaction.
pub(crate) fn read_session_rows(
    conn: &Connection,
    tables: &TableNames,
    tag: &str,
    session_id: SessionId,
    window: DateWindow,
) -> Result<(RowSource, Vec<NormalizedRow>)> {
    let introspector = SqliteIntrospector::new(conn);
    let availability = SourceAvailability::detect(&introspector, tables)?;
    let source = availability.row_source();

    let mut values = vec![Value::Integer(session_id.get())];
    let sql = match source {
        RowSource::Empty => return Ok((source, Vec::new())),
        _ if window.is_bounded() => {
            if !availability.canonical {
                return Ok((source, Vec::new()));
            }
            let mut sql = canonical_arm(tables);
            window.push_sql("created_at", &mut sql, &mut values);
            sql
        },
        RowSource::CanonicalOnly => canonical_arm(tables),
        RowSource::LegacyBare => bare_legacy_arm(tables),
        RowSource::LegacyJoined => {
            joined_legacy_arm(tables, &CatalogJoin::plan(&introspector, tables, "r")?, false)
        },
        RowSource::Union => {
            values.push(Value::Text(tag.to_string()));
            format!(
                "{} UNION ALL {}",
                canonical_arm(tables),
                joined_legacy_arm(tables, &CatalogJoin::plan(&introspector, tables, "r")?, true)
            )
        },
    };

    let map_err = map_storage_error("rows_for_session");
    let mut stmt = conn.prepare(&sql).map_err(&map_err)?;
    let rows = stmt
        .query_map(params_from_iter(values), normalized_from_row)
        .map_err(&map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(&map_err)?;
    Ok((source, rows))
}

fn normalized_from_row(row: &Row<'_>) -> rusqlite::Result<NormalizedRow> {
    Ok(NormalizedRow {
        domain_code: row.get(0)?,
        exercise_code: row.get(1)?,
        correct: Correctness::from_sql(row.get_ref(2)?).is_correct(),
        reaction_ms: row.get(3)?,
    })
}

// Every arm binds the session id as `?1`. The union's legacy arm binds the
// migration tag as `?2`; a date window binds its bounds after the session id.

fn canonical_arm(tables: &TableNames) -> String {
    format!(
        "SELECT CAST({domain} AS TEXT), CAST({exercise} AS TEXT), correct, \
                CAST(COALESCE(reaction_ms, 0) AS INTEGER) \
         FROM {canonical} WHERE session_id = ?1",
        domain = code_or_unknown_sql("domain_code"),
        exercise = code_or_unknown_sql("exercise_code"),
        canonical = tables.canonical,
    )
}

fn joined_legacy_arm(tables: &TableNames, plan: &CatalogJoin, exclude_migrated: bool) -> String {
    let mut sql = format!(
        "SELECT CAST({domain} AS TEXT), '{UNKNOWN_CODE}', r.correct, \
                CAST(MAX(COALESCE(r.reaction_ms, 0), 0) AS INTEGER) \
         FROM {legacy} r{joins} WHERE r.session_id = ?1",
        domain = plan.domain_code_sql(),
        legacy = tables.legacy,
        joins = plan.joins,
    );
    if exclude_migrated {
        sql.push_str(&format!(
            " AND NOT EXISTS (SELECT 1 FROM {canonical} c \
               WHERE c.session_id = r.session_id \
                 AND c.item_id IS CAST(r.item_id AS TEXT) \
                 AND c.reaction_ms IS MAX(COALESCE(r.reaction_ms, 0), 0) \
                 AND c.correct = {flag} \
                 AND c.payload = ?2)",
            canonical = tables.canonical,
            flag = correct_flag_sql("r.correct"),
        ));
    }
    sql
}

fn bare_legacy_arm(tables: &TableNames) -> String {
    format!(
        "SELECT '{UNKNOWN_CODE}', '{UNKNOWN_CODE}', correct, \
                CAST(MAX(COALESCE(reaction_ms, 0), 0) AS INTEGER) \
         FROM {legacy} WHERE session_id = ?1",
        legacy = tables.legacy,
    )
}

fn read_legacy(conn: &Connection, legacy: &str, session_id: SessionId) -> Result<Vec<LegacyResponse>> {
    let map_err = map_storage_error("legacy_responses");
    let sql = format!(
        "SELECT session_id, item_id, correct, CAST(COALESCE(reaction_ms, 0) AS INTEGER) \
         FROM {legacy} WHERE session_id = ?1"
    );
    let mut stmt = conn.prepare(&sql).map_err(&map_err)?;
    let rows = stmt
        .query_map([session_id.get()], |row| {
            Ok(LegacyResponse {
                session_id: SessionId::new(row.get(0)?),
                item_id: row.get::<_, Option<i64>>(1)?,
                correct: Correctness::from_sql(row.get_ref(2)?),
                reaction_ms: row.get(3)?,
            })
        })
        .map_err(&map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(&map_err)?;
    Ok(rows)
}
