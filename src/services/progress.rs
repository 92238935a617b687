//! Session progress and panel metrics.
//!
//! Progress combines the union read with the aggregator for one session.
//! Session listings, recent responses and panel metrics query the canonical
//! table directly, since only canonical rows carry a creation time.

use super::aggregate::aggregate;
use super::session_rows::{DateWindow, RowSource, read_session_rows};
use crate::models::{
    CanonicalResponse, Correctness, GroupStats, NormalizedRow, PanelDomainStats, PanelSession,
    SessionId, SessionSummary, round1,
};
use crate::storage::sqlite::schema::CANONICAL_COLUMNS;
use crate::storage::sqlite::{
    SqliteIntrospector, code_or_unknown_sql, correct_flag_sql, map_storage_error,
};
use crate::storage::{SchemaIntrospector, TelemetryStore};
use crate::{Error, Result};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Aggregated progress of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionProgress {
    /// Session the statistics describe.
    pub session_id: SessionId,
    /// Where the rows were read from.
    pub source: RowSource,
    /// Groups by domain code.
    pub by_domain: Vec<GroupStats>,
    /// Groups by (domain code, exercise code).
    pub by_exercise: Vec<GroupStats>,
    /// Explanation when no rows were found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Most rows [`ProgressService::recent_responses`] returns.
pub const MAX_RECENT_RESPONSES: usize = 500;

/// Optional filters applied to a session's rows.
///
/// Code filters apply to every row. A bounded date window keeps only
/// canonical rows created inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Keep only this domain code.
    pub domain_code: Option<String>,
    /// Keep only this exercise code.
    pub exercise_code: Option<String>,
    /// Inclusive creation-date bounds.
    pub dates: DateWindow,
}

impl RowFilter {
    /// Creates a filter that keeps every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only rows of this domain.
    #[must_use]
    pub fn with_domain(mut self, code: impl Into<String>) -> Self {
        self.domain_code = Some(code.into());
        self
    }

    /// Keeps only rows of this exercise.
    #[must_use]
    pub fn with_exercise(mut self, code: impl Into<String>) -> Self {
        self.exercise_code = Some(code.into());
        self
    }

    /// Keeps only rows created between `from` and `to`, both days included.
    #[must_use]
    pub const fn with_dates(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.dates = DateWindow::new(from, to);
        self
    }

    /// Returns true if the row passes the code filters.
    #[must_use]
    pub fn matches(&self, row: &NormalizedRow) -> bool {
        self.domain_code.as_ref().is_none_or(|d| *d == row.domain_code)
            && self.exercise_code.as_ref().is_none_or(|e| *e == row.exercise_code)
    }
}

/// Filters for [`ProgressService::panel_metrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsFilter {
    /// Only this session.
    pub session_id: Option<SessionId>,
    /// Only this domain code.
    pub domain_code: Option<String>,
    /// Rows created on or after this date.
    pub since: Option<NaiveDate>,
    /// Rows created before this date.
    pub until: Option<NaiveDate>,
}

impl MetricsFilter {
    /// Creates a filter that keeps every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one session.
    #[must_use]
    pub const fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Restricts to one domain.
    #[must_use]
    pub fn with_domain(mut self, code: impl Into<String>) -> Self {
        self.domain_code = Some(code.into());
        self
    }

    /// Restricts to the half-open date range `[since, until)`.
    #[must_use]
    pub const fn with_range(mut self, since: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    /// Parses a `YYYY-MM-DD` date.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for anything else.
    pub fn parse_date(input: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
            .map_err(|e| Error::InvalidInput(format!("invalid date '{input}': {e}")))
    }

    /// Checks that the date range is not empty or inverted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when `since >= until`.
    pub fn validate(&self) -> Result<()> {
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since >= until {
                return Err(Error::InvalidInput(format!(
                    "date range is empty: since {since} is not before until {until}"
                )));
            }
        }
        Ok(())
    }
}

/// Progress and reporting queries.
pub struct ProgressService {
    store: Arc<TelemetryStore>,
}

impl ProgressService {
    /// Creates a progress service over a shared store.
    #[must_use]
    pub const fn new(store: Arc<TelemetryStore>) -> Self {
        Self { store }
    }

    /// Aggregates every row of a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the read fails.
    pub fn session_progress(&self, session_id: SessionId) -> Result<SessionProgress> {
        self.session_progress_filtered(session_id, &RowFilter::default())
    }

    /// Aggregates the rows of a session that pass `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an inverted date window and
    /// [`Error::StorageUnavailable`] if the read fails.
    #[instrument(skip(self), fields(operation = "session_progress", backend = "sqlite"))]
    pub fn session_progress_filtered(
        &self,
        session_id: SessionId,
        filter: &RowFilter,
    ) -> Result<SessionProgress> {
        filter.dates.validate()?;
        let config = self.store.config();
        let (source, rows) = self.store.read("session_progress", |tx| {
            read_session_rows(tx, &config.tables, &config.migration_tag, session_id, filter.dates)
        })?;

        let result = aggregate(rows.into_iter().filter(|r| filter.matches(r)));
        let note = match (source, result.is_empty()) {
            (RowSource::Empty, _) => Some("no per-trial source available".to_string()),
            (_, true) => Some(format!("no rows for session {session_id}")),
            _ => None,
        };

        Ok(SessionProgress {
            session_id,
            source,
            by_domain: result.by_domain,
            by_exercise: result.by_exercise,
            note,
        })
    }

    /// Returns the canonical rows of a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the read fails.
    #[instrument(skip(self), fields(operation = "session_responses", backend = "sqlite"))]
    pub fn session_responses(&self, session_id: SessionId) -> Result<Vec<CanonicalResponse>> {
        let table = self.store.tables().canonical.as_str();
        self.store.read("session_responses", |tx| {
            if !SqliteIntrospector::new(tx).has_columns(table, CANONICAL_COLUMNS)? {
                return Ok(Vec::new());
            }
            read_canonical(tx, table, session_id, &RowFilter::default(), CanonicalOrder::Oldest)
        })
    }

    /// Returns up to `last_n` canonical rows of a session that pass
    /// `filter`, newest first. `last_n` is clamped to
    /// `1..=`[`MAX_RECENT_RESPONSES`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an inverted date window and
    /// [`Error::StorageUnavailable`] if the read fails.
    #[instrument(skip(self), fields(operation = "recent_responses", backend = "sqlite"))]
    pub fn recent_responses(
        &self,
        session_id: SessionId,
        filter: &RowFilter,
        last_n: usize,
    ) -> Result<Vec<CanonicalResponse>> {
        filter.dates.validate()?;
        let limit = last_n.clamp(1, MAX_RECENT_RESPONSES);
        let table = self.store.tables().canonical.as_str();
        self.store.read("recent_responses", |tx| {
            if !SqliteIntrospector::new(tx).has_columns(table, CANONICAL_COLUMNS)? {
                return Ok(Vec::new());
            }
            read_canonical(tx, table, session_id, filter, CanonicalOrder::Newest(limit))
        })
    }

    /// Lists sessions with canonical rows inside `window`, most recently
    /// active first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an inverted window and
    /// [`Error::StorageUnavailable`] if the read fails.
    #[instrument(skip(self), fields(operation = "list_sessions", backend = "sqlite"))]
    pub fn list_sessions(&self, window: &DateWindow) -> Result<Vec<SessionSummary>> {
        window.validate()?;
        let table = self.store.tables().canonical.as_str();
        self.store.read("list_sessions", |tx| {
            if !SqliteIntrospector::new(tx).has_columns(table, CANONICAL_COLUMNS)? {
                return Ok(Vec::new());
            }
            read_session_summaries(tx, table, window)
        })
    }

    /// Per-session, per-domain statistics over the canonical table.
    ///
    /// Sessions are sorted ascending and domains by code. An absent canonical
    /// table yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty or inverted date range and
    /// [`Error::StorageUnavailable`] if the read fails.
    #[instrument(skip(self), fields(operation = "panel_metrics", backend = "sqlite"))]
    pub fn panel_metrics(&self, filter: &MetricsFilter) -> Result<Vec<PanelSession>> {
        filter.validate()?;
        let table = self.store.tables().canonical.as_str();
        let groups = self.store.read("panel_metrics", |tx| {
            if !SqliteIntrospector::new(tx).has_columns(table, CANONICAL_COLUMNS)? {
                return Ok(Vec::new());
            }
            read_panel_groups(tx, table, filter)
        })?;

        let mut sessions: Vec<PanelSession> = Vec::new();
        let mut current: Option<(i64, Vec<PanelDomainStats>)> = None;
        for (session, stats) in groups {
            match current.as_mut() {
                Some((id, domains)) if *id == session => domains.push(stats),
                _ => {
                    if let Some((id, domains)) = current.take() {
                        sessions.push(PanelSession::new(SessionId::new(id), domains));
                    }
                    current = Some((session, vec![stats]));
                },
            }
        }
        if let Some((id, domains)) = current {
            sessions.push(PanelSession::new(SessionId::new(id), domains));
        }
        Ok(sessions)
    }
}

#[derive(Debug, Clone, Copy)]
enum CanonicalOrder {
    Oldest,
    Newest(usize),
}

fn read_canonical(
    conn: &Connection,
    table: &str,
    session_id: SessionId,
    filter: &RowFilter,
    order: CanonicalOrder,
) -> Result<Vec<CanonicalResponse>> {
    let domain = code_or_unknown_sql("domain_code");
    let exercise = code_or_unknown_sql("exercise_code");

    let mut values = vec![Value::Integer(session_id.get())];
    let mut conditions = String::from("session_id = ?1");
    for (column, code) in [(&domain, &filter.domain_code), (&exercise, &filter.exercise_code)] {
        if let Some(code) = code {
            values.push(Value::Text(code.clone()));
            conditions.push_str(&format!(" AND {column} = ?{}", values.len()));
        }
    }
    filter.dates.push_sql("created_at", &mut conditions, &mut values);

    let tail = match order {
        CanonicalOrder::Oldest => "ORDER BY created_at, item_id, id".to_string(),
        CanonicalOrder::Newest(limit) => format!("ORDER BY created_at DESC, id DESC LIMIT {limit}"),
    };
    let sql = format!(
        "SELECT id, session_id, CAST({domain} AS TEXT), CAST({exercise} AS TEXT), \
                CAST(item_id AS TEXT), payload, correct, \
                CAST(COALESCE(reaction_ms, 0) AS INTEGER), CAST(created_at AS TEXT) \
         FROM {table} WHERE {conditions} {tail}"
    );

    let map_err = map_storage_error("session_responses");
    let mut stmt = conn.prepare(&sql).map_err(&map_err)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(CanonicalResponse {
                id: row.get(0)?,
                session_id: SessionId::new(row.get(1)?),
                domain_code: row.get(2)?,
                exercise_code: row.get(3)?,
                item_id: row.get(4)?,
                payload: row.get(5)?,
                correct: Correctness::from_sql(row.get_ref(6)?).is_correct(),
                reaction_ms: row.get(7)?,
                created_at: row.get(8)?,
            })
        })
        .map_err(&map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(&map_err)?;
    Ok(rows)
}

fn read_session_summaries(
    conn: &Connection,
    table: &str,
    window: &DateWindow,
) -> Result<Vec<SessionSummary>> {
    let mut values = Vec::new();
    let mut conditions = String::from("session_id IS NOT NULL");
    window.push_sql("created_at", &mut conditions, &mut values);
    let sql = format!(
        "SELECT session_id, COUNT(*), CAST(MAX(created_at) AS TEXT) \
         FROM {table} WHERE {conditions} \
         GROUP BY session_id \
         ORDER BY MAX(created_at) DESC, session_id"
    );

    let map_err = map_storage_error("list_sessions");
    let mut stmt = conn.prepare(&sql).map_err(&map_err)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(SessionSummary {
                session_id: SessionId::new(row.get(0)?),
                responses: u64::try_from(row.get::<_, i64>(1)?).unwrap_or_default(),
                last_at: row.get(2)?,
            })
        })
        .map_err(&map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(&map_err)?;
    Ok(rows)
}

fn read_panel_groups(
    conn: &Connection,
    table: &str,
    filter: &MetricsFilter,
) -> Result<Vec<(i64, PanelDomainStats)>> {
    let domain = code_or_unknown_sql("domain_code");
    let mut clauses = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(id) = filter.session_id {
        values.push(Value::Integer(id.get()));
        clauses.push(format!("session_id = ?{}", values.len()));
    }
    if let Some(code) = &filter.domain_code {
        values.push(Value::Text(code.clone()));
        clauses.push(format!("{domain} = ?{}", values.len()));
    }
    if let Some(since) = filter.since {
        values.push(Value::Text(since.format("%Y-%m-%d").to_string()));
        clauses.push(format!("date(created_at) >= ?{}", values.len()));
    }
    if let Some(until) = filter.until {
        values.push(Value::Text(until.format("%Y-%m-%d").to_string()));
        clauses.push(format!("date(created_at) < ?{}", values.len()));
    }
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let flag = correct_flag_sql("correct");
    let sql = format!(
        "SELECT session_id, CAST({domain} AS TEXT) AS code, COUNT(*), SUM({flag}), \
                AVG(reaction_ms), CAST(MIN(created_at) AS TEXT), CAST(MAX(created_at) AS TEXT) \
         FROM {table}{where_clause} \
         GROUP BY session_id, code \
         ORDER BY session_id, code"
    );

    let map_err = map_storage_error("panel_metrics");
    let mut stmt = conn.prepare(&sql).map_err(&map_err)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            let n: i64 = row.get(2)?;
            let correct: i64 = row.get(3)?;
            let mean: Option<f64> = row.get(4)?;
            Ok((
                row.get::<_, i64>(0)?,
                PanelDomainStats {
                    domain_code: row.get(1)?,
                    n: u64::try_from(n).unwrap_or_default(),
                    correct: u64::try_from(correct).unwrap_or_default(),
                    accuracy_pct: accuracy(correct, n),
                    mean_reaction_ms: mean.map(round1),
                    first_at: row.get(5)?,
                    last_at: row.get(6)?,
                },
            ))
        })
        .map_err(&map_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(&map_err)?;
    Ok(rows)
}

#[allow(clippy::cast_precision_loss)]
fn accuracy(correct: i64, n: i64) -> f64 {
    if n == 0 {
        0.0
    } else {
        round1(100.0 * correct as f64 / n as f64)
    }
}
