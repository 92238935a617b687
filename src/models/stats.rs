//! Result shapes returned to collaborators.

use super::SessionId;
use serde::Serialize;

/// Rounds to one decimal place, the precision of every reported statistic.
///
/// Rounds the exact binary value, ties to even: `6.25` becomes `6.2`, and
/// `0.15` (stored just below the midpoint) becomes `0.1`.
#[must_use]
pub fn round1(value: f64) -> f64 {
    format!("{value:.1}").parse().unwrap_or(value)
}

/// Statistics for one aggregation group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    /// Domain code of the group.
    pub domain_code: String,
    /// Exercise code, present only in by-exercise groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise_code: Option<String>,
    /// Number of rows in the group.
    pub n: u64,
    /// Percentage of correct rows, one decimal place.
    pub accuracy_pct: f64,
    /// Mean reaction time in milliseconds, one decimal place.
    pub mean_reaction_ms: f64,
}

/// Grouped statistics for a row stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateResult {
    /// Groups keyed by domain code, sorted by domain code.
    pub by_domain: Vec<GroupStats>,
    /// Groups keyed by (domain code, exercise code), sorted by that pair.
    pub by_exercise: Vec<GroupStats>,
}

impl AggregateResult {
    /// Returns true when no rows were aggregated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }

    /// Overall statistics across every domain group.
    ///
    /// Accuracy and mean reaction time are weighted by group size, so they
    /// match what a single group over all rows would report up to rounding of
    /// the per-group inputs.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn totals(&self) -> Totals {
        let n: u64 = self.by_domain.iter().map(|g| g.n).sum();
        if n == 0 {
            return Totals::default();
        }
        let weighted = |f: fn(&GroupStats) -> f64| {
            self.by_domain.iter().map(|g| f(g) * g.n as f64).sum::<f64>() / n as f64
        };
        Totals {
            n,
            accuracy_pct: round1(weighted(|g| g.accuracy_pct)),
            mean_reaction_ms: round1(weighted(|g| g.mean_reaction_ms)),
        }
    }
}

/// Overall statistics for an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Totals {
    /// Total rows.
    pub n: u64,
    /// Weighted accuracy percentage.
    pub accuracy_pct: f64,
    /// Weighted mean reaction time.
    pub mean_reaction_ms: f64,
}

/// Statistics of one session after a scoped backfill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillPreview {
    /// Session the statistics describe.
    pub session_id: SessionId,
    /// Union-read aggregate of the session.
    #[serde(flatten)]
    pub stats: AggregateResult,
}

/// Outcome of a backfill run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BackfillResult {
    /// Rows inserted by this run (`after - before`).
    pub inserted: u64,
    /// Canonical rows in scope before the run.
    pub before: u64,
    /// Canonical rows in scope after the run.
    pub after: u64,
    /// Legacy sessions with no canonical session record; their rows were not migrated.
    pub skipped_sessions: Vec<i64>,
    /// Explanation when the run had nothing to do.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Statistics of the session a scoped run targeted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<BackfillPreview>,
}

impl BackfillResult {
    /// A zero-effect result carrying an explanatory note.
    #[must_use]
    pub fn noop(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::default()
        }
    }

    /// Builds a result from the scoped counts, clamping `inserted` at zero.
    #[must_use]
    pub const fn from_counts(before: u64, after: u64, skipped_sessions: Vec<i64>) -> Self {
        Self {
            inserted: after.saturating_sub(before),
            before,
            after,
            skipped_sessions,
            note: None,
            preview: None,
        }
    }
}

/// Outcome of a batch upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UpsertResult {
    /// Records applied, each either inserted or replacing an existing row.
    pub inserted_or_replaced: u64,
    /// Pre-existing duplicate rows removed before the uniqueness constraint was established.
    pub duplicates_removed: u64,
}
