//! Filtered per-session panel metrics over the canonical table.

use super::SessionId;
use serde::Serialize;

/// Per-domain statistics within one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelDomainStats {
    /// Domain code.
    pub domain_code: String,
    /// Rows in the group.
    pub n: u64,
    /// Correct rows in the group.
    pub correct: u64,
    /// Percentage correct, one decimal place.
    pub accuracy_pct: f64,
    /// Mean reaction time over rows with a reaction time, one decimal place.
    pub mean_reaction_ms: Option<f64>,
    /// Earliest creation timestamp.
    pub first_at: Option<String>,
    /// Latest creation timestamp.
    pub last_at: Option<String>,
}

/// Session-wide totals derived from the domain groups.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PanelTotals {
    /// Rows across all domains.
    pub n: u64,
    /// Correct rows across all domains.
    pub correct: u64,
    /// Percentage correct over all rows.
    pub accuracy_pct: f64,
    /// Reaction time mean weighted by each domain's row count.
    pub mean_reaction_ms: Option<f64>,
}

/// Activity summary of one session, for session listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// Session id.
    pub session_id: SessionId,
    /// Canonical rows recorded for the session.
    pub responses: u64,
    /// Latest creation timestamp.
    pub last_at: Option<String>,
}

/// One session in a panel metrics report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelSession {
    /// Session id.
    pub session_id: SessionId,
    /// Domain groups, sorted by domain code.
    pub domains: Vec<PanelDomainStats>,
    /// Totals over `domains`.
    pub totals: PanelTotals,
}

impl PanelSession {
    /// Builds a session entry, deriving totals from the domain groups.
    #[must_use]
    pub fn new(session_id: SessionId, domains: Vec<PanelDomainStats>) -> Self {
        let totals = PanelTotals::from_domains(&domains);
        Self {
            session_id,
            domains,
            totals,
        }
    }
}

impl PanelTotals {
    /// Sums counts and weights the reaction mean by each group's `n`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_domains(domains: &[PanelDomainStats]) -> Self {
        let n: u64 = domains.iter().map(|d| d.n).sum();
        let correct: u64 = domains.iter().map(|d| d.correct).sum();
        if n == 0 {
            return Self::default();
        }

        let (weight, weighted_sum) = domains
            .iter()
            .filter_map(|d| d.mean_reaction_ms.map(|m| (d.n, m * d.n as f64)))
            .fold((0_u64, 0.0_f64), |(w, s), (dn, dm)| (w + dn, s + dm));
        let mean_reaction_ms = (weight > 0).then(|| super::round1(weighted_sum / weight as f64));

        Self {
            n,
            correct,
            accuracy_pct: super::round1(100.0 * correct as f64 / n as f64),
            mean_reaction_ms,
        }
    }
}
