//! Data models for cogtrace.
//!
//! Row shapes for both storage schemas, the normalized row consumed by the
//! aggregator, trial records for batch ingestion, and the result shapes
//! returned to collaborators.

mod panel;
mod response;
mod session;
mod stats;
mod trial;

pub use panel::{PanelDomainStats, PanelSession, PanelTotals, SessionSummary};
pub use response::{
    CanonicalResponse, Correctness, ItemCodes, LegacyResponse, NormalizedRow, UNKNOWN_CODE,
};
pub use session::SessionId;
pub use stats::{
    AggregateResult, BackfillPreview, BackfillResult, GroupStats, Totals, UpsertResult, round1,
};
pub use trial::TrialRecord;
