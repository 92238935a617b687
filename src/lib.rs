//! # Cogtrace
//!
//! Telemetry reconciliation and aggregation for cognitive-assessment sessions.
//!
//! Per-trial responses live in two storage shapes: a legacy table keyed by
//! numeric item ids, and a canonical table carrying domain and exercise codes
//! directly. Cogtrace migrates legacy rows into the canonical shape without
//! duplicating them, reads a session transparently from whichever shapes are
//! present, and reduces the rows to accuracy and reaction-time statistics.
//!
//! ## Components
//!
//! - Schema introspection ([`SchemaIntrospector`]) over the embedded store and,
//!   with the `postgres` feature, a relational server
//! - Catalog resolution ([`CatalogResolver`]) with the `"UNK"` sentinel
//! - Backfill ([`BackfillService`]) of legacy rows into the canonical table
//! - Union reads ([`SessionRowsService`]) with three-tier fallback
//! - Aggregation ([`aggregate`]) by domain and by exercise
//! - Session progress and panel metrics ([`ProgressService`])
//! - Idempotent batch upserts ([`IngestService`]) and CSV export ([`io::csv`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cogtrace::{BackfillService, CogtraceConfig, ProgressService, SessionId, TelemetryStore};
//!
//! let store = Arc::new(TelemetryStore::open(&CogtraceConfig::load_default())?);
//! let stats = BackfillService::new(Arc::clone(&store)).backfill(None)?;
//! let progress = ProgressService::new(store).session_progress(SessionId::new(1))?;
//! # Ok::<(), cogtrace::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{CogtraceConfig, IngestDefaults, RetryConfig, TableNames};
pub use models::{
    AggregateResult, BackfillPreview, BackfillResult, CanonicalResponse, Correctness, GroupStats,
    ItemCodes, LegacyResponse, NormalizedRow, PanelDomainStats, PanelSession, PanelTotals,
    SessionId, SessionSummary, TrialRecord, UNKNOWN_CODE, UpsertResult,
};
pub use services::{
    BackfillService, DateWindow, IngestService, MAX_RECENT_RESPONSES, MetricsFilter,
    ProgressService, RowFilter, RowSource, SessionProgress, SessionRows, SessionRowsService,
    SourceAvailability, aggregate,
};
pub use storage::{CatalogResolver, SchemaIntrospector, TelemetryStore};

/// Error type for cogtrace operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Non-numeric session id, malformed trial record, bad table name, inverted date range |
/// | `ConstraintViolation` | A uniqueness or other constraint fired inside a storage transaction |
/// | `Transient` | Retry budget exhausted, or the database stayed busy past the busy timeout |
/// | `StorageUnavailable` | Connection or IO fault in the storage engine |
/// | `OperationFailed` | Config file, export writer, or logging setup failures |
///
/// A missing table or catalog is never an error: it degrades to a documented
/// fallback and is reported through result fields such as
/// [`BackfillResult::note`].
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Always raised before storage is touched.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A storage constraint fired (typically a uniqueness race).
    #[error("constraint violation in '{operation}': {cause}")]
    ConstraintViolation {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A retryable failure that persisted; the caller may try again later.
    #[error("transient failure in '{operation}': {cause}")]
    Transient {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The storage engine failed; nothing from the operation was committed.
    #[error("storage unavailable during '{operation}': {cause}")]
    StorageUnavailable {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A non-storage operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns true when re-running the operation in a fresh transaction may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. } | Self::Transient { .. })
    }

    /// Converts a retryable error into the [`Error::Transient`] surfaced after retries.
    #[must_use]
    pub fn into_transient(self) -> Self {
        match self {
            Self::ConstraintViolation { operation, cause } => Self::Transient {
                operation,
                cause: format!("constraint violation persisted after retry: {cause}"),
            },
            other => other,
        }
    }
}

/// Result type alias for cogtrace operations.
pub type Result<T> = std::result::Result<T, Error>;
