//! Externally produced trial records for batch ingestion.

use super::SessionId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One externally produced trial, applied by the ingestion upserter.
///
/// Records are keyed by `(session_id, exercise_code, item_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialRecord {
    /// Session reference.
    pub session_id: SessionId,
    /// Domain code.
    pub domain_code: String,
    /// Exercise code (part of the natural key).
    pub exercise_code: String,
    /// Item identifier (part of the natural key).
    pub item_id: String,
    /// Whether the answer was correct.
    pub correct: bool,
    /// Reaction time in milliseconds.
    pub reaction_ms: i64,
    /// When the trial happened; `None` stores the insertion time.
    pub event_time: Option<DateTime<Utc>>,
    /// Payload tag; `None` uses the configured ingestion tag.
    pub payload: Option<String>,
}

impl TrialRecord {
    /// Creates a record with no event time and the default payload tag.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        domain_code: impl Into<String>,
        exercise_code: impl Into<String>,
        item_id: impl Into<String>,
        correct: bool,
        reaction_ms: i64,
    ) -> Self {
        Self {
            session_id,
            domain_code: domain_code.into(),
            exercise_code: exercise_code.into(),
            item_id: item_id.into(),
            correct,
            reaction_ms,
            event_time: None,
            payload: None,
        }
    }

    /// Sets the event time.
    #[must_use]
    pub const fn with_event_time(mut self, at: DateTime<Utc>) -> Self {
        self.event_time = Some(at);
        self
    }

    /// Sets the payload tag.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Checks that the record can be stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when a code or the item id is blank, or
    /// the reaction time is negative.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("domain_code", &self.domain_code),
            ("exercise_code", &self.exercise_code),
            ("item_id", &self.item_id),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!(
                    "trial record for session {} has an empty {field}",
                    self.session_id
                )));
            }
        }
        if self.reaction_ms < 0 {
            return Err(Error::InvalidInput(format!(
                "trial record {}/{}/{} has negative reaction time {}",
                self.session_id, self.exercise_code, self.item_id, self.reaction_ms
            )));
        }
        Ok(())
    }

    /// Formats the event time the way the canonical table stores timestamps.
    #[must_use]
    pub fn event_time_sql(&self) -> Option<String> {
        self.event_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}
