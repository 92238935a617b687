//! Session identifiers.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of an assessment session.
///
/// Sessions are owned by an external collaborator; this crate only refers to
/// them by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(i64);

impl SessionId {
    /// Wraps a raw session id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Parses a session id as typed by a person or passed through a query string.
    ///
    /// Surrounding whitespace, anything after the first whitespace-separated
    /// token, and trailing dots are ignored, so `" 12. "` and `"12 extra"`
    /// both parse as `12`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no integer can be read.
    pub fn parse(input: &str) -> Result<Self> {
        let token = input
            .split_whitespace()
            .next()
            .map(|t| t.trim_end_matches('.'))
            .unwrap_or_default();

        token
            .parse::<i64>()
            .map(Self)
            .map_err(|_| Error::InvalidInput(format!("session id is not numeric: '{input}'")))
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SessionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}
