//! Per-trial response rows in both storage shapes.

use super::SessionId;
use rusqlite::types::ValueRef;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel code substituted whenever a domain or exercise code cannot be resolved.
pub const UNKNOWN_CODE: &str = "UNK";

/// A correctness flag normalized from any of its stored representations.
///
/// Sources disagree on how correctness is stored: integers, booleans, and
/// string literals such as `"1"`, `"t"` or `"true"` all occur. Every source
/// adapter converts to this type at its boundary so only `bool` travels
/// further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Correctness(bool);

impl Correctness {
    /// A correct answer.
    pub const CORRECT: Self = Self(true);
    /// An incorrect answer.
    pub const INCORRECT: Self = Self(false);

    /// Returns the flag as a `bool`.
    #[must_use]
    pub const fn is_correct(self) -> bool {
        self.0
    }

    /// Normalizes a textual flag. Accepts `1`, `t`, `true`, `y`, `yes` in any case.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self(matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "1" | "t" | "true" | "y" | "yes"
        ))
    }

    /// Normalizes an integer flag: any non-zero value is correct.
    #[must_use]
    pub const fn from_int(value: i64) -> Self {
        Self(value != 0)
    }

    /// Normalizes a raw `SQLite` value. `NULL` and blobs are incorrect.
    #[must_use]
    pub fn from_sql(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Integer(i) => Self::from_int(i),
            ValueRef::Real(f) => Self(f != 0.0),
            ValueRef::Text(t) => Self::from_text(&String::from_utf8_lossy(t)),
            ValueRef::Null | ValueRef::Blob(_) => Self::INCORRECT,
        }
    }
}

impl From<bool> for Correctness {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

impl From<Correctness> for bool {
    fn from(value: Correctness) -> Self {
        value.0
    }
}

impl<'de> Deserialize<'de> for Correctness {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CorrectnessVisitor;

        impl<'v> Visitor<'v> for CorrectnessVisitor {
            type Value = Correctness;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a boolean, an integer, or a truthy string")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Correctness, E> {
                Ok(Correctness(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Correctness, E> {
                Ok(Correctness::from_int(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Correctness, E> {
                Ok(Correctness(v != 0))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Correctness, E> {
                Ok(Correctness(v != 0.0))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Correctness, E> {
                Ok(Correctness::from_text(v))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Correctness, E> {
                Ok(Correctness::INCORRECT)
            }

            fn visit_none<E: de::Error>(self) -> Result<Correctness, E> {
                Ok(Correctness::INCORRECT)
            }

            fn visit_some<D: Deserializer<'v>>(self, d: D) -> Result<Correctness, D::Error> {
                d.deserialize_any(self)
            }
        }

        deserializer.deserialize_any(CorrectnessVisitor)
    }
}

/// Domain and exercise codes resolved for a legacy item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ItemCodes {
    /// Domain code, or [`UNKNOWN_CODE`].
    pub domain_code: String,
    /// Exercise code, or [`UNKNOWN_CODE`].
    pub exercise_code: String,
}

impl ItemCodes {
    /// Builds codes from optional catalog lookups, substituting the sentinel.
    #[must_use]
    pub fn from_lookup(domain: Option<String>, exercise: Option<String>) -> Self {
        Self {
            domain_code: domain.unwrap_or_else(|| UNKNOWN_CODE.to_string()),
            exercise_code: exercise.unwrap_or_else(|| UNKNOWN_CODE.to_string()),
        }
    }

    /// Both codes unknown.
    #[must_use]
    pub fn unknown() -> Self {
        Self::from_lookup(None, None)
    }
}

/// One trial under the legacy schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyResponse {
    /// Session reference.
    pub session_id: SessionId,
    /// Numeric item reference; `None` when the row has none, which resolves
    /// to the unknown codes.
    pub item_id: Option<i64>,
    /// Normalized correctness.
    pub correct: Correctness,
    /// Reaction time in milliseconds.
    pub reaction_ms: i64,
}

impl LegacyResponse {
    /// Projects the response onto the normalized row shape read by the union
    /// path: domain from the resolved codes, exercise always unknown.
    #[must_use]
    pub fn to_normalized(&self, codes: &ItemCodes) -> NormalizedRow {
        NormalizedRow {
            domain_code: codes.domain_code.clone(),
            exercise_code: UNKNOWN_CODE.to_string(),
            correct: self.correct.is_correct(),
            reaction_ms: self.reaction_ms.max(0),
        }
    }
}

/// One trial under the canonical schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalResponse {
    /// Row id.
    pub id: i64,
    /// Session reference.
    pub session_id: SessionId,
    /// Domain code (sentinel substituted for nulls).
    pub domain_code: String,
    /// Exercise code (sentinel substituted for nulls).
    pub exercise_code: String,
    /// Item identifier as text.
    pub item_id: Option<String>,
    /// Payload tag, e.g. the migration tag for backfilled rows.
    pub payload: Option<String>,
    /// Normalized correctness.
    pub correct: bool,
    /// Reaction time in milliseconds.
    pub reaction_ms: i64,
    /// Creation timestamp as stored.
    pub created_at: Option<String>,
}

/// A single trial reduced to the fields the aggregator needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NormalizedRow {
    /// Domain code, never empty in rows produced by this crate.
    pub domain_code: String,
    /// Exercise code, never empty in rows produced by this crate.
    pub exercise_code: String,
    /// Whether the answer was correct.
    pub correct: bool,
    /// Reaction time in milliseconds.
    pub reaction_ms: i64,
}

impl NormalizedRow {
    /// Creates a normalized row.
    #[must_use]
    pub fn new(
        domain_code: impl Into<String>,
        exercise_code: impl Into<String>,
        correct: bool,
        reaction_ms: i64,
    ) -> Self {
        Self {
            domain_code: domain_code.into(),
            exercise_code: exercise_code.into(),
            correct,
            reaction_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ValueRef::Integer(1), true ; "integer one")]
    #[test_case(ValueRef::Integer(0), false ; "integer zero")]
    #[test_case(ValueRef::Integer(-3), true ; "negative integer")]
    #[test_case(ValueRef::Real(1.0), true ; "real one")]
    #[test_case(ValueRef::Real(0.0), false ; "real zero")]
    #[test_case(ValueRef::Text(b"1"), true ; "text one")]
    #[test_case(ValueRef::Text(b"TRUE"), true ; "text true upper")]
    #[test_case(ValueRef::Text(b" t "), true ; "text t padded")]
    #[test_case(ValueRef::Text(b"false"), false ; "text false")]
    #[test_case(ValueRef::Text(b"0"), false ; "text zero")]
    #[test_case(ValueRef::Null, false ; "null")]
    fn test_correctness_from_sql(value: ValueRef<'_>, expected: bool) {
        assert_eq!(Correctness::from_sql(value).is_correct(), expected);
    }

    #[test]
    fn test_correctness_deserialize_mixed_representations() {
        let parsed: Vec<Correctness> =
            serde_json::from_str(r#"[true, false, 1, 0, "1", "true", "no", null, 1.0]"#).unwrap();
        let flags: Vec<bool> = parsed.into_iter().map(bool::from).collect();
        assert_eq!(
            flags,
            vec![true, false, true, false, true, true, false, false, true]
        );
    }

    #[test]
    fn test_item_codes_sentinel() {
        let codes = ItemCodes::from_lookup(Some("MCP".to_string()), None);
        assert_eq!(codes.domain_code, "MCP");
        assert_eq!(codes.exercise_code, UNKNOWN_CODE);
        assert_eq!(ItemCodes::unknown().domain_code, UNKNOWN_CODE);
    }

    #[test]
    fn test_legacy_to_normalized_drops_exercise_dimension() {
        let legacy = LegacyResponse {
            session_id: SessionId::new(4),
            item_id: Some(17),
            correct: Correctness::CORRECT,
            reaction_ms: 512,
        };
        let codes = ItemCodes::from_lookup(Some("INH".to_string()), Some("GO_NOGO".to_string()));
        let row = legacy.to_normalized(&codes);
        assert_eq!(row, NormalizedRow::new("INH", UNKNOWN_CODE, true, 512));
    }
}
