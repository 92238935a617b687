//! Session JSONL reader for batch ingestion.
//!
//! Each non-blank line is one submitted session:
//!
//! ```json
//! {"session_id": 7, "ts": 1726308000.5, "answers": [
//!   {"domain_code": "VPM", "exercise_code": "E1", "item_id": "I1", "correct": true, "reaction_ms": 420}
//! ]}
//! ```
//!
//! Files written by the earlier collection pipeline use `sesion_id`,
//! `ccp_code`, `ejer_code`, `correcta` and `tr_ms`; both spellings are read.
//!
//! An answer without codes is resolved through the item catalogs when its
//! item id is numeric, and takes the configured defaults otherwise. `ts`
//! (epoch seconds) becomes every answer's event time.

use crate::config::IngestDefaults;
use crate::models::{Correctness, SessionId, TrialRecord};
use crate::storage::{CatalogResolver, InMemoryCatalog};
use crate::{Error, Result, UNKNOWN_CODE};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct SessionLine {
    #[serde(alias = "sesion_id")]
    session_id: Option<i64>,
    ts: Option<f64>,
    #[serde(default)]
    answers: Vec<AnswerLine>,
}

#[derive(Debug, Deserialize)]
struct AnswerLine {
    #[serde(alias = "ccp_code")]
    domain_code: Option<String>,
    #[serde(alias = "ejer_code")]
    exercise_code: Option<String>,
    item_id: Option<ItemId>,
    #[serde(default, alias = "correcta")]
    correct: Correctness,
    #[serde(alias = "tr_ms")]
    reaction_ms: Option<i64>,
}

/// Item ids arrive as strings or bare numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemId {
    Text(String),
    Number(i64),
}

impl ItemId {
    /// The numeric catalog key, if the id has one.
    fn catalog_key(&self) -> Option<i64> {
        match self {
            Self::Text(s) => s.trim().parse().ok(),
            Self::Number(n) => Some(*n),
        }
    }

    fn into_text(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Parses one JSONL line into trial records without catalog lookups.
/// A blank line yields none.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for malformed JSON, a missing
/// `session_id`, or an unrepresentable `ts`.
pub fn parse_session_line(line: &str, defaults: &IngestDefaults) -> Result<Vec<TrialRecord>> {
    parse_session_line_with(line, defaults, &InMemoryCatalog::new())
}

/// Parses one JSONL line, resolving missing codes through `catalog`.
///
/// # Errors
///
/// As [`parse_session_line`], plus any error from the catalog lookup.
pub fn parse_session_line_with(
    line: &str,
    defaults: &IngestDefaults,
    catalog: &dyn CatalogResolver,
) -> Result<Vec<TrialRecord>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let parsed: SessionLine = serde_json::from_str(line)
        .map_err(|e| Error::InvalidInput(format!("malformed session line: {e}")))?;
    let session_id = parsed
        .session_id
        .map(SessionId::new)
        .ok_or_else(|| Error::InvalidInput("session line has no session_id".to_string()))?;
    let event_time = parsed.ts.map(epoch_to_utc).transpose()?;

    parsed
        .answers
        .into_iter()
        .map(|answer| {
            let item_id = answer
                .item_id
                .unwrap_or_else(|| ItemId::Text(defaults.default_item_id.clone()));
            let (domain_code, exercise_code) =
                answer_codes(answer.domain_code, answer.exercise_code, &item_id, defaults, catalog)?;
            let mut record = TrialRecord::new(
                session_id,
                domain_code,
                exercise_code,
                item_id.into_text(),
                answer.correct.is_correct(),
                answer.reaction_ms.unwrap_or(0),
            );
            record.event_time = event_time;
            Ok(record)
        })
        .collect()
}

/// Fills missing codes from the catalog, then from the defaults.
fn answer_codes(
    domain: Option<String>,
    exercise: Option<String>,
    item_id: &ItemId,
    defaults: &IngestDefaults,
    catalog: &dyn CatalogResolver,
) -> Result<(String, String)> {
    if let (Some(domain), Some(exercise)) = (&domain, &exercise) {
        return Ok((domain.clone(), exercise.clone()));
    }

    let resolved = item_id.catalog_key().map(|key| catalog.resolve(key)).transpose()?;
    let known = |code: &str| (code != UNKNOWN_CODE).then(|| code.to_string());
    let domain = domain
        .or_else(|| resolved.as_ref().and_then(|c| known(c.domain_code.as_str())))
        .unwrap_or_else(|| defaults.default_domain_code.clone());
    let exercise = exercise
        .or_else(|| resolved.as_ref().and_then(|c| known(c.exercise_code.as_str())))
        .unwrap_or_else(|| defaults.default_exercise_code.clone());
    Ok((domain, exercise))
}

/// Reads every record of one session file.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the file cannot be read and
/// [`Error::InvalidInput`], prefixed with the file and line, for a bad line.
pub fn read_session_file(
    path: &Path,
    defaults: &IngestDefaults,
    catalog: &dyn CatalogResolver,
) -> Result<Vec<TrialRecord>> {
    let contents = fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_session_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;

    let mut records = Vec::new();
    for (n, line) in contents.lines().enumerate() {
        let parsed = parse_session_line_with(line, defaults, catalog).map_err(|e| match e {
            Error::InvalidInput(msg) => {
                Error::InvalidInput(format!("{}:{}: {msg}", path.display(), n + 1))
            },
            other => other,
        })?;
        records.extend(parsed);
    }
    tracing::debug!(path = %path.display(), records = records.len(), "Read session file");
    Ok(records)
}

/// Reads every `session_*.jsonl` file in `dir`, in file name order.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the directory cannot be listed, or
/// any error from [`read_session_file`].
pub fn read_session_dir(
    dir: &Path,
    defaults: &IngestDefaults,
    catalog: &dyn CatalogResolver,
) -> Result<Vec<TrialRecord>> {
    let mut records = Vec::new();
    for path in session_files(dir)? {
        records.extend(read_session_file(&path, defaults, catalog)?);
    }
    Ok(records)
}

fn session_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let map_err = |e: std::io::Error| Error::OperationFailed {
        operation: "read_session_dir".to_string(),
        cause: format!("{}: {e}", dir.display()),
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(map_err)? {
        let path = entry.map_err(map_err)?.path();
        let is_session = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("session_") && n.ends_with(".jsonl"));
        if is_session && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn epoch_to_utc(ts: f64) -> Result<DateTime<Utc>> {
    let invalid = || Error::InvalidInput(format!("ts {ts} is not a valid epoch timestamp"));
    if !ts.is_finite() {
        return Err(invalid());
    }
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos).ok_or_else(invalid)
}
