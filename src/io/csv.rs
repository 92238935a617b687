//! CSV export of aggregates and panel metrics.
//!
//! Numeric statistics are written with one decimal place; absent values are
//! empty fields.

use crate::models::{AggregateResult, PanelSession};
use crate::{Error, Result};
use std::io::Write;

fn csv_error(operation: &'static str) -> impl Fn(csv::Error) -> Error {
    move |e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

fn one_decimal(value: f64) -> String {
    format!("{value:.1}")
}

fn finish<W: Write>(mut writer: csv::Writer<W>, operation: &'static str) -> Result<()> {
    writer.flush().map_err(|e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    })
}

/// Writes the per-domain groups.
///
/// Header: `domain_code,n,accuracy_pct,mean_reaction_ms`.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the writer fails.
pub fn write_by_domain<W: Write>(result: &AggregateResult, out: W) -> Result<()> {
    let map_err = csv_error("write_by_domain");
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(["domain_code", "n", "accuracy_pct", "mean_reaction_ms"])
        .map_err(&map_err)?;
    for group in &result.by_domain {
        writer
            .write_record([
                group.domain_code.clone(),
                group.n.to_string(),
                one_decimal(group.accuracy_pct),
                one_decimal(group.mean_reaction_ms),
            ])
            .map_err(&map_err)?;
    }
    finish(writer, "write_by_domain")
}

/// Writes the per-exercise groups.
///
/// Header: `domain_code,exercise_code,n,accuracy_pct,mean_reaction_ms`.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the writer fails.
pub fn write_by_exercise<W: Write>(result: &AggregateResult, out: W) -> Result<()> {
    let map_err = csv_error("write_by_exercise");
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record([
            "domain_code",
            "exercise_code",
            "n",
            "accuracy_pct",
            "mean_reaction_ms",
        ])
        .map_err(&map_err)?;
    for group in &result.by_exercise {
        writer
            .write_record([
                group.domain_code.clone(),
                group.exercise_code.clone().unwrap_or_default(),
                group.n.to_string(),
                one_decimal(group.accuracy_pct),
                one_decimal(group.mean_reaction_ms),
            ])
            .map_err(&map_err)?;
    }
    finish(writer, "write_by_exercise")
}

/// Writes one row per (session, domain) of a panel report.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the writer fails.
pub fn write_panel_metrics<W: Write>(sessions: &[PanelSession], out: W) -> Result<()> {
    let map_err = csv_error("write_panel_metrics");
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record([
            "session_id",
            "domain_code",
            "n",
            "correct",
            "accuracy_pct",
            "mean_reaction_ms",
            "first_at",
            "last_at",
        ])
        .map_err(&map_err)?;
    for session in sessions {
        for domain in &session.domains {
            writer
                .write_record([
                    session.session_id.to_string(),
                    domain.domain_code.clone(),
                    domain.n.to_string(),
                    domain.correct.to_string(),
                    one_decimal(domain.accuracy_pct),
                    domain.mean_reaction_ms.map(one_decimal).unwrap_or_default(),
                    domain.first_at.clone().unwrap_or_default(),
                    domain.last_at.clone().unwrap_or_default(),
                ])
                .map_err(&map_err)?;
        }
    }
    finish(writer, "write_panel_metrics")
}
