//! Transaction scopes with retry.
//!
//! Writers take the database write lock up front with `BEGIN IMMEDIATE`, so
//! every read a writer performs (dedup checks, counts) sees the state its
//! insert will commit against. Readers use a deferred transaction, which in
//! WAL mode pins one snapshot for all of their statements.

use super::metrics::record_retry;
use super::sql::storage_error;
use crate::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Runs `f` in an immediate transaction, retrying retryable failures.
///
/// `f` runs at most `max_attempts` times (at least once), each time in a
/// fresh transaction; a failed attempt rolls back completely before the next
/// starts. If the budget runs out the last error surfaces as
/// [`Error::Transient`](crate::Error::Transient). Non-retryable errors surface
/// unchanged after rollback.
///
/// # Errors
///
/// Returns the classified error of the final failed attempt.
pub fn run_immediate<T, F>(
    conn: &mut Connection,
    operation: &'static str,
    max_attempts: u32,
    mut f: F,
) -> Result<T>
where
    F: FnMut(&Transaction<'_>) -> Result<T>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match attempt_once(conn, operation, &mut f) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Retrying storage transaction"
                );
                record_retry("sqlite", operation);
                attempt += 1;
            },
            Err(e) if e.is_retryable() => return Err(e.into_transient()),
            Err(e) => return Err(e),
        }
    }
}

fn attempt_once<T, F>(conn: &mut Connection, operation: &'static str, f: &mut F) -> Result<T>
where
    F: FnMut(&Transaction<'_>) -> Result<T>,
{
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| storage_error(operation, &e))?;
    // Dropping `tx` on the error path rolls back.
    let value = f(&tx)?;
    tx.commit().map_err(|e| storage_error(operation, &e))?;
    Ok(value)
}

/// Runs `f` in a deferred transaction so all of its reads share one snapshot.
///
/// # Errors
///
/// Returns the classified error if the transaction or `f` fails.
pub fn run_snapshot<T, F>(conn: &mut Connection, operation: &'static str, f: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Deferred)
        .map_err(|e| storage_error(operation, &e))?;
    let value = f(&tx)?;
    tx.commit().map_err(|e| storage_error(operation, &e))?;
    Ok(value)
}
