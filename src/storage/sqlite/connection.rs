//! Connection handling for the embedded store.
//!
//! Connections are guarded by a `Mutex` with poison recovery and configured
//! for concurrent readers alongside a single writer.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Helper to acquire mutex lock with poison recovery.
///
/// If the mutex is poisoned (a previous critical section panicked), the inner
/// connection is recovered and a warning logged. Every transaction either
/// committed or was rolled back when its guard dropped, so the connection is
/// still usable.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Opens a database file and applies [`configure_connection`].
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if the file cannot be opened or configured.
pub fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|e| Error::StorageUnavailable {
        operation: "open_database".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    configure_connection(&conn, busy_timeout)?;
    Ok(conn)
}

/// Configures a connection for concurrent use.
///
/// # Configuration Applied
///
/// - **WAL mode**: readers never block the single writer, so a read snapshot
///   can proceed while a backfill holds the write lock. In-memory databases
///   report `memory` instead.
/// - **NORMAL synchronous**: durable at checkpoints, fast per commit.
/// - **`busy_timeout`**: a writer waits this long for a competing
///   `BEGIN IMMEDIATE` instead of failing with `SQLITE_BUSY` at once.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if a pragma cannot be applied.
pub fn configure_connection(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    let pragma_error = |e: rusqlite::Error| Error::StorageUnavailable {
        operation: "configure_connection".to_string(),
        cause: e.to_string(),
    };

    // journal_mode reports the resulting mode as a row
    let _mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(pragma_error)?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(pragma_error)?;
    conn.busy_timeout(busy_timeout).map_err(pragma_error)?;

    Ok(())
}
