//! Storage layer.
//!
//! - [`traits`]: the schema-introspection and catalog-resolution contracts
//! - [`sqlite`]: embedded-store implementations, DDL, and transaction scopes
//! - [`memory`]: in-memory catalog fake
//! - `postgresql`: relational-server introspection (feature `postgres`)
//!
//! [`TelemetryStore`] owns the single embedded connection the services share.

// Allow significant_drop_tightening - the connection guard is held for the
// whole transaction by design of the scopes below.
#![allow(clippy::significant_drop_tightening)]

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgresql;
pub mod sqlite;
pub mod traits;

pub use memory::InMemoryCatalog;
#[cfg(feature = "postgres")]
pub use postgresql::PostgresIntrospector;
pub use sqlite::{SqliteCatalogResolver, SqliteIntrospector};
pub use traits::{CatalogResolver, SchemaIntrospector};

use crate::Result;
use crate::config::{CogtraceConfig, TableNames};
use rusqlite::{Connection, Transaction};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Handle to the embedded store holding canonical and legacy tables.
///
/// Wraps one connection in a `Mutex`; share the store across threads with an
/// `Arc`. Independent processes (or stores) coordinate through `SQLite`'s own
/// locking: writers take the lock with `BEGIN IMMEDIATE` and wait up to the
/// configured busy timeout.
pub struct TelemetryStore {
    conn: Mutex<Connection>,
    config: CogtraceConfig,
}

impl TelemetryStore {
    /// Opens (or creates) the database file named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for invalid table names and
    /// [`crate::Error::StorageUnavailable`] if the file cannot be opened.
    pub fn open(config: &CogtraceConfig) -> Result<Self> {
        config.tables.validate()?;
        let conn = sqlite::open_connection(&config.db_path, busy_timeout(config))?;
        tracing::info!(path = %config.db_path.display(), "Opened telemetry store");
        Ok(Self::from_parts(conn, config.clone()))
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid table names or if the connection fails.
    pub fn in_memory(config: &CogtraceConfig) -> Result<Self> {
        config.tables.validate()?;
        let conn = Connection::open_in_memory()
            .map_err(sqlite::map_storage_error("open_in_memory"))?;
        sqlite::configure_connection(&conn, busy_timeout(config))?;
        Ok(Self::from_parts(conn, config.clone()))
    }

    /// Wraps an already configured connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for invalid table names.
    pub fn from_connection(conn: Connection, config: &CogtraceConfig) -> Result<Self> {
        config.tables.validate()?;
        Ok(Self::from_parts(conn, config.clone()))
    }

    const fn from_parts(conn: Connection, config: CogtraceConfig) -> Self {
        Self {
            conn: Mutex::new(conn),
            config,
        }
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub const fn config(&self) -> &CogtraceConfig {
        &self.config
    }

    /// Returns the configured table names.
    #[must_use]
    pub const fn tables(&self) -> &TableNames {
        &self.config.tables
    }

    /// Runs `f` with exclusive access to the raw connection.
    ///
    /// Used for fixtures and for collaborators that own the legacy writer
    /// path; services go through the transaction scopes instead.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = sqlite::acquire_lock(&self.conn);
        f(&mut conn)
    }

    /// Runs a mutating operation in an immediate transaction with retry,
    /// recording operation metrics.
    ///
    /// # Errors
    ///
    /// See [`sqlite::run_immediate`].
    pub fn write<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnMut(&Transaction<'_>) -> Result<T>,
    {
        let start = Instant::now();
        let result = {
            let mut conn = sqlite::acquire_lock(&self.conn);
            sqlite::run_immediate(&mut conn, operation, self.config.retry.max_attempts, f)
        };
        sqlite::record_operation_metrics("sqlite", operation, start, sqlite::status_label(&result));
        result
    }

    /// Runs a read-only operation against one snapshot, recording operation metrics.
    ///
    /// # Errors
    ///
    /// See [`sqlite::run_snapshot`].
    pub fn read<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let start = Instant::now();
        let result = {
            let mut conn = sqlite::acquire_lock(&self.conn);
            sqlite::run_snapshot(&mut conn, operation, f)
        };
        sqlite::record_operation_metrics("sqlite", operation, start, sqlite::status_label(&result));
        result
    }
}

fn busy_timeout(config: &CogtraceConfig) -> Duration {
    Duration::from_millis(config.busy_timeout_ms)
}
