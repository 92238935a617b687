//! Embedded `SQLite` implementations of the storage contracts.
//!
//! ## Module Structure
//!
//! - [`connection`]: connection opening, configuration, poison-recovering lock
//! - [`introspect`]: [`SchemaIntrospector`](crate::storage::SchemaIntrospector) over `sqlite_master`
//! - [`catalog`]: the item → catalog join chain and its [`CatalogResolver`](crate::storage::CatalogResolver)
//! - [`schema`]: canonical table and index DDL
//! - [`sql`]: error classification and shared SQL fragments
//! - [`tx`]: immediate and snapshot transaction scopes with retry
//! - [`metrics`]: operation metrics recording

mod catalog;
mod connection;
mod introspect;
mod metrics;
pub mod schema;
mod sql;
mod tx;

pub use catalog::{CatalogJoin, SqliteCatalogResolver};
pub use connection::{acquire_lock, configure_connection, open_connection};
pub use introspect::SqliteIntrospector;
pub use metrics::{record_operation_metrics, record_retry, status_label};
pub use sql::{
    code_or_unknown_sql, correct_flag_sql, map_storage_error, session_scope_clause, storage_error,
};
pub use tx::{run_immediate, run_snapshot};
