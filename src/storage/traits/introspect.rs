//! Schema introspection trait.
//!
//! Legacy and canonical tables may coexist, or only one of them may be
//! present, depending on how far a deployment is through its migration. The
//! introspector answers which tables and columns exist right now.
//!
//! # Available Implementations
//!
//! | Implementation | Store |
//! |----------------|-------|
//! | `SqliteIntrospector` | Embedded `SQLite` (`sqlite_master`, `pragma_table_info`) |
//! | `PostgresIntrospector` | PostgreSQL `information_schema` (feature `postgres`) |
//!
//! # Guarantees
//!
//! - Side-effect free.
//! - No caching: every call queries the store's metadata, since the backfill
//!   may create the canonical table between two calls.
//! - A missing table is not an error: `table_exists` returns `false` and
//!   `columns` returns an empty list.

use crate::Result;

/// Discovers which tables and columns currently exist.
pub trait SchemaIntrospector {
    /// Returns true if a table (or view) with this name exists.
    ///
    /// # Errors
    ///
    /// Returns an error only if the metadata query itself fails.
    fn table_exists(&self, name: &str) -> Result<bool>;

    /// Returns the table's column names in declaration order.
    ///
    /// Returns an empty list if the table does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only if the metadata query itself fails.
    fn columns(&self, name: &str) -> Result<Vec<String>>;

    /// Returns true if the table exists and has every listed column.
    ///
    /// Column names compare case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error only if the metadata query itself fails.
    fn has_columns(&self, name: &str, required: &[&str]) -> Result<bool> {
        let columns = self.columns(name)?;
        if columns.is_empty() {
            return Ok(false);
        }
        Ok(required
            .iter()
            .all(|r| columns.iter().any(|c| c.eq_ignore_ascii_case(r))))
    }
}
