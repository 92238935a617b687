//! Schema introspection over `sqlite_master`.

use super::sql::map_storage_error;
use crate::Result;
use crate::storage::traits::SchemaIntrospector;
use rusqlite::{Connection, OptionalExtension};

/// [`SchemaIntrospector`] for an embedded `SQLite` connection.
///
/// Borrows the connection, so it also works on a [`rusqlite::Transaction`]
/// and sees tables created earlier in that transaction.
#[derive(Clone, Copy)]
pub struct SqliteIntrospector<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteIntrospector<'c> {
    /// Creates an introspector over a connection or transaction.
    #[must_use]
    pub const fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl SchemaIntrospector for SqliteIntrospector<'_> {
    fn table_exists(&self, name: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_storage_error("introspect_table_exists"))?;
        Ok(found.is_some())
    }

    fn columns(&self, name: &str) -> Result<Vec<String>> {
        let map_err = map_storage_error("introspect_columns");
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
            .map_err(&map_err)?;
        let names = stmt
            .query_map([name], |row| row.get::<_, String>(0))
            .map_err(&map_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(&map_err)?;
        Ok(names)
    }
}
