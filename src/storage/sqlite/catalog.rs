//! Catalog join chain for legacy items.
//!
//! Resolution follows item → domain catalog and item → exercise catalog with
//! `LEFT JOIN`s, so rows survive a missing item or catalog entry and pick up
//! the unknown sentinel. Joins are only emitted for tables that exist; a
//! missing catalog table resolves its code to the sentinel outright.

use super::introspect::SqliteIntrospector;
use super::sql::{code_or_unknown_sql, map_storage_error};
use crate::config::TableNames;
use crate::models::ItemCodes;
use crate::storage::traits::{CatalogResolver, SchemaIntrospector};
use crate::Result;
use rusqlite::Connection;

/// SQL fragments resolving codes for the item column of a legacy row alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogJoin {
    /// `LEFT JOIN` clauses to append after the legacy table.
    pub joins: String,
    /// Domain code column, or `NULL` when unresolvable.
    pub domain_raw: String,
    /// Exercise code column, or `NULL` when unresolvable.
    pub exercise_raw: String,
    /// True when the item table and the domain catalog both exist.
    pub resolves_domain: bool,
}

impl CatalogJoin {
    /// Plans the join chain for the item column `<alias>.item_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if schema introspection fails.
    pub fn plan(
        introspector: &dyn SchemaIntrospector,
        tables: &TableNames,
        alias: &str,
    ) -> Result<Self> {
        let has_item = introspector.table_exists(&tables.item)?;
        let has_domain = has_item && introspector.table_exists(&tables.domain_catalog)?;
        let has_exercise = has_item && introspector.table_exists(&tables.exercise_catalog)?;

        let mut joins = String::new();
        if has_item {
            joins.push_str(&format!(
                " LEFT JOIN {item} i ON i.item_id = {alias}.item_id",
                item = tables.item
            ));
        }
        if has_domain {
            joins.push_str(&format!(
                " LEFT JOIN {catalog} d ON d.domain_id = i.domain_id",
                catalog = tables.domain_catalog
            ));
        }
        if has_exercise {
            joins.push_str(&format!(
                " LEFT JOIN {catalog} e ON e.exercise_id = i.exercise_id",
                catalog = tables.exercise_catalog
            ));
        }

        Ok(Self {
            joins,
            domain_raw: if has_domain { "d.code" } else { "NULL" }.to_string(),
            exercise_raw: if has_exercise { "e.code" } else { "NULL" }.to_string(),
            resolves_domain: has_domain,
        })
    }

    /// Domain code expression with the sentinel substituted.
    #[must_use]
    pub fn domain_code_sql(&self) -> String {
        code_or_unknown_sql(&self.domain_raw)
    }

    /// Exercise code expression with the sentinel substituted.
    #[must_use]
    pub fn exercise_code_sql(&self) -> String {
        code_or_unknown_sql(&self.exercise_raw)
    }
}

/// [`CatalogResolver`] backed by the catalog tables of an embedded store.
pub struct SqliteCatalogResolver<'c> {
    conn: &'c Connection,
    tables: &'c TableNames,
}

impl<'c> SqliteCatalogResolver<'c> {
    /// Creates a resolver over a connection or transaction.
    #[must_use]
    pub const fn new(conn: &'c Connection, tables: &'c TableNames) -> Self {
        Self { conn, tables }
    }
}

impl CatalogResolver for SqliteCatalogResolver<'_> {
    fn resolve(&self, item_id: i64) -> Result<ItemCodes> {
        let plan = CatalogJoin::plan(&SqliteIntrospector::new(self.conn), self.tables, "r")?;
        if plan.joins.is_empty() {
            return Ok(ItemCodes::unknown());
        }

        let sql = format!(
            "SELECT CAST({domain} AS TEXT), CAST({exercise} AS TEXT) \
             FROM (SELECT ?1 AS item_id) r{joins} LIMIT 1",
            domain = plan.domain_raw,
            exercise = plan.exercise_raw,
            joins = plan.joins,
        );
        let (domain, exercise) = self
            .conn
            .query_row(&sql, [item_id], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .map_err(map_storage_error("resolve_item_codes"))?;

        tracing::trace!(item_id, ?domain, ?exercise, "resolved item codes");
        Ok(ItemCodes::from_lookup(domain, exercise))
    }
}
