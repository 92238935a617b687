//! In-memory catalog for testing.
//!
//! Provides a non-persistent [`CatalogResolver`] with the same left-outer
//! semantics as the `SQLite` join chain, for unit tests and for checking the
//! SQL resolution against an independent implementation.

use crate::Result;
use crate::models::ItemCodes;
use crate::storage::traits::CatalogResolver;
use std::collections::HashMap;

/// Catalog entries held in memory.
///
/// # Example
///
/// ```rust
/// use cogtrace::storage::{CatalogResolver, InMemoryCatalog};
///
/// let catalog = InMemoryCatalog::new()
///     .with_domain(1, "MCP")
///     .with_item(10, Some(1), None);
/// let codes = catalog.resolve(10)?;
/// assert_eq!(codes.domain_code, "MCP");
/// assert_eq!(codes.exercise_code, "UNK");
/// # Ok::<(), cogtrace::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: HashMap<i64, (Option<i64>, Option<i64>)>,
    domains: HashMap<i64, String>,
    exercises: HashMap<i64, String>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog; every item resolves to the sentinel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item with optional domain and exercise references.
    #[must_use]
    pub fn with_item(mut self, item_id: i64, domain_id: Option<i64>, exercise_id: Option<i64>) -> Self {
        self.items.insert(item_id, (domain_id, exercise_id));
        self
    }

    /// Adds a domain catalog entry.
    #[must_use]
    pub fn with_domain(mut self, domain_id: i64, code: impl Into<String>) -> Self {
        self.domains.insert(domain_id, code.into());
        self
    }

    /// Adds an exercise catalog entry.
    #[must_use]
    pub fn with_exercise(mut self, exercise_id: i64, code: impl Into<String>) -> Self {
        self.exercises.insert(exercise_id, code.into());
        self
    }

    /// Returns the number of items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

impl CatalogResolver for InMemoryCatalog {
    fn resolve(&self, item_id: i64) -> Result<ItemCodes> {
        let Some((domain_id, exercise_id)) = self.items.get(&item_id) else {
            return Ok(ItemCodes::unknown());
        };
        let domain = domain_id.and_then(|id| self.domains.get(&id).cloned());
        let exercise = exercise_id.and_then(|id| self.exercises.get(&id).cloned());
        Ok(ItemCodes::from_lookup(domain, exercise))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UNKNOWN_CODE;

    #[test]
    fn test_unknown_item() {
        let catalog = InMemoryCatalog::new().with_domain(1, "MCP");
        assert_eq!(catalog.resolve(5).unwrap(), ItemCodes::unknown());
    }

    #[test]
    fn test_dangling_catalog_reference() {
        let catalog = InMemoryCatalog::new()
            .with_domain(1, "MCP")
            .with_exercise(7, "MCP_DIGITS")
            .with_item(10, Some(2), Some(7));
        let codes = catalog.resolve(10).unwrap();
        assert_eq!(codes.domain_code, UNKNOWN_CODE);
        assert_eq!(codes.exercise_code, "MCP_DIGITS");
        assert_eq!(catalog.item_count(), 1);
    }
}
