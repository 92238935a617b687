//! Catalog resolution trait.

use crate::Result;
use crate::models::ItemCodes;

/// Maps a legacy item reference to its domain and exercise codes.
///
/// Catalogs are read-only reference data. Implementations follow the chain
/// item → domain catalog and item → exercise catalog with left-outer
/// semantics: a missing item or catalog row yields [`crate::UNKNOWN_CODE`]
/// for the affected code rather than an error.
pub trait CatalogResolver {
    /// Resolves the codes for one legacy item.
    ///
    /// # Errors
    ///
    /// Returns an error only if the underlying lookup fails.
    fn resolve(&self, item_id: i64) -> Result<ItemCodes>;
}
