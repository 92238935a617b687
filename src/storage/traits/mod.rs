//! Storage contracts.
//!
//! The read and migration paths never hard-code one storage dialect: schema
//! discovery and catalog lookups go through these traits, so a relational
//! server and the embedded store (or an in-memory fake) are interchangeable.

mod catalog;
mod introspect;

pub use catalog::CatalogResolver;
pub use introspect::SchemaIntrospector;
