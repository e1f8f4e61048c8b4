//! Schema catalog.
//!
//! Holds keyspace and table definitions, and generates the virtual
//! `system_schema` tables that expose them to catalog queries.

pub mod catalog;
pub mod system_tables;

pub use catalog::{Catalog, CatalogError, ColumnKind, ColumnSchema, TableSchema};
pub use system_tables::SYSTEM_SCHEMA;
