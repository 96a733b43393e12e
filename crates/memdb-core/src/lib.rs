//! Core domain types for in-memory `SQLite` test databases.
//!
//! This crate is pure: it defines the value model, the schema metadata
//! contexts declare, and the value conversion policy for the types
//! `SQLite` has no native storage class for. No database driver types
//! appear in any signature here; the `memdb-sqlite` crate supplies the
//! actual storage adapter.

pub mod convert;
pub mod customizer;
pub mod error;
pub mod schema;
pub mod value;

// Re-export commonly used types for convenience
pub use convert::{Conversion, conversion_for};
pub use customizer::apply_sqlite_conversions;
pub use error::{ConversionError, StoreError};
pub use schema::{ColumnDef, ModelBuilder, SchemaModel, TableDef};
pub use value::{Value, ValueType};
