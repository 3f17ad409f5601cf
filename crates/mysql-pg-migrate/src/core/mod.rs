//! Core types shared by every stage of a migration.
//!
//! - [`identifier`]: name normalization and SQL quoting
//! - [`schema`]: table, column and index metadata
//! - [`value`]: source and target value representations
//! - [`traits`]: the source and target store seams

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use identifier::{
    escape_if_reserved, is_reserved_word, normalize_column_name, normalize_table_name,
    IdentifierNormalizer,
};
pub use schema::{ColumnDescriptor, ForeignKeyCandidate, IndexDescriptor, TableDescriptor, TableKind};
pub use traits::{SourceStore, TargetStore};
pub use value::{MigrationRow, SourceRow, SourceValue, SqlValue};
