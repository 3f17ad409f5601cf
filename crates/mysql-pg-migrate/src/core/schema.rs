//! Table, column and index metadata as read from the source database.

use serde::{Deserialize, Serialize};

/// Structure of one source table plus its canonical target name.
///
/// An empty `columns` list means introspection failed; such a table is
/// loaded "data-only" into whatever the target already has.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name in the source database.
    pub source_name: String,

    /// Canonical table name in the target database.
    pub target_name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<ColumnDescriptor>,

    /// Non-primary indexes.
    pub indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    /// Descriptor for a table whose structure could not be read.
    pub fn data_only(source_name: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            target_name: target_name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Whether the structure is unknown.
    pub fn is_data_only(&self) -> bool {
        self.columns.is_empty()
    }

    /// Primary-key columns in ordinal order.
    pub fn primary_key(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }

    /// Look up a column by source name (case-insensitive).
    pub fn column(&self, field: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.field.eq_ignore_ascii_case(field))
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDescriptor {
    /// Column name in the source.
    pub field: String,

    /// Full MySQL `COLUMN_TYPE`, e.g. `varchar(100)` or `bigint unsigned`.
    pub source_type: String,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Part of the primary key.
    pub is_primary_key: bool,

    /// `AUTO_INCREMENT` column.
    pub is_auto_increment: bool,

    /// Raw `COLUMN_DEFAULT` text.
    pub default_value: Option<String>,
}

impl ColumnDescriptor {
    /// Nullable, non-key column of the given type.
    pub fn new(field: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            source_type: source_type.into(),
            nullable: true,
            is_primary_key: false,
            is_auto_increment: false,
            default_value: None,
        }
    }

    /// Mark as an auto-increment primary key.
    pub fn auto_increment_pk(mut self) -> Self {
        self.is_primary_key = true;
        self.is_auto_increment = true;
        self.nullable = false;
        self
    }

    /// Mark as part of the primary key.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark as `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the raw default.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }
}

/// Index metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Index name.
    pub name: String,

    /// Indexed column names in key order.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    pub is_unique: bool,
}

/// How rows of a table are identified on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKind {
    /// Single-column primary key; conflicts are detected on that column.
    Keyed {
        /// Target (normalized) key column.
        key_column: String,
    },
    /// Association table without a single surrogate key.
    Junction,
}

impl TableKind {
    /// Classify by primary-key shape.
    ///
    /// `forced_junction` holds names (source or target) that are always
    /// treated as junction tables.
    pub fn classify(
        descriptor: &TableDescriptor,
        key_column: impl FnOnce(&str) -> String,
        forced_junction: &[String],
    ) -> Self {
        let forced = forced_junction.iter().any(|n| {
            n.eq_ignore_ascii_case(&descriptor.source_name)
                || n.eq_ignore_ascii_case(&descriptor.target_name)
        });
        if forced {
            return TableKind::Junction;
        }
        match descriptor.primary_key().as_slice() {
            [pk] => TableKind::Keyed {
                key_column: key_column(&pk.field),
            },
            _ => TableKind::Junction,
        }
    }

    /// Key column for keyed tables.
    pub fn key_column(&self) -> Option<&str> {
        match self {
            TableKind::Keyed { key_column } => Some(key_column),
            TableKind::Junction => None,
        }
    }
}

/// Inferred reference from a column to a parent table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyCandidate {
    /// Normalized referencing column.
    pub source_column: String,

    /// Canonical parent table.
    pub target_table: String,

    /// Deterministic constraint name.
    pub constraint_name: String,
}
