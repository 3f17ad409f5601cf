//! PostgreSQL statement rendering.
//!
//! Statements are plain data ([`TableDefinition`], [`InsertStatement`]) so
//! the target store can execute them and tests can inspect them without a
//! database.
//!
//! - [`literal`]: value and string literal rendering
//! - [`postprocess`]: triggers, indexes, deferred constraints, sequences

pub mod literal;
pub mod postprocess;

use crate::core::identifier::escape_if_reserved;
use crate::core::schema::{ForeignKeyCandidate, TableKind};
use crate::core::value::MigrationRow;

pub use literal::{quote_literal, render_value};

/// One column of a `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Target column name (unquoted).
    pub name: String,
    /// PostgreSQL type.
    pub sql_type: String,
    /// Emit `NOT NULL`.
    pub not_null: bool,
    /// Translated default expression.
    pub default: Option<String>,
}

/// A `CREATE TABLE IF NOT EXISTS` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    /// Target table name (unquoted).
    pub table: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnDefinition>,
    /// Primary-key column names.
    pub primary_key: Vec<String>,
    /// `UNIQUE` columns for tables without a primary key.
    pub unique_key: Vec<String>,
    /// Inline foreign keys.
    pub foreign_keys: Vec<ForeignKeyCandidate>,
}

impl TableDefinition {
    /// Render the DDL.
    pub fn to_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", escape_if_reserved(&c.name), c.sql_type);
                if c.not_null {
                    def.push_str(" NOT NULL");
                }
                if let Some(default) = &c.default {
                    def.push_str(" DEFAULT ");
                    def.push_str(default);
                }
                def
            })
            .collect();

        if !self.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", column_list(&self.primary_key)));
        } else if !self.unique_key.is_empty() {
            parts.push(format!("UNIQUE ({})", column_list(&self.unique_key)));
        }

        for fk in &self.foreign_keys {
            parts.push(foreign_key_clause(fk));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            escape_if_reserved(&self.table),
            parts.join(",\n    ")
        )
    }
}

/// `CONSTRAINT ... FOREIGN KEY (...) REFERENCES parent (id)`.
pub fn foreign_key_clause(fk: &ForeignKeyCandidate) -> String {
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} (id)",
        escape_if_reserved(&fk.constraint_name),
        escape_if_reserved(&fk.source_column),
        escape_if_reserved(&fk.target_table)
    )
}

/// Comma-separated escaped identifiers.
pub fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| escape_if_reserved(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// What to do when an inserted row collides with an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// `ON CONFLICT (key) DO NOTHING`.
    DoNothingOnKey(String),
    /// `ON CONFLICT DO NOTHING` (any unique constraint).
    DoNothing,
}

impl From<&TableKind> for ConflictPolicy {
    fn from(kind: &TableKind) -> Self {
        match kind {
            TableKind::Keyed { key_column } => ConflictPolicy::DoNothingOnKey(key_column.clone()),
            TableKind::Junction => ConflictPolicy::DoNothing,
        }
    }
}

impl ConflictPolicy {
    fn to_sql(&self) -> String {
        match self {
            ConflictPolicy::DoNothingOnKey(key) => {
                format!("ON CONFLICT ({}) DO NOTHING", escape_if_reserved(key))
            }
            ConflictPolicy::DoNothing => "ON CONFLICT DO NOTHING".to_string(),
        }
    }
}

/// A multi-row `INSERT ... ON CONFLICT` statement.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    /// Target table name (unquoted).
    pub table: String,
    /// Column list: every key seen across the rows, first-seen order.
    pub columns: Vec<String>,
    /// Rows; a column missing from a row is written as `DEFAULT`.
    pub rows: Vec<MigrationRow>,
    /// Conflict handling.
    pub conflict: ConflictPolicy,
}

impl InsertStatement {
    /// Build a statement for a slice of rows.
    pub fn new(table: impl Into<String>, rows: &[MigrationRow], conflict: ConflictPolicy) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        Self {
            table: table.into(),
            columns,
            rows: rows.to_vec(),
            conflict,
        }
    }

    /// Number of rows carried.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the statement carries no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the statement with literal values.
    pub fn to_sql(&self) -> String {
        let values: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                let cells: Vec<String> = self
                    .columns
                    .iter()
                    .map(|c| match row.get(c) {
                        Some(v) => render_value(v),
                        None => "DEFAULT".to_string(),
                    })
                    .collect();
                format!("({})", cells.join(", "))
            })
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES {} {}",
            escape_if_reserved(&self.table),
            column_list(&self.columns),
            values.join(", "),
            self.conflict.to_sql()
        )
    }
}
