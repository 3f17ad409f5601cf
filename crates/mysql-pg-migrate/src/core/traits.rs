//! Store seams used by the migration engine.
//!
//! - [`SourceStore`]: read-only access to the legacy database
//! - [`TargetStore`]: DDL, inserts and lookups against the new database
//!
//! The orchestrator only talks to these traits, so the whole pipeline can be
//! driven against in-memory stores in tests.

use async_trait::async_trait;

use crate::config::ReferenceConfig;
use crate::dialect::{InsertStatement, TableDefinition};
use crate::error::Result;

use super::schema::{ColumnDescriptor, IndexDescriptor};
use super::value::SourceRow;

/// Read side of a migration.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Base tables in enumeration order.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Column metadata in ordinal order.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Non-primary indexes.
    async fn indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>>;

    /// Every row of the table in scan order.
    async fn fetch_rows(&self, table: &str) -> Result<Vec<SourceRow>>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Release connections. Called once at the end of a run.
    async fn close(&self);
}

/// Write side of a migration.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Whether a table with this (unquoted) name exists in the target schema.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Execute a `CREATE TABLE IF NOT EXISTS`.
    async fn create_table(&self, definition: &TableDefinition) -> Result<()>;

    /// Execute a multi-row insert; returns rows actually written, so rows
    /// absorbed by the conflict clause are the difference.
    async fn insert_rows(&self, statement: &InsertStatement) -> Result<u64>;

    /// Execute an administrative statement (indexes, triggers, constraints).
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Id of the row matching a reference lookup, if any.
    async fn lookup_reference(&self, reference: &ReferenceConfig) -> Result<Option<i64>>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Release connections. Called once at the end of a run.
    async fn close(&self);
}
