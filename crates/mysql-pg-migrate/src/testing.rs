//! In-memory stores for driving the pipeline in tests.
//!
//! [`MemoryTarget`] follows PostgreSQL closely enough for the engine's
//! purposes: `ON CONFLICT` clauses absorb rows that collide on the key (or on
//! the primary key for the bare form), and NULL keys never collide.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::config::ReferenceConfig;
use crate::core::schema::{ColumnDescriptor, IndexDescriptor};
use crate::core::traits::{SourceStore, TargetStore};
use crate::core::value::{MigrationRow, SourceRow, SqlValue};
use crate::dialect::{ConflictPolicy, InsertStatement, TableDefinition};
use crate::error::{MigrateError, Result};

#[derive(Default)]
struct SourceTable {
    columns: Vec<ColumnDescriptor>,
    indexes: Vec<IndexDescriptor>,
    rows: Vec<SourceRow>,
}

#[derive(Default)]
struct SourceState {
    tables: IndexMap<String, SourceTable>,
    failing_describe: HashSet<String>,
    failing_fetch: HashSet<String>,
    fail_list: bool,
    fail_ping: bool,
    closes: usize,
}

/// Source store backed by a map of tables.
#[derive(Default)]
pub struct MemorySource {
    state: Mutex<SourceState>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table; enumeration order is insertion order.
    pub fn with_table(
        self,
        name: &str,
        columns: Vec<ColumnDescriptor>,
        rows: Vec<SourceRow>,
    ) -> Self {
        self.state.lock().unwrap().tables.insert(
            name.to_string(),
            SourceTable {
                columns,
                indexes: Vec::new(),
                rows,
            },
        );
        self
    }

    pub fn add_index(&self, table: &str, index: IndexDescriptor) {
        let mut state = self.state.lock().unwrap();
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .indexes
            .push(index);
    }

    pub fn fail_describe(&self, table: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_describe
            .insert(table.to_string());
    }

    pub fn fail_fetch(&self, table: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_fetch
            .insert(table.to_string());
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn fail_ping(&self) {
        self.state.lock().unwrap().fail_ping = true;
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(MigrateError::SchemaExtraction(
                "cannot list tables".into(),
            ));
        }
        Ok(state.tables.keys().cloned().collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let state = self.state.lock().unwrap();
        if state.failing_describe.contains(table) {
            return Err(MigrateError::SchemaExtraction(format!(
                "cannot describe {}",
                table
            )));
        }
        state
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| MigrateError::SchemaExtraction(format!("no table {}", table)))
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .map(|t| t.indexes.clone())
            .unwrap_or_default())
    }

    async fn fetch_rows(&self, table: &str) -> Result<Vec<SourceRow>> {
        let state = self.state.lock().unwrap();
        if state.failing_fetch.contains(table) {
            return Err(MigrateError::transfer(table, "read failed"));
        }
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| MigrateError::transfer(table, "no such table"))
    }

    async fn ping(&self) -> Result<()> {
        if self.state.lock().unwrap().fail_ping {
            return Err(MigrateError::pool("source unreachable", "memory source"));
        }
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().unwrap().closes += 1;
    }
}

#[derive(Default)]
struct TargetTable {
    primary_key: Vec<String>,
    rows: Vec<MigrationRow>,
}

#[derive(Default)]
struct TargetState {
    tables: IndexMap<String, TargetTable>,
    created: Vec<TableDefinition>,
    executed: Vec<String>,
    insert_statements: usize,
    failing_create: HashSet<String>,
    failing_execute: Vec<String>,
    rejected: Vec<(String, String, SqlValue)>,
    fail_ping: bool,
    closes: usize,
}

/// Target store that keeps rows in memory and honours conflict clauses.
#[derive(Default)]
pub struct MemoryTarget {
    state: Mutex<TargetState>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-existing table with the given primary key.
    pub fn with_table(self, name: &str, primary_key: &[&str]) -> Self {
        self.state.lock().unwrap().tables.insert(
            name.to_string(),
            TargetTable {
                primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    /// Pre-existing `(id, name)` reference table row.
    pub fn with_reference(self, table: &str, id: i64, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let entry = state
                .tables
                .entry(table.to_string())
                .or_insert_with(|| TargetTable {
                    primary_key: vec!["id".into()],
                    rows: Vec::new(),
                });
            let mut row = MigrationRow::new();
            row.insert("id".into(), SqlValue::I64(id));
            row.insert("name".into(), SqlValue::from(name));
            entry.rows.push(row);
        }
        self
    }

    pub fn fail_create(&self, table: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_create
            .insert(table.to_string());
    }

    /// Fail any executed statement containing `fragment`.
    pub fn fail_execute(&self, fragment: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_execute
            .push(fragment.to_string());
    }

    /// Fail any insert carrying a row with this value.
    pub fn reject_value(&self, table: &str, column: &str, value: SqlValue) {
        self.state
            .lock()
            .unwrap()
            .rejected
            .push((table.to_string(), column.to_string(), value));
    }

    pub fn fail_ping(&self) {
        self.state.lock().unwrap().fail_ping = true;
    }

    pub fn rows(&self, table: &str) -> Vec<MigrationRow> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn created(&self) -> Vec<TableDefinition> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn insert_statements(&self) -> usize {
        self.state.lock().unwrap().insert_statements
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

fn key_of(row: &MigrationRow, columns: &[String]) -> Option<Vec<SqlValue>> {
    let key: Vec<SqlValue> = columns
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or(SqlValue::Null))
        .collect();
    if key.is_empty() || key.iter().any(SqlValue::is_null) {
        None
    } else {
        Some(key)
    }
}

#[async_trait]
impl TargetStore for MemoryTarget {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().tables.contains_key(table))
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_create.contains(&definition.table) {
            return Err(MigrateError::transfer(
                definition.table.clone(),
                "create table rejected",
            ));
        }
        state.created.push(definition.clone());
        state
            .tables
            .entry(definition.table.clone())
            .or_insert_with(|| TargetTable {
                primary_key: if definition.primary_key.is_empty() {
                    definition.unique_key.clone()
                } else {
                    definition.primary_key.clone()
                },
                rows: Vec::new(),
            });
        Ok(())
    }

    async fn insert_rows(&self, statement: &InsertStatement) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.insert_statements += 1;

        let rejected = statement.rows.iter().any(|row| {
            state.rejected.iter().any(|(table, column, value)| {
                table == &statement.table && row.get(column) == Some(value)
            })
        });
        if rejected {
            return Err(MigrateError::transfer(
                statement.table.clone(),
                "row rejected by target",
            ));
        }

        let table = state
            .tables
            .get_mut(&statement.table)
            .ok_or_else(|| {
                MigrateError::transfer(statement.table.clone(), "relation does not exist")
            })?;

        let key_columns = match &statement.conflict {
            ConflictPolicy::DoNothingOnKey(key) => vec![key.clone()],
            ConflictPolicy::DoNothing => table.primary_key.clone(),
        };

        let mut written = 0;
        for row in &statement.rows {
            let conflicts = match key_of(row, &key_columns) {
                Some(key) => table
                    .rows
                    .iter()
                    .any(|existing| key_of(existing, &key_columns).as_ref() == Some(&key)),
                None => false,
            };
            if !conflicts {
                table.rows.push(row.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_execute.iter().any(|f| sql.contains(f.as_str())) {
            return Err(MigrateError::transfer("execute", "statement rejected"));
        }
        state.executed.push(sql.to_string());
        Ok(())
    }

    async fn lookup_reference(&self, reference: &ReferenceConfig) -> Result<Option<i64>> {
        let state = self.state.lock().unwrap();
        let table = state.tables.get(&reference.table).ok_or_else(|| {
            MigrateError::transfer(reference.table.clone(), "relation does not exist")
        })?;
        let wanted = SqlValue::from(reference.value.as_str());
        Ok(table
            .rows
            .iter()
            .find(|row| row.get(&reference.column) == Some(&wanted))
            .and_then(|row| row.get(&reference.id_column))
            .and_then(SqlValue::as_i64))
    }

    async fn ping(&self) -> Result<()> {
        if self.state.lock().unwrap().fail_ping {
            return Err(MigrateError::pool("target unreachable", "memory target"));
        }
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().unwrap().closes += 1;
    }
}
