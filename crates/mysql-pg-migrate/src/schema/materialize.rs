//! Target table creation from source descriptors.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::core::identifier::IdentifierNormalizer;
use crate::core::schema::{ForeignKeyCandidate, TableDescriptor, TableKind};
use crate::core::traits::TargetStore;
use crate::dialect::{quote_literal, ColumnDefinition, TableDefinition};
use crate::relationship::RelationshipInferencer;
use crate::typemap::{categorize, map_type, serial_type_for, TypeCategory};

static NUMERIC_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("numeric literal pattern"));

static CURRENT_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(current_timestamp|now|localtimestamp|localtime)(\(\d*\))?$")
        .expect("current timestamp pattern")
});

/// What happened to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// `CREATE TABLE` succeeded.
    Created,
    /// The target already had the table; nothing was executed.
    AlreadyExisted,
    /// No structure known (data-only table).
    Skipped,
    /// DDL failed; loading still proceeds.
    Failed(String),
}

/// Outcome plus work left for after loading.
#[derive(Debug, Clone)]
pub struct MaterializeReport {
    pub outcome: MaterializeOutcome,
    /// Foreign keys whose parent did not exist yet.
    pub deferred: Vec<ForeignKeyCandidate>,
    /// Target columns backed by a sequence.
    pub serial_columns: Vec<String>,
}

impl MaterializeReport {
    fn new(outcome: MaterializeOutcome, serial_columns: Vec<String>) -> Self {
        Self {
            outcome,
            deferred: Vec::new(),
            serial_columns,
        }
    }
}

/// Tables the materializer may point foreign keys at.
#[derive(Debug, Clone, Default)]
pub struct KnownTables {
    /// Tables present in the target right now.
    pub present: HashSet<String>,
    /// Tables that will be created later in this run.
    pub planned: HashSet<String>,
}

impl KnownTables {
    fn all(&self) -> HashSet<String> {
        self.present.union(&self.planned).cloned().collect()
    }
}

/// Creates target tables for source descriptors.
pub struct SchemaMaterializer<'a> {
    target: &'a dyn TargetStore,
    normalizer: &'a IdentifierNormalizer,
    inferencer: &'a RelationshipInferencer,
}

impl<'a> SchemaMaterializer<'a> {
    pub fn new(
        target: &'a dyn TargetStore,
        normalizer: &'a IdentifierNormalizer,
        inferencer: &'a RelationshipInferencer,
    ) -> Self {
        Self {
            target,
            normalizer,
            inferencer,
        }
    }

    /// Make sure the target table for `descriptor` exists.
    ///
    /// Never returns an error: every failure is reported as
    /// [`MaterializeOutcome::Failed`] and logged. Junction tables without a
    /// primary key get a `UNIQUE` constraint over their reference columns.
    pub async fn ensure_table(
        &self,
        descriptor: &TableDescriptor,
        kind: &TableKind,
        known: &KnownTables,
    ) -> MaterializeReport {
        let table = &descriptor.target_name;
        let serial_columns = self.serial_columns(descriptor);

        match self.target.table_exists(table).await {
            Ok(true) => {
                info!("Table {} already exists, skipping DDL", table);
                return MaterializeReport::new(MaterializeOutcome::AlreadyExisted, serial_columns);
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Could not check whether {} exists: {}", table, e);
                return MaterializeReport::new(
                    MaterializeOutcome::Failed(e.to_string()),
                    serial_columns,
                );
            }
        }

        if descriptor.is_data_only() {
            warn!("No structure known for {}, not creating it", table);
            return MaterializeReport::new(MaterializeOutcome::Skipped, serial_columns);
        }

        let candidates = self.inferencer.candidates(descriptor, &known.all());
        let (inline, deferred): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|fk| &fk.target_table == table || known.present.contains(&fk.target_table));
        for fk in &deferred {
            debug!(
                "Deferring {} until {} exists",
                fk.constraint_name, fk.target_table
            );
        }

        let definition = self.build_definition(descriptor, kind, inline);
        let outcome = match self.target.create_table(&definition).await {
            Ok(()) => {
                info!("Created table {} (from {})", table, descriptor.source_name);
                MaterializeOutcome::Created
            }
            Err(e) => {
                warn!("Failed to create table {}: {}", table, e);
                MaterializeOutcome::Failed(e.to_string())
            }
        };

        MaterializeReport {
            outcome,
            deferred,
            serial_columns,
        }
    }

    /// `CREATE TABLE` model for a descriptor.
    pub fn build_definition(
        &self,
        descriptor: &TableDescriptor,
        kind: &TableKind,
        foreign_keys: Vec<ForeignKeyCandidate>,
    ) -> TableDefinition {
        let columns = descriptor
            .columns
            .iter()
            .map(|c| {
                let serial = if c.is_primary_key && c.is_auto_increment {
                    serial_type_for(&c.source_type)
                } else {
                    None
                };
                let sql_type = match serial {
                    Some(serial) => serial.to_string(),
                    None => map_type(&c.source_type),
                };
                let default = match serial {
                    Some(_) => None,
                    None => c
                        .default_value
                        .as_deref()
                        .and_then(|raw| translate_default(raw, &c.source_type)),
                };
                ColumnDefinition {
                    name: self.normalizer.column(&c.field),
                    sql_type,
                    not_null: !c.nullable || c.is_primary_key,
                    default,
                }
            })
            .collect();

        let primary_key: Vec<String> = descriptor
            .primary_key()
            .iter()
            .map(|c| self.normalizer.column(&c.field))
            .collect();
        let unique_key = match kind {
            TableKind::Junction if primary_key.is_empty() => self.reference_columns(descriptor),
            _ => Vec::new(),
        };

        TableDefinition {
            table: descriptor.target_name.clone(),
            columns,
            primary_key,
            unique_key,
            foreign_keys,
        }
    }

    /// Normalized reference columns, when there are at least two.
    fn reference_columns(&self, descriptor: &TableDescriptor) -> Vec<String> {
        let columns: Vec<String> = descriptor
            .columns
            .iter()
            .filter(|c| self.inferencer.detect(descriptor, &c.field).is_foreign_key)
            .map(|c| self.normalizer.column(&c.field))
            .collect();
        if columns.len() < 2 {
            return Vec::new();
        }
        columns
    }

    fn serial_columns(&self, descriptor: &TableDescriptor) -> Vec<String> {
        descriptor
            .columns
            .iter()
            .filter(|c| {
                c.is_primary_key && c.is_auto_increment && serial_type_for(&c.source_type).is_some()
            })
            .map(|c| self.normalizer.column(&c.field))
            .collect()
    }
}

/// Translate a MySQL column default into a PostgreSQL default expression.
/// Anything not safely translatable is dropped.
pub fn translate_default(raw: &str, source_type: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }

    let category = categorize(source_type);
    let unquoted = strip_quotes(trimmed);

    match category {
        TypeCategory::Boolean => match unquoted.to_lowercase().as_str() {
            "0" | "b'0'" | "false" => Some("FALSE".to_string()),
            "1" | "b'1'" | "true" => Some("TRUE".to_string()),
            _ => None,
        },
        TypeCategory::Date | TypeCategory::Time | TypeCategory::DateTime => {
            if CURRENT_TIMESTAMP.is_match(unquoted) {
                Some("CURRENT_TIMESTAMP".to_string())
            } else {
                None
            }
        }
        TypeCategory::Integer | TypeCategory::Float | TypeCategory::Decimal => {
            if NUMERIC_LITERAL.is_match(unquoted) {
                Some(unquoted.to_string())
            } else {
                None
            }
        }
        TypeCategory::Text => Some(quote_literal(unquoted)),
        _ => None,
    }
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(s)
}
