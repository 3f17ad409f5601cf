//! Post-load DDL: triggers, indexes, deferred foreign keys, sequences.
//!
//! Every statement is guarded so reruns are no-ops, and a failing statement
//! is logged and counted without stopping the others.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::core::identifier::IdentifierNormalizer;
use crate::core::schema::{ForeignKeyCandidate, TableDescriptor};
use crate::core::traits::TargetStore;
use crate::dialect::postprocess::{
    create_index_sql, deferred_foreign_key_sql, reset_sequence_sql, updated_at_function_sql,
    updated_at_trigger_sql, UPDATED_AT_COLUMN,
};
use crate::relationship::RelationshipInferencer;

/// What the per-table phase left behind for finalization.
pub(super) struct LoadedTable {
    pub descriptor: TableDescriptor,
    pub serial_columns: Vec<String>,
}

pub(super) struct Finalizer<'a> {
    pub target: &'a dyn TargetStore,
    pub normalizer: &'a IdentifierNormalizer,
    pub inferencer: &'a RelationshipInferencer,
    pub create_triggers: bool,
    pub create_indexes: bool,
}

impl Finalizer<'_> {
    /// Run all post-load statements; returns the number that failed.
    pub async fn run(
        &self,
        tables: &[LoadedTable],
        deferred: &[(String, ForeignKeyCandidate)],
        present: &HashSet<String>,
    ) -> usize {
        let tables: Vec<&LoadedTable> = tables
            .iter()
            .filter(|t| present.contains(&t.descriptor.target_name))
            .collect();
        let mut failures = 0;

        if self.create_triggers {
            failures += self.triggers(&tables).await;
        }
        if self.create_indexes {
            failures += self.indexes(&tables, present).await;
        }
        failures += self.deferred_foreign_keys(deferred, present).await;
        failures += self.sequences(&tables).await;

        if failures > 0 {
            warn!("{} post-load statements failed", failures);
        } else {
            info!("Post-load DDL complete");
        }
        failures
    }

    async fn execute(&self, what: &str, sql: &str) -> usize {
        debug!("{}: {}", what, sql);
        match self.target.execute(sql).await {
            Ok(()) => 0,
            Err(e) => {
                warn!("Failed to create {}: {}", what, e);
                1
            }
        }
    }

    async fn triggers(&self, tables: &[&LoadedTable]) -> usize {
        let with_updated_at: Vec<&str> = tables
            .iter()
            .filter(|t| {
                t.descriptor
                    .columns
                    .iter()
                    .any(|c| self.normalizer.column(&c.field) == UPDATED_AT_COLUMN)
            })
            .map(|t| t.descriptor.target_name.as_str())
            .collect();
        if with_updated_at.is_empty() {
            return 0;
        }

        if self
            .execute("updated_at trigger function", &updated_at_function_sql())
            .await
            > 0
        {
            // Triggers cannot exist without their function.
            return 1;
        }

        let mut failures = 0;
        for table in with_updated_at {
            failures += self
                .execute(
                    &format!("updated_at trigger on {}", table),
                    &updated_at_trigger_sql(table),
                )
                .await;
        }
        failures
    }

    async fn indexes(&self, tables: &[&LoadedTable], present: &HashSet<String>) -> usize {
        let mut failures = 0;
        for table in tables {
            let descriptor = &table.descriptor;
            let mut seen: HashSet<Vec<String>> = HashSet::new();
            let mut wanted: Vec<(Vec<String>, bool)> = Vec::new();

            for index in &descriptor.indexes {
                let columns: Vec<String> =
                    index.columns.iter().map(|c| self.normalizer.column(c)).collect();
                if seen.insert(columns.clone()) {
                    wanted.push((columns, index.is_unique));
                }
            }
            for column in &descriptor.columns {
                let detection = self.inferencer.detect(descriptor, &column.field);
                let references_present = detection
                    .target_table
                    .as_ref()
                    .is_some_and(|t| present.contains(t));
                if references_present {
                    let columns = vec![self.normalizer.column(&column.field)];
                    if seen.insert(columns.clone()) {
                        wanted.push((columns, false));
                    }
                }
            }

            for (columns, unique) in wanted {
                failures += self
                    .execute(
                        &format!("index on {} ({})", descriptor.target_name, columns.join(", ")),
                        &create_index_sql(&descriptor.target_name, &columns, unique),
                    )
                    .await;
            }
        }
        failures
    }

    async fn deferred_foreign_keys(
        &self,
        deferred: &[(String, ForeignKeyCandidate)],
        present: &HashSet<String>,
    ) -> usize {
        let mut failures = 0;
        for (table, fk) in deferred {
            if !present.contains(table) || !present.contains(&fk.target_table) {
                warn!(
                    "Dropping deferred {}: {} was never created",
                    fk.constraint_name, fk.target_table
                );
                continue;
            }
            failures += self
                .execute(
                    &format!("foreign key {}", fk.constraint_name),
                    &deferred_foreign_key_sql(table, fk),
                )
                .await;
        }
        failures
    }

    async fn sequences(&self, tables: &[&LoadedTable]) -> usize {
        let mut failures = 0;
        for table in tables {
            for column in &table.serial_columns {
                failures += self
                    .execute(
                        &format!("sequence reset for {}.{}", table.descriptor.target_name, column),
                        &reset_sequence_sql(&table.descriptor.target_name, column),
                    )
                    .await;
            }
        }
        failures
    }
}
