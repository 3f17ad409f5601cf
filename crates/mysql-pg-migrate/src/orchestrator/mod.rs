//! Migration orchestrator - main workflow coordinator.
//!
//! A run is strictly sequential: tables one at a time in dependency order,
//! rows in scan order. Only configuration, connectivity, table enumeration
//! and missing prerequisites abort a run; everything else is logged, counted
//! and reported in the [`MigrationResult`].

mod finalize;
mod result;

pub use result::{HealthCheckResult, MigrationResult, TableSummary};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crate::backup;
use crate::config::{Config, ReferenceConfig};
use crate::core::identifier::IdentifierNormalizer;
use crate::core::schema::{ForeignKeyCandidate, TableDescriptor, TableKind};
use crate::core::traits::{SourceStore, TargetStore};
use crate::core::value::{MigrationRow, SqlValue};
use crate::drivers::{MysqlReader, PostgresWriter};
use crate::error::{MigrateError, Result};
use crate::relationship::RelationshipInferencer;
use crate::schema::{describe_table, KnownTables, MaterializeOutcome, SchemaMaterializer};
use crate::transfer::{BatchLoader, LoadStats, OverrideRegistry};
use crate::transform::{transform_row, RowPlan};
use crate::typemap::{map_type, serial_type_for};

use finalize::{Finalizer, LoadedTable};

/// Ids of the reference rows every run depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prerequisites {
    pub role_id: i64,
    pub institution_id: i64,
    pub school_id: i64,
}

impl Prerequisites {
    /// Value for a required reference column, if it is one.
    fn id_for(&self, column: &str) -> Option<i64> {
        match column {
            "role_id" => Some(self.role_id),
            "institution_id" => Some(self.institution_id),
            "school_id" => Some(self.school_id),
            _ => None,
        }
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceStore>,
    target: Arc<dyn TargetStore>,
}

impl Orchestrator {
    /// Connect to both databases.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let source = MysqlReader::new(&config.source).await?;
        let target = match PostgresWriter::new(&config.target).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };
        Ok(Self::with_stores(config, Arc::new(source), Arc::new(target)))
    }

    /// Use already connected stores.
    pub fn with_stores(
        config: Config,
        source: Arc<dyn SourceStore>,
        target: Arc<dyn TargetStore>,
    ) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    /// The configuration this orchestrator runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the migration. Both stores are closed when this returns, whatever
    /// the outcome.
    pub async fn run(self) -> Result<MigrationResult> {
        let outcome = self.execute().await;
        self.close().await;
        outcome
    }

    /// Release both stores.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }

    /// Ping both stores and report latency.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = start.elapsed().as_millis() as u64;

        Ok(HealthCheckResult {
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.as_ref().err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.as_ref().err().map(|e| e.to_string()),
            healthy: source.is_ok() && target.is_ok(),
        })
    }

    async fn execute(&self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let migration = &self.config.migration;
        info!("Starting migration run: {}", run_id);

        // Phase 1: Enumerate tables
        info!("Phase 1: Listing source tables");
        let tables: Vec<String> = self
            .source
            .list_tables()
            .await?
            .into_iter()
            .filter(|t| migration.table_selected(t))
            .collect();
        info!("Found {} tables to migrate", tables.len());

        // Phase 2: Prerequisites
        info!("Phase 2: Resolving prerequisite reference rows");
        let prerequisites = self.resolve_prerequisites().await?;

        // Phase 3: Introspect and order
        info!("Phase 3: Reading source structure");
        let normalizer =
            IdentifierNormalizer::with_aliases(&migration.table_names, &migration.column_names);
        let inferencer = RelationshipInferencer::new(normalizer.clone(), &migration.foreign_keys);

        let mut descriptors = Vec::with_capacity(tables.len());
        for table in &tables {
            descriptors.push(describe_table(self.source.as_ref(), table, &normalizer).await);
        }
        let order: Vec<usize> = if migration.dependency_order {
            inferencer.migration_order(&descriptors)
        } else {
            (0..descriptors.len()).collect()
        };

        // Phase 4: Per-table schema and data
        info!("Phase 4: Migrating {} tables", descriptors.len());
        let materializer = SchemaMaterializer::new(self.target.as_ref(), &normalizer, &inferencer);
        let loader = BatchLoader::new(self.target.as_ref(), migration.batch_size);
        let overrides = OverrideRegistry::from_config(migration);

        let mut present: HashSet<String> = HashSet::new();
        let mut absent: HashSet<String> = HashSet::new();
        let mut planned: HashSet<String> =
            descriptors.iter().map(|d| d.target_name.clone()).collect();

        let mut summaries = Vec::with_capacity(descriptors.len());
        let mut loaded = Vec::with_capacity(descriptors.len());
        let mut deferred: Vec<(String, ForeignKeyCandidate)> = Vec::new();

        for (position, &idx) in order.iter().enumerate() {
            let descriptor = &descriptors[idx];
            let table = &descriptor.target_name;
            info!(
                "[{}/{}] {} -> {}",
                position + 1,
                order.len(),
                descriptor.source_name,
                table
            );

            planned.remove(table);
            for parent in inferencer.parents(descriptor) {
                self.check_table(&parent, &mut present, &mut absent).await;
            }

            let known = KnownTables {
                present: present.clone(),
                planned: planned.clone(),
            };
            let kind = TableKind::classify(
                descriptor,
                |field| normalizer.column(field),
                &migration.relationship_tables,
            );
            let report = materializer.ensure_table(descriptor, &kind, &known).await;
            if matches!(
                report.outcome,
                MaterializeOutcome::Created | MaterializeOutcome::AlreadyExisted
            ) {
                present.insert(table.clone());
                absent.remove(table);
            }
            deferred.extend(report.deferred.iter().map(|fk| (table.clone(), fk.clone())));

            let (stats, rows_read, error) = self
                .migrate_rows(descriptor, &kind, &normalizer, &loader, &overrides, prerequisites)
                .await;

            summaries.push(TableSummary {
                source: descriptor.source_name.clone(),
                target: table.clone(),
                schema: schema_label(&report.outcome).to_string(),
                rows_read,
                rows_inserted: stats.inserted,
                rows_skipped: stats.skipped,
                rows_failed: stats.failed,
                error,
            });
            loaded.push(LoadedTable {
                descriptor: descriptor.clone(),
                serial_columns: report.serial_columns,
            });
        }

        // Phase 5: Post-load DDL
        info!("Phase 5: Triggers, indexes, constraints and sequences");
        let finalizer = Finalizer {
            target: self.target.as_ref(),
            normalizer: &normalizer,
            inferencer: &inferencer,
            create_triggers: migration.create_triggers,
            create_indexes: migration.create_indexes,
        };
        let post_processing_failures = finalizer.run(&loaded, &deferred, &present).await;

        // Phase 6: Snapshot
        let backup_path = if self.config.backup.enabled {
            info!("Phase 6: Writing snapshot");
            match backup::snapshot(self.source.as_ref(), &tables, &self.config.backup.dir).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Snapshot failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let completed_at = Utc::now();
        let failed_tables: Vec<String> = summaries
            .iter()
            .filter(|s| table_failed(s))
            .map(|s| s.source.clone())
            .collect();
        let mut result = MigrationResult {
            run_id,
            status: String::new(),
            config_hash: self.config.hash(),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tables_total: summaries.len(),
            tables_processed: summaries.len() - failed_tables.len(),
            tables_failed: failed_tables.len(),
            failed_tables,
            rows_read: summaries.iter().map(|s| s.rows_read).sum(),
            rows_migrated: summaries.iter().map(|s| s.rows_inserted).sum(),
            rows_skipped: summaries.iter().map(|s| s.rows_skipped).sum(),
            rows_failed: summaries.iter().map(|s| s.rows_failed).sum(),
            post_processing_failures,
            backup_path,
            tables: summaries,
        };
        result.status = if result.has_errors() {
            "completed_with_errors".to_string()
        } else {
            "completed".to_string()
        };

        info!(
            "Migration {}: {} tables ({} failed), {} rows read, {} migrated, {} skipped, {} failed in {:.1}s",
            result.status,
            result.tables_total,
            result.tables_failed,
            result.rows_read,
            result.rows_migrated,
            result.rows_skipped,
            result.rows_failed,
            result.duration_seconds
        );

        Ok(result)
    }

    async fn resolve_prerequisites(&self) -> Result<Prerequisites> {
        let prerequisites = &self.config.prerequisites;
        Ok(Prerequisites {
            role_id: self.lookup("role", &prerequisites.role).await?,
            institution_id: self.lookup("institution", &prerequisites.institution).await?,
            school_id: self.lookup("school", &prerequisites.school).await?,
        })
    }

    async fn lookup(&self, name: &str, reference: &ReferenceConfig) -> Result<i64> {
        match self.target.lookup_reference(reference).await? {
            Some(id) => {
                info!(
                    "Prerequisite {}: {}.{} = '{}' -> id {}",
                    name, reference.table, reference.column, reference.value, id
                );
                Ok(id)
            }
            None => Err(MigrateError::MissingPrerequisite {
                name: name.to_string(),
                table: reference.table.clone(),
                column: reference.column.clone(),
                value: reference.value.clone(),
            }),
        }
    }

    /// Record whether a table outside the planned set exists in the target.
    async fn check_table(
        &self,
        table: &str,
        present: &mut HashSet<String>,
        absent: &mut HashSet<String>,
    ) {
        if present.contains(table) || absent.contains(table) {
            return;
        }
        match self.target.table_exists(table).await {
            Ok(true) => {
                present.insert(table.to_string());
            }
            Ok(false) => {
                absent.insert(table.to_string());
            }
            Err(e) => {
                warn!("Could not check whether {} exists: {}", table, e);
                absent.insert(table.to_string());
            }
        }
    }

    /// Fetch, transform, fill, repair and load one table's rows.
    async fn migrate_rows(
        &self,
        descriptor: &TableDescriptor,
        kind: &TableKind,
        normalizer: &IdentifierNormalizer,
        loader: &BatchLoader<'_>,
        overrides: &OverrideRegistry,
        prerequisites: Prerequisites,
    ) -> (LoadStats, u64, Option<String>) {
        let table = &descriptor.target_name;
        let rows = match self.source.fetch_rows(&descriptor.source_name).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("{}: could not read rows: {}", descriptor.source_name, e);
                return (LoadStats::default(), 0, Some(e.to_string()));
            }
        };
        let rows_read = rows.len() as u64;

        let plan = RowPlan::new(descriptor, normalizer);
        let required = required_reference_columns(descriptor, normalizer, prerequisites);
        let table_override = overrides.get(&descriptor.source_name, table);
        let column_types = column_types(descriptor, normalizer);

        let transformed: Vec<MigrationRow> = rows
            .iter()
            .map(|raw| {
                let mut row = transform_row(&plan, raw);
                for (column, id) in &required {
                    let missing = row.get(column).map_or(true, SqlValue::is_null);
                    if missing {
                        row.insert(column.clone(), SqlValue::I64(*id));
                    }
                }
                if let Some(o) = table_override {
                    o.repair_row(&mut row, &column_types);
                }
                row
            })
            .collect();

        let strategy = overrides.strategy(&descriptor.source_name, table);
        let stats = loader.load_rows(table, &transformed, kind, strategy).await;
        (stats, rows_read, None)
    }
}

/// Non-nullable `role_id`/`institution_id`/`school_id` columns and the id to
/// put in them when a row has none.
fn required_reference_columns(
    descriptor: &TableDescriptor,
    normalizer: &IdentifierNormalizer,
    prerequisites: Prerequisites,
) -> Vec<(String, i64)> {
    descriptor
        .columns
        .iter()
        .filter(|c| !c.nullable)
        .filter_map(|c| {
            let column = normalizer.column(&c.field);
            prerequisites.id_for(&column).map(|id| (column, id))
        })
        .collect()
}

/// Target column -> PostgreSQL type, as created by the materializer.
fn column_types(
    descriptor: &TableDescriptor,
    normalizer: &IdentifierNormalizer,
) -> HashMap<String, String> {
    descriptor
        .columns
        .iter()
        .map(|c| {
            let serial = if c.is_primary_key && c.is_auto_increment {
                serial_type_for(&c.source_type)
            } else {
                None
            };
            let sql_type = serial
                .map(str::to_string)
                .unwrap_or_else(|| map_type(&c.source_type));
            (normalizer.column(&c.field), sql_type)
        })
        .collect()
}

fn schema_label(outcome: &MaterializeOutcome) -> &'static str {
    match outcome {
        MaterializeOutcome::Created => "created",
        MaterializeOutcome::AlreadyExisted => "existed",
        MaterializeOutcome::Skipped => "skipped",
        MaterializeOutcome::Failed(_) => "failed",
    }
}

fn table_failed(summary: &TableSummary) -> bool {
    summary.error.is_some()
        || (summary.rows_read > 0 && summary.rows_failed == summary.rows_read)
}
