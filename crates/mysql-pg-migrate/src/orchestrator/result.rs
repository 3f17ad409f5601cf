//! Run summaries returned by the orchestrator.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Per-table outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSummary {
    /// Source table name.
    pub source: String,

    /// Target table name.
    pub target: String,

    /// `created`, `existed`, `skipped` or `failed`.
    pub schema: String,

    pub rows_read: u64,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
    pub rows_failed: u64,

    /// Set when the table's rows could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// `completed`, or `completed_with_errors` when any table or row failed.
    pub status: String,

    /// SHA-256 of the configuration used.
    pub config_hash: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables selected for this run.
    pub tables_total: usize,

    /// Tables whose rows were read and loaded.
    pub tables_processed: usize,

    /// Tables that could not be read or lost every row.
    pub tables_failed: usize,

    /// Names of failed tables.
    pub failed_tables: Vec<String>,

    pub rows_read: u64,
    pub rows_migrated: u64,
    pub rows_skipped: u64,
    pub rows_failed: u64,

    /// Post-load statements (triggers, indexes, constraints, sequences) that failed.
    pub post_processing_failures: usize,

    /// Snapshot file, when one was written.
    pub backup_path: Option<PathBuf>,

    /// Per-table detail in processing order.
    pub tables: Vec<TableSummary>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether anything was lost along the way.
    pub fn has_errors(&self) -> bool {
        self.tables_failed > 0 || self.rows_failed > 0
    }
}

/// Connectivity of both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}
