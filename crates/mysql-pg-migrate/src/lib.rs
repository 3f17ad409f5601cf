//! # mysql-pg-migrate
//!
//! Schema-translating MySQL to PostgreSQL migration library.
//!
//! Moves a legacy MySQL database, whose tables and columns are often named
//! in Portuguese, into an existing PostgreSQL platform schema:
//!
//! - **Name normalization** to the platform's English identifiers
//! - **Type mapping** and value repair for out-of-range or malformed data
//! - **Relationship inference** from `*_id` columns, with dependency ordering
//! - **Idempotent loading** using `ON CONFLICT DO NOTHING`, batch or per row
//! - **Post-load DDL** for triggers, indexes, deferred keys and sequences
//! - **JSON snapshot** of the source data
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mysql_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run().await?;
//!     println!("Migrated {} rows", result.rows_migrated);
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod relationship;
pub mod schema;
pub mod transfer;
pub mod transform;
pub mod typemap;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{BackupConfig, Config, MigrationConfig, SourceConfig, TargetConfig};
pub use crate::core::{IdentifierNormalizer, SourceStore, SourceValue, SqlValue, TableDescriptor, TargetStore};
pub use drivers::{MysqlReader, PostgresWriter};
pub use error::{MigrateError, Result};
pub use orchestrator::{HealthCheckResult, MigrationResult, Orchestrator, TableSummary};
pub use relationship::RelationshipInferencer;
pub use transfer::{BatchLoader, LoadStats, LoadStrategy};
