//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Reference rows that must already exist in the target.
    #[serde(default)]
    pub prerequisites: PrerequisitesConfig,

    /// Snapshot artifact settings.
    #[serde(default)]
    pub backup: BackupConfig,
}

/// Source database (MySQL/MariaDB) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type (always "mysql").
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database (schema) name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode: disabled, preferred, required (default: preferred).
    #[serde(default = "default_preferred")]
    pub ssl_mode: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "postgres").
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per bulk INSERT statement (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Tables to include (glob patterns, `*` and `?`). Empty means all.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables to exclude (glob patterns).
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Order tables so inferred parents load before children (default: true).
    /// When false, tables are processed in source enumeration order.
    #[serde(default = "default_true")]
    pub dependency_order: bool,

    /// Legacy association-table names that always use the junction insert
    /// policy, whatever their primary key looks like.
    #[serde(default)]
    pub relationship_tables: Vec<String>,

    /// Tables loaded one row at a time with strict numeric repair.
    #[serde(default = "default_row_by_row_tables")]
    pub row_by_row_tables: Vec<String>,

    /// Explicit foreign-key targets. Key is `table.column` or `column`
    /// (source or normalized names); a `null` value disables inference.
    #[serde(default)]
    pub foreign_keys: HashMap<String, Option<String>>,

    /// Extra table-name translations, checked before the built-in dictionary.
    #[serde(default)]
    pub table_names: HashMap<String, String>,

    /// Extra column-name translations, checked before the built-in dictionary.
    #[serde(default)]
    pub column_names: HashMap<String, String>,

    /// Create `updated_at` triggers after loading (default: true).
    #[serde(default = "default_true")]
    pub create_triggers: bool,

    /// Create secondary indexes after loading (default: true).
    #[serde(default = "default_true")]
    pub create_indexes: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            dependency_order: true,
            relationship_tables: Vec::new(),
            row_by_row_tables: default_row_by_row_tables(),
            foreign_keys: HashMap::new(),
            table_names: HashMap::new(),
            column_names: HashMap::new(),
            create_triggers: true,
            create_indexes: true,
        }
    }
}

/// Lookup of a single reference row in the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceConfig {
    /// Target table holding the row.
    pub table: String,

    /// Column matched against `value` (default: "name").
    #[serde(default = "default_name_column")]
    pub column: String,

    /// Value identifying the row.
    pub value: String,

    /// Id column returned by the lookup (default: "id").
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

impl ReferenceConfig {
    fn new(table: &str, value: &str) -> Self {
        Self {
            table: table.to_string(),
            column: default_name_column(),
            value: value.to_string(),
            id_column: default_id_column(),
        }
    }
}

/// Reference rows that must exist in the target before the run starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrerequisitesConfig {
    /// Role assigned to migrated users.
    #[serde(default = "default_role")]
    pub role: ReferenceConfig,

    /// Institution used when a row has none.
    #[serde(default = "default_institution")]
    pub institution: ReferenceConfig,

    /// School used when a row has none.
    #[serde(default = "default_school")]
    pub school: ReferenceConfig,
}

impl Default for PrerequisitesConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            institution: default_institution(),
            school: default_school(),
        }
    }
}

/// Snapshot artifact configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Write the snapshot at the end of the run (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Output directory (default: "backups").
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_backup_dir(),
        }
    }
}

// Default value functions for serde
fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_preferred() -> String {
    "preferred".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    500
}

fn default_row_by_row_tables() -> Vec<String> {
    vec!["institution".to_string()]
}

fn default_name_column() -> String {
    "name".to_string()
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_role() -> ReferenceConfig {
    ReferenceConfig::new("role", "student")
}

fn default_institution() -> ReferenceConfig {
    ReferenceConfig::new("institution", "Default Institution")
}

fn default_school() -> ReferenceConfig {
    ReferenceConfig::new("school", "Default School")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}
