//! MySQL/MariaDB source reader.
//!
//! Uses SQLx for connection pooling and INFORMATION_SCHEMA for structure.
//! Values are decoded as wide as possible ([`SourceValue`]) and left for the
//! transformer to narrow.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{json, Value as JsonValue};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Column as _, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::identifier::quote_mysql;
use crate::core::schema::{ColumnDescriptor, IndexDescriptor};
use crate::core::traits::SourceStore;
use crate::core::value::{SourceRow, SourceValue};
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// The pipeline is sequential; one spare connection covers the snapshot.
const MAX_CONNECTIONS: u32 = 2;

/// MySQL/MariaDB source reader.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
}

impl MysqlReader {
    /// Connect and test the pool.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode(&config.ssl_mode));

        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MySQL source pool"))?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL source connection"))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }
}

fn ssl_mode(mode: &str) -> MySqlSslMode {
    match mode.to_lowercase().as_str() {
        "disabled" => MySqlSslMode::Disabled,
        "required" => MySqlSslMode::Required,
        _ => MySqlSslMode::Preferred,
    }
}

#[async_trait]
impl SourceStore for MysqlReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        // CAST to CHAR to handle collation differences where information_schema
        // may return VARBINARY instead of VARCHAR
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::SchemaExtraction(format!("listing tables: {}", e)))?;

        let tables: Vec<String> = rows.iter().map(|r| r.get("TABLE_NAME")).collect();
        info!(
            "Found {} tables in MySQL database '{}'",
            tables.len(),
            self.database
        );
        Ok(tables)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                CAST(IF(IS_NULLABLE = 'YES', 1, 0) AS SIGNED) AS is_nullable,
                CAST(IF(COLUMN_KEY = 'PRI', 1, 0) AS SIGNED) AS is_primary,
                CAST(IF(EXTRA LIKE '%auto_increment%', 1, 0) AS SIGNED) AS is_identity,
                CAST(COLUMN_DEFAULT AS CHAR) AS COLUMN_DEFAULT
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::SchemaExtraction(format!("columns of {}: {}", table, e)))?;

        rows.iter()
            .map(|row| {
                Ok(ColumnDescriptor {
                    field: row.try_get("COLUMN_NAME")?,
                    source_type: row.try_get("COLUMN_TYPE")?,
                    nullable: row.try_get::<i64, _>("is_nullable")? == 1,
                    is_primary_key: row.try_get::<i64, _>("is_primary")? == 1,
                    is_auto_increment: row.try_get::<i64, _>("is_identity")? == 1,
                    default_value: row.try_get("COLUMN_DEFAULT")?,
                })
            })
            .collect()
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>> {
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                CAST(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX) AS CHAR) AS columns,
                CAST(IF(NON_UNIQUE = 0, 1, 0) AS SIGNED) AS is_unique
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
              AND INDEX_NAME != 'PRIMARY'
            GROUP BY INDEX_NAME, NON_UNIQUE
            ORDER BY INDEX_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::SchemaExtraction(format!("indexes of {}: {}", table, e)))?;

        let indexes = rows
            .iter()
            .map(|row| {
                let columns: String = row.try_get("columns")?;
                Ok(IndexDescriptor {
                    name: row.try_get("INDEX_NAME")?,
                    columns: columns.split(',').map(|s| s.to_string()).collect(),
                    is_unique: row.try_get::<i64, _>("is_unique")? == 1,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Loaded {} indexes for {}", indexes.len(), table);
        Ok(indexes)
    }

    async fn fetch_rows(&self, table: &str) -> Result<Vec<SourceRow>> {
        let sql = format!("SELECT * FROM {}", quote_mysql(table)?);
        let rows: Vec<MySqlRow> = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::transfer(table, format!("reading rows: {}", e)))?;

        debug!("Read {} rows from {}", rows.len(), table);
        Ok(rows.iter().map(row_to_source).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL connection"))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_source(row: &MySqlRow) -> SourceRow {
    row.columns()
        .iter()
        .map(|col| {
            let idx = col.ordinal();
            (col.name().to_string(), decode_value(row, idx))
        })
        .collect()
}

/// Decode one cell by its wire type.
fn decode_value(row: &MySqlRow, idx: usize) -> SourceValue {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return SourceValue::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return SourceValue::Null,
    };
    let unsigned = type_name.ends_with("UNSIGNED");
    let base = type_name.split_whitespace().next().unwrap_or_default();

    let decoded = match base {
        "BOOLEAN" => row.try_get::<bool, _>(idx).ok().map(SourceValue::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" if unsigned => row
            .try_get::<u64, _>(idx)
            .ok()
            .map(|v| SourceValue::Int(i128::from(v))),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => row
            .try_get::<i64, _>(idx)
            .ok()
            .map(|v| SourceValue::Int(i128::from(v))),
        "BIT" => row
            .try_get::<u64, _>(idx)
            .ok()
            .map(|v| SourceValue::Int(i128::from(v))),
        "FLOAT" => row
            .try_get::<f32, _>(idx)
            .ok()
            .map(|v| SourceValue::Float(f64::from(v))),
        "DOUBLE" => row.try_get::<f64, _>(idx).ok().map(SourceValue::Float),
        "DECIMAL" => row
            .try_get::<rust_decimal::Decimal, _>(idx)
            .ok()
            .map(SourceValue::Decimal),
        "DATE" => Some(
            row.try_get::<NaiveDate, _>(idx)
                .map(SourceValue::Date)
                .unwrap_or_else(|_| undecodable_temporal(idx)),
        ),
        "DATETIME" | "TIMESTAMP" => Some(
            row.try_get::<NaiveDateTime, _>(idx)
                .map(SourceValue::DateTime)
                .unwrap_or_else(|_| undecodable_temporal(idx)),
        ),
        "TIME" => row.try_get::<NaiveTime, _>(idx).ok().map(SourceValue::Time),
        "JSON" => text_or_bytes(row, idx).map(|text| {
            serde_json::from_str::<JsonValue>(&text)
                .map(SourceValue::Composite)
                .unwrap_or(SourceValue::Text(text))
        }),
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "GEOMETRY" => {
            row.try_get::<Vec<u8>, _>(idx).ok().map(SourceValue::Bytes)
        }
        _ => None,
    };

    decoded.unwrap_or_else(|| fallback(row, idx, &type_name))
}

/// Zero dates and other values chrono cannot hold.
fn undecodable_temporal(idx: usize) -> SourceValue {
    debug!("Column {}: undecodable temporal value", idx);
    SourceValue::Composite(json!({}))
}

fn text_or_bytes(row: &MySqlRow, idx: usize) -> Option<String> {
    row.try_get::<String, _>(idx).ok().or_else(|| {
        row.try_get::<Vec<u8>, _>(idx)
            .ok()
            .and_then(|b| String::from_utf8(b).ok())
    })
}

/// String, then bytes, then NULL.
fn fallback(row: &MySqlRow, idx: usize, type_name: &str) -> SourceValue {
    if let Ok(s) = row.try_get::<String, _>(idx) {
        return SourceValue::Text(s);
    }
    if let Ok(b) = row.try_get::<Vec<u8>, _>(idx) {
        return SourceValue::Bytes(b);
    }
    debug!("Column {}: cannot decode {} value, using NULL", idx, type_name);
    SourceValue::Null
}
