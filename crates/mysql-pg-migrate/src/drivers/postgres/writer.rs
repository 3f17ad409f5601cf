//! PostgreSQL target writer.
//!
//! Uses deadpool-postgres for connection pooling. Every connection runs with
//! `search_path` set to the configured schema, so statements rendered by
//! [`crate::dialect`] use unqualified table names.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::Config as PgConfig;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, info, warn};

use super::tls::{client_config, SslMode};
use crate::config::{ReferenceConfig, TargetConfig};
use crate::core::identifier::quote_pg;
use crate::core::traits::TargetStore;
use crate::dialect::{InsertStatement, TableDefinition};
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// The pipeline is sequential; a second connection covers health checks.
const MAX_CONNECTIONS: usize = 2;

/// PostgreSQL target writer.
pub struct PostgresWriter {
    pool: Pool,
    schema: String,
}

/// Startup `options` value pinning `search_path` to `schema`, quoted the same
/// way as `CREATE SCHEMA`. Whitespace and backslashes are escaped for libpq.
fn search_path_option(schema: &str) -> Result<String> {
    let mut escaped = String::new();
    for c in quote_pg(schema)?.chars() {
        if c == '\\' || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Ok(format!("-c search_path={}", escaped))
}

impl PostgresWriter {
    /// Connect, test the pool and make sure the target schema exists.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.options(&search_path_option(&config.schema)?);

        // Connection options for reliability
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match client_config(SslMode::parse(&config.ssl_mode)?)? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
            Some(tls_config) => Manager::from_config(
                pg_config,
                MakeRustlsConnect::new(tls_config),
                mgr_config,
            ),
        };
        let pool = Pool::builder(mgr)
            .max_size(MAX_CONNECTIONS)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL target connection"))?;
        client.simple_query("SELECT 1").await?;
        client
            .batch_execute(&format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_pg(&config.schema)?
            ))
            .await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{} (schema {})",
            config.host, config.port, config.database, config.schema
        );

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting PostgreSQL connection"))
    }
}

#[async_trait]
impl TargetStore for PostgresWriter {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let client = self.client().await?;

        let sql = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
        "#;

        let row = client.query_one(sql, &[&self.schema, &table]).await?;
        Ok(row.get::<_, bool>(0))
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<()> {
        let client = self.client().await?;
        let ddl = definition.to_sql();
        debug!("{}", ddl);
        client.batch_execute(&ddl).await?;
        Ok(())
    }

    async fn insert_rows(&self, statement: &InsertStatement) -> Result<u64> {
        if statement.is_empty() {
            return Ok(0);
        }
        let client = self.client().await?;
        let affected = client.execute(statement.to_sql().as_str(), &[]).await?;
        Ok(affected)
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let client = self.client().await?;
        debug!("{}", sql);
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn lookup_reference(&self, reference: &ReferenceConfig) -> Result<Option<i64>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {}::bigint FROM {} WHERE {}::text = $1 LIMIT 1",
            quote_pg(&reference.id_column)?,
            quote_pg(&reference.table)?,
            quote_pg(&reference.column)?
        );
        let row = client.query_opt(sql.as_str(), &[&reference.value]).await?;
        Ok(row.map(|r| r.get::<_, i64>(0)))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}
