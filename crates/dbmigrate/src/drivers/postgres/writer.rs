//! PostgreSQL target writer implementation.
//!
//! Implements the `TargetWriter` trait over a deadpool-postgres pool. Rows are
//! loaded with text-format COPY, one COPY per window.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::{like_prefix, qualify_pg, quote_literal, quote_pg};
use crate::core::schema::{SequenceColumn, SequenceRecord};
use crate::core::traits::TargetWriter;
use crate::core::value::{Batch, SqlValue};
use crate::drivers::common::TlsBuilder;
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL target writer implementation.
pub struct PostgresWriter {
    pool: Pool,
}

impl PostgresWriter {
    /// Create a new PostgreSQL writer from configuration.
    pub async fn new(config: &TargetConfig, max_conns: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("dbmigrate");

        // Connection options for reliability
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match TlsBuilder::parse(&config.ssl_mode)?.build()? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
        };

        let pool = Pool::builder(mgr)
            .max_size(max_conns.max(1))
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL target connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { pool })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting PostgreSQL connection"))
    }

    fn copy_statement(schema: &str, table: &str, cols: &[String]) -> Result<String> {
        let col_list = cols
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        Ok(format!(
            "COPY {} ({}) FROM STDIN",
            qualify_pg(schema, table)?,
            col_list
        ))
    }

    fn setval_statement(schema: &str, record: &SequenceRecord) -> Result<String> {
        Ok(format!(
            "SELECT setval({}, COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false)",
            quote_literal(&record.sequence_name),
            quote_pg(&record.key_column)?,
            qualify_pg(schema, &record.table_name)?
        ))
    }
}

/// Encode a window as COPY text: tab-separated columns, one line per row.
fn encode_rows(rows: &[Vec<SqlValue<'static>>]) -> String {
    let mut buf = String::with_capacity(rows.len() * 128);
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                buf.push('\t');
            }
            buf.push_str(&value_to_text(value));
        }
        buf.push('\n');
    }
    buf
}

/// Convert SqlValue to text for COPY.
fn value_to_text(value: &SqlValue<'_>) -> String {
    match value {
        SqlValue::Null(_) => "\\N".to_string(),
        SqlValue::I16(i) => i.to_string(),
        SqlValue::I32(i) => i.to_string(),
        SqlValue::I64(i) => i.to_string(),
        SqlValue::F32(f) => float_to_text(f64::from(*f), f.to_string()),
        SqlValue::F64(f) => float_to_text(*f, f.to_string()),
        SqlValue::Text(s) => escape_copy_text(s),
        SqlValue::Bytes(b) => format!("\\\\x{}", hex::encode(b.as_ref())),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        SqlValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
    }
}

/// PostgreSQL spells the non-finite floats differently from Rust.
fn float_to_text(f: f64, finite: String) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        finite
    }
}

/// Escape text for PostgreSQL COPY.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

#[async_trait]
impl TargetWriter for PostgresWriter {
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let client = self.client().await?;

        let sql = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
        "#;

        let row = client.query_one(sql, &[&schema, &table]).await?;
        Ok(row.get::<_, bool>(0))
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let client = self.client().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn write_batch(
        &self,
        schema: &str,
        table: &str,
        cols: &[String],
        batch: Batch,
    ) -> Result<u64> {
        let rows = batch.rows;
        if rows.is_empty() {
            return Ok(0);
        }

        let copy_sql = Self::copy_statement(schema, table, cols)?;
        let data = Bytes::from(encode_rows(&rows));

        let client = self.client().await?;

        let sink = client
            .copy_in(&copy_sql)
            .await
            .map_err(|e| MigrateError::transfer(table, format!("COPY init: {}", e)))?;
        tokio::pin!(sink);

        sink.send(data)
            .await
            .map_err(|e| MigrateError::transfer(table, format!("COPY send: {}", e)))?;

        let written = sink
            .finish()
            .await
            .map_err(|e| MigrateError::transfer(table, format!("COPY finish: {}", e)))?;

        if written != rows.len() as u64 {
            return Err(MigrateError::transfer(
                table,
                format!("COPY wrote {} rows, window had {}", written, rows.len()),
            ));
        }

        debug!("COPY {} rows into {}.{}", written, schema, table);
        Ok(written)
    }

    async fn list_sequences(&self, schema: &str, prefix: &str) -> Result<Vec<SequenceColumn>> {
        let client = self.client().await?;

        let sql = r#"
            SELECT table_name::text, column_name::text, column_default::text
            FROM information_schema.columns
            WHERE table_schema = $1
              AND table_name LIKE $2
              AND column_default LIKE 'nextval%'
            ORDER BY table_name, ordinal_position
        "#;

        let pattern = like_prefix(prefix);
        let rows = client.query(sql, &[&schema, &pattern]).await?;

        Ok(rows
            .iter()
            .map(|row| SequenceColumn {
                table_name: row.get(0),
                column_name: row.get(1),
                column_default: row.get(2),
            })
            .collect())
    }

    async fn set_sequence(&self, schema: &str, record: &SequenceRecord) -> Result<i64> {
        let sql = Self::setval_statement(schema, record)?;
        let client = self.client().await?;
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let client = self.client().await?;
        let sql = format!("SELECT COUNT(*)::int8 FROM {}", qualify_pg(schema, table)?);
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}
