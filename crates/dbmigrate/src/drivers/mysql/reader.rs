//! MySQL/MariaDB source reader implementation.
//!
//! Implements the `SourceReader` trait over an SQLx pool: catalog queries
//! against `INFORMATION_SCHEMA` and keyset-paged row windows.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow,
    MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::Row;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::identifier::{like_prefix, qualify_mysql, quote_mysql};
use crate::core::schema::{ColumnMeta, IndexKind, IndexMeta, TableMeta};
use crate::core::traits::{SourceReader, WindowCursor, WindowRequest};
use crate::core::value::{Batch, Row as ValueRow, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    pool: MySqlPool,
}

impl MysqlReader {
    /// Create a new MySQL reader from configuration.
    pub async fn new(config: &SourceConfig, max_conns: usize) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(parse_ssl_mode(&config.ssl_mode)?);

        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns.max(1) as u32)
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
            "Connected to {} source: {}:{}/{}",
            config.r#type, config.host, config.port, config.database
        );

        Ok(Self { pool })
    }

    /// Build the SELECT for one window and the key values it binds.
    fn window_sql(request: &WindowRequest<'_>) -> Result<(String, Vec<SqlValue<'static>>)> {
        let table = request.table;
        let col_list = table
            .columns
            .iter()
            .map(|c| quote_mysql(&c.name))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let table_ref = qualify_mysql(request.schema, &table.qualified_name)?;

        let mut sql = format!("SELECT {} FROM {}", col_list, table_ref);
        let mut binds = Vec::new();

        match (&request.cursor, table.copy_key()) {
            (WindowCursor::Offset(offset), _) => {
                sql.push_str(&format!(
                    " ORDER BY {} LIMIT {} OFFSET {}",
                    col_list, request.limit, offset
                ));
            }
            (cursor, Some(key)) => {
                let key_cols = key
                    .columns
                    .iter()
                    .map(|c| quote_mysql(c))
                    .collect::<Result<Vec<_>>>()?
                    .join(", ");

                if let WindowCursor::After(values) = cursor {
                    if values.len() != key.columns.len() {
                        return Err(MigrateError::transfer(
                            &table.qualified_name,
                            format!(
                                "keyset cursor has {} values for {} key columns",
                                values.len(),
                                key.columns.len()
                            ),
                        ));
                    }
                    let placeholders = vec!["?"; values.len()].join(", ");
                    sql.push_str(&format!(" WHERE ({}) > ({})", key_cols, placeholders));
                    binds.extend(values.iter().cloned());
                }

                sql.push_str(&format!(" ORDER BY {} LIMIT {}", key_cols, request.limit));
            }
            (_, None) => {
                return Err(MigrateError::transfer(
                    &table.qualified_name,
                    "keyset paging requested for a table without a usable key",
                ));
            }
        }

        Ok((sql, binds))
    }

    /// Convert a MySQL row to owned values, one per planned column.
    fn row_to_values(row: &MySqlRow, table: &TableMeta) -> Result<ValueRow> {
        table
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| Self::decode_column(row, i, col, &table.qualified_name))
            .collect()
    }

    fn decode_column(
        row: &MySqlRow,
        i: usize,
        col: &ColumnMeta,
        table: &str,
    ) -> Result<SqlValue<'static>> {
        let data_type = col.source_type.to_lowercase();
        let unsigned = col.is_unsigned();
        let null = SqlValue::Null(Self::null_type_for(&data_type, unsigned));

        let decode_err = |e: sqlx::Error| {
            MigrateError::transfer(table, format!("decoding column {}: {}", col.name, e))
        };

        let value = match (data_type.as_str(), unsigned) {
            // Integer types, widened so unsigned ranges fit
            ("tinyint", false) => row
                .try_get::<Option<i8>, _>(i)
                .map_err(decode_err)?
                .map(|v| SqlValue::I16(v as i16)),
            ("tinyint", true) => row
                .try_get::<Option<u8>, _>(i)
                .map_err(decode_err)?
                .map(|v| SqlValue::I16(v as i16)),
            ("smallint", false) => row
                .try_get::<Option<i16>, _>(i)
                .map_err(decode_err)?
                .map(SqlValue::I16),
            ("smallint", true) => row
                .try_get::<Option<u16>, _>(i)
                .map_err(decode_err)?
                .map(|v| SqlValue::I32(v as i32)),
            ("mediumint" | "int" | "integer", false) => row
                .try_get::<Option<i32>, _>(i)
                .map_err(decode_err)?
                .map(SqlValue::I32),
            ("mediumint" | "int" | "integer", true) => row
                .try_get::<Option<u32>, _>(i)
                .map_err(decode_err)?
                .map(|v| SqlValue::I64(v as i64)),
            ("bigint", false) => row
                .try_get::<Option<i64>, _>(i)
                .map_err(decode_err)?
                .map(SqlValue::I64),
            ("bigint", true) => row
                .try_get::<Option<u64>, _>(i)
                .map_err(decode_err)?
                .map(|v| match i64::try_from(v) {
                    Ok(signed) => SqlValue::I64(signed),
                    Err(_) => SqlValue::Decimal(Decimal::from(v)),
                }),

            // Floating point
            ("float", _) => row
                .try_get::<Option<f32>, _>(i)
                .map_err(decode_err)?
                .map(SqlValue::F32),
            ("double" | "real", _) => row
                .try_get::<Option<f64>, _>(i)
                .map_err(decode_err)?
                .map(SqlValue::F64),

            // Decimal
            ("decimal" | "numeric", _) => row
                .try_get::<Option<Decimal>, _>(i)
                .map_err(decode_err)?
                .map(SqlValue::Decimal),

            // Binary types
            ("binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob", _) => row
                .try_get::<Option<Vec<u8>>, _>(i)
                .map_err(decode_err)?
                .map(SqlValue::bytes_owned),

            // Date/Time types
            ("date", _) => row
                .try_get::<Option<chrono::NaiveDate>, _>(i)
                .map_err(decode_err)?
                .map(SqlValue::Date),
            ("time", _) => row
                .try_get::<Option<chrono::NaiveTime>, _>(i)
                .map_err(decode_err)?
                .map(SqlValue::Time),
            ("datetime" | "timestamp", _) => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(i)
                .map_err(decode_err)?
                .map(SqlValue::DateTime),

            // Character types
            _ => row
                .try_get::<Option<String>, _>(i)
                .map_err(decode_err)?
                .map(SqlValue::text_owned),
        };

        Ok(value.unwrap_or(null))
    }

    /// Get the null type for a MySQL data type.
    fn null_type_for(data_type: &str, unsigned: bool) -> SqlNullType {
        match (data_type, unsigned) {
            ("tinyint", _) | ("smallint", false) => SqlNullType::I16,
            ("smallint", true) | ("mediumint" | "int" | "integer", false) => SqlNullType::I32,
            ("mediumint" | "int" | "integer", true) | ("bigint", false) => SqlNullType::I64,
            ("bigint", true) => SqlNullType::Decimal,
            ("float", _) => SqlNullType::F32,
            ("double" | "real", _) => SqlNullType::F64,
            ("decimal" | "numeric", _) => SqlNullType::Decimal,
            ("binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob", _) => {
                SqlNullType::Bytes
            }
            ("date", _) => SqlNullType::Date,
            ("time", _) => SqlNullType::Time,
            ("datetime" | "timestamp", _) => SqlNullType::DateTime,
            _ => SqlNullType::String,
        }
    }
}

/// Bind a key value to a query.
fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: SqlValue<'static>,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null(_) => query.bind(Option::<String>::None),
        SqlValue::I16(v) => query.bind(v),
        SqlValue::I32(v) => query.bind(v),
        SqlValue::I64(v) => query.bind(v),
        SqlValue::F32(v) => query.bind(v),
        SqlValue::F64(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v.into_owned()),
        SqlValue::Bytes(v) => query.bind(v.into_owned()),
        SqlValue::Decimal(v) => query.bind(v),
        SqlValue::DateTime(v) => query.bind(v),
        SqlValue::Date(v) => query.bind(v),
        SqlValue::Time(v) => query.bind(v),
    }
}

/// Map the configured ssl_mode onto SQLx's modes.
fn parse_ssl_mode(mode: &str) -> Result<MySqlSslMode> {
    match mode.to_lowercase().as_str() {
        "disabled" | "disable" => Ok(MySqlSslMode::Disabled),
        "preferred" | "prefer" | "" => Ok(MySqlSslMode::Preferred),
        "required" | "require" => Ok(MySqlSslMode::Required),
        "verify-ca" | "verify_ca" => Ok(MySqlSslMode::VerifyCa),
        "verify-full" | "verify_identity" => Ok(MySqlSslMode::VerifyIdentity),
        other => Err(MigrateError::Config(format!(
            "Invalid source ssl_mode '{}'. Valid values: disabled, preferred, required, verify-ca, verify-full",
            other
        ))),
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn list_tables(&self, schema: &str, prefix: &str) -> Result<Vec<String>> {
        // CAST to CHAR: information_schema may return VARBINARY under some collations
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' AND TABLE_NAME LIKE ?
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(schema)
            .bind(like_prefix(prefix))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::pool(e, "listing MySQL tables"))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("TABLE_NAME")?;
            if let Some(logical) = name.strip_prefix(prefix) {
                if !logical.is_empty() {
                    tables.push(logical.to_string());
                }
            }
        }

        debug!("Listed {} tables in schema '{}'", tables.len(), schema);
        Ok(tables)
    }

    async fn row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*) AS cnt FROM {}", qualify_mysql(schema, table)?);

        let row: MySqlRow = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::pool(e, "getting row count"))?;

        Ok(row.try_get::<i64, _>("cnt")?)
    }

    async fn load_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnMeta>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(64)) AS DATA_TYPE,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                CAST(IF(IS_NULLABLE = 'YES', 1, 0) AS SIGNED) AS is_nullable,
                CAST(COLUMN_DEFAULT AS CHAR) AS COLUMN_DEFAULT,
                CAST(NUMERIC_PRECISION AS SIGNED) AS num_precision,
                CAST(NUMERIC_SCALE AS SIGNED) AS num_scale,
                CAST(IF(EXTRA LIKE '%auto_increment%', 1, 0) AS SIGNED) AS is_auto_increment
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::pool(e, "loading MySQL columns"))?;

        rows.iter()
            .map(|row| {
                Ok(ColumnMeta {
                    name: row.try_get("COLUMN_NAME")?,
                    source_type: row.try_get::<String, _>("DATA_TYPE")?.to_lowercase(),
                    display_type: row.try_get("COLUMN_TYPE")?,
                    nullable: row.try_get::<i64, _>("is_nullable")? == 1,
                    default_value: row.try_get("COLUMN_DEFAULT")?,
                    numeric_precision: row.try_get("num_precision")?,
                    numeric_scale: row.try_get("num_scale")?,
                    is_auto_increment: row.try_get::<i64, _>("is_auto_increment")? == 1,
                })
            })
            .collect()
    }

    async fn load_indexes(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<IndexMap<String, IndexMeta>> {
        let query = r#"
            SELECT
                CAST(s.INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                CAST(s.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(s.SEQ_IN_INDEX AS SIGNED) AS SEQ_IN_INDEX,
                CAST(tc.CONSTRAINT_TYPE AS CHAR(64)) AS CONSTRAINT_TYPE
            FROM INFORMATION_SCHEMA.STATISTICS s
            JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
                ON tc.TABLE_SCHEMA = s.TABLE_SCHEMA
                AND tc.TABLE_NAME = s.TABLE_NAME
                AND tc.CONSTRAINT_NAME = s.INDEX_NAME
            WHERE s.TABLE_SCHEMA = ? AND s.TABLE_NAME = ?
              AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE')
            ORDER BY s.INDEX_NAME, s.SEQ_IN_INDEX
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::pool(e, "loading MySQL indexes"))?;

        let mut indexes: IndexMap<String, IndexMeta> = IndexMap::new();
        for row in rows {
            let name: String = row.try_get("INDEX_NAME")?;
            let column: String = row.try_get("COLUMN_NAME")?;
            let seq: i64 = row.try_get("SEQ_IN_INDEX")?;
            let constraint_type: String = row.try_get("CONSTRAINT_TYPE")?;

            let Some(kind) = IndexKind::from_constraint_type(&constraint_type) else {
                continue;
            };

            indexes
                .entry(name.clone())
                .or_insert_with(|| IndexMeta::new(name, kind))
                .set_column(seq.max(1) as usize, column);
        }

        debug!(
            "Loaded {} key indexes for {}.{}",
            indexes.len(),
            schema,
            table
        );
        Ok(indexes)
    }

    async fn read_window(&self, request: WindowRequest<'_>) -> Result<Batch> {
        let (sql, binds) = Self::window_sql(&request)?;

        let mut query = sqlx::query(&sql);
        for value in binds {
            query = bind_value(query, value);
        }

        let rows: Vec<MySqlRow> = query.fetch_all(&self.pool).await.map_err(|e| {
            MigrateError::transfer(&request.table.qualified_name, format!("reading window: {}", e))
        })?;

        let values = rows
            .iter()
            .map(|row| Self::row_to_values(row, request.table))
            .collect::<Result<Vec<_>>>()?;

        let is_last = values.len() < request.limit;
        let batch = Batch::new(values);
        Ok(if is_last { batch.mark_final() } else { batch })
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
