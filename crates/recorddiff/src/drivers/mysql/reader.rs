//! MySQL/MariaDB source reader implementation.
//!
//! Uses SQLx for connection pooling and async query execution.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::Row;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::identifier::{quote_mysql, QualifiedName};
use crate::core::schema::{Column, TableSchema};
use crate::core::traits::SourceReader;
use crate::core::value::{Batch, SqlNullType, SqlValue};
use crate::error::{DiffError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    pool: MySqlPool,
    host: String,
}

impl MysqlReader {
    /// Create a new MySQL reader from configuration.
    pub async fn new(config: &ConnectionConfig) -> Result<Self> {
        let ssl_mode = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => MySqlSslMode::Disabled,
            "verify-ca" => MySqlSslMode::VerifyCa,
            "verify-full" => MySqlSslMode::VerifyIdentity,
            _ => MySqlSslMode::Preferred,
        };

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.effective_port())
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode);

        // The pipeline is sequential; two connections cover the count query
        // and the streaming read.
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| DiffError::pool(e, "creating MySQL source pool"))?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| DiffError::pool(e, "testing MySQL source connection"))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host,
            config.effective_port(),
            config.database
        );

        Ok(Self {
            pool,
            host: config.host.clone(),
        })
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn reflect_table(&self, name: &QualifiedName) -> Result<TableSchema> {
        // CAST string columns to CHAR to sidestep collation differences.
        // An unqualified name resolves against the connected database.
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(name.schema.as_deref())
            .bind(&name.table)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Err(DiffError::TableNotFound {
                table: name.display_name(),
                host: self.host.clone(),
            });
        }

        let columns = rows
            .iter()
            .map(|row| {
                Column::new(
                    row.get::<String, _>("COLUMN_NAME"),
                    row.get::<String, _>("DATA_TYPE"),
                )
            })
            .collect::<Vec<_>>();

        debug!("Reflected {} columns for {}", columns.len(), name);
        Ok(TableSchema::new(name.clone(), columns))
    }

    async fn count_rows(&self, name: &QualifiedName) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", name.quote_mysql()?);
        let row: MySqlRow = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    fn stream_rows(
        &self,
        name: &QualifiedName,
        columns: Vec<Column>,
        batch_size: usize,
    ) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(16);
        let pool = self.pool.clone();
        let name = name.clone();

        tokio::spawn(async move {
            if let Err(e) = stream_rows_inner(pool, name, columns, batch_size, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Stream the projected columns of a table in batches.
async fn stream_rows_inner(
    pool: MySqlPool,
    name: QualifiedName,
    columns: Vec<Column>,
    batch_size: usize,
    tx: mpsc::Sender<Result<Batch>>,
) -> Result<()> {
    let col_list = columns
        .iter()
        .map(|c| quote_mysql(&c.name))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let sql = format!("SELECT {} FROM {}", col_list, name.quote_mysql()?);
    debug!("Streaming query: {}", sql);

    let mut stream = sqlx::query(&sql).fetch(&pool);

    let batch_size = batch_size.max(1);
    let mut rows: Vec<Vec<SqlValue>> = Vec::with_capacity(batch_size);

    while let Some(row) = stream.try_next().await? {
        let values = columns
            .iter()
            .enumerate()
            .map(|(idx, col)| convert_mysql_row_value(&row, idx, &col.data_type))
            .collect();
        rows.push(values);

        if rows.len() >= batch_size {
            let batch = Batch::new(std::mem::take(&mut rows));
            if tx.send(Ok(batch)).await.is_err() {
                return Ok(());
            }
            rows = Vec::with_capacity(batch_size);
        }
    }

    let final_batch = Batch::new(rows).mark_final();
    let _ = tx.send(Ok(final_batch)).await;
    Ok(())
}

/// Convert a MySQL row value to SqlValue, keyed by the catalog DATA_TYPE.
fn convert_mysql_row_value(row: &MySqlRow, idx: usize, data_type: &str) -> SqlValue {
    let dt = data_type.to_lowercase();

    match dt.as_str() {
        "tinyint" | "smallint" | "year" => row
            .try_get::<i64, _>(idx)
            .ok()
            .map(|v| SqlValue::I16(v as i16))
            .unwrap_or(SqlValue::Null(SqlNullType::I16)),
        "mediumint" | "int" | "integer" => row
            .try_get::<i64, _>(idx)
            .ok()
            .map(|v| SqlValue::I32(v as i32))
            .unwrap_or(SqlValue::Null(SqlNullType::I32)),
        "bigint" => row
            .try_get::<i64, _>(idx)
            .ok()
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null(SqlNullType::I64)),
        "float" => row
            .try_get::<f32, _>(idx)
            .ok()
            .map(SqlValue::F32)
            .unwrap_or(SqlValue::Null(SqlNullType::F32)),
        "double" => row
            .try_get::<f64, _>(idx)
            .ok()
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null(SqlNullType::F64)),
        "decimal" => row
            .try_get::<rust_decimal::Decimal, _>(idx)
            .ok()
            .map(SqlValue::Decimal)
            .unwrap_or(SqlValue::Null(SqlNullType::Decimal)),
        "bit" => row
            .try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null(SqlNullType::Bytes)),
        "date" => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .ok()
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null(SqlNullType::Date)),
        "datetime" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .ok()
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTime)),
        "timestamp" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .ok()
            .map(|v| SqlValue::DateTimeOffset(v.fixed_offset()))
            .unwrap_or(SqlValue::Null(SqlNullType::DateTimeOffset)),
        "time" => row
            .try_get::<chrono::NaiveTime, _>(idx)
            .ok()
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null(SqlNullType::Time)),
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => row
            .try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null(SqlNullType::Bytes)),
        "json" => row
            .try_get::<serde_json::Value, _>(idx)
            .ok()
            .map(|v| SqlValue::Text(v.to_string()))
            .unwrap_or(SqlValue::Null(SqlNullType::Text)),
        _ => row
            .try_get::<String, _>(idx)
            .ok()
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null(SqlNullType::Text)),
    }
}
