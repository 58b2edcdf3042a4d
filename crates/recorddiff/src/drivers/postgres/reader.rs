//! PostgreSQL source reader implementation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::sync::mpsc;
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::core::identifier::{quote_pg, QualifiedName};
use crate::core::schema::{Column, TableSchema};
use crate::core::traits::SourceReader;
use crate::core::value::{Batch, SqlValue};
use crate::error::Result;

use super::{connect, convert_pg_row_value, reflect_columns};

/// PostgreSQL source reader over a single connection.
pub struct PostgresReader {
    client: Arc<tokio_postgres::Client>,
    host: String,
}

impl PostgresReader {
    /// Create a new PostgreSQL reader from configuration.
    pub async fn new(config: &ConnectionConfig) -> Result<Self> {
        let client = connect(config, "connecting PostgreSQL source").await?;
        Ok(Self {
            client: Arc::new(client),
            host: config.host.clone(),
        })
    }
}

#[async_trait]
impl SourceReader for PostgresReader {
    async fn reflect_table(&self, name: &QualifiedName) -> Result<TableSchema> {
        reflect_columns(&self.client, name, &self.host).await
    }

    async fn count_rows(&self, name: &QualifiedName) -> Result<i64> {
        let query = format!("SELECT COUNT(*)::int8 FROM {}", name.quote_pg()?);
        let row = self.client.query_one(&query, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    fn stream_rows(
        &self,
        name: &QualifiedName,
        columns: Vec<Column>,
        batch_size: usize,
    ) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(16);
        let client = self.client.clone();
        let name = name.clone();

        tokio::spawn(async move {
            if let Err(e) = stream_rows_inner(client, name, columns, batch_size, tx.clone()).await
            {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        // The connection task ends when the client is dropped.
    }
}

/// Stream the projected columns of a table in batches.
async fn stream_rows_inner(
    client: Arc<tokio_postgres::Client>,
    name: QualifiedName,
    columns: Vec<Column>,
    batch_size: usize,
    tx: mpsc::Sender<Result<Batch>>,
) -> Result<()> {
    let col_list = columns
        .iter()
        .map(|c| quote_pg(&c.name))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let sql = format!("SELECT {} FROM {}", col_list, name.quote_pg()?);
    debug!("Streaming query: {}", sql);

    let params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    let stream = client.query_raw(&sql, params).await?;
    futures::pin_mut!(stream);

    let batch_size = batch_size.max(1);
    let mut rows: Vec<Vec<SqlValue>> = Vec::with_capacity(batch_size);

    while let Some(row) = stream.try_next().await? {
        let values = columns
            .iter()
            .enumerate()
            .map(|(idx, col)| convert_pg_row_value(&row, idx, &col.data_type))
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
