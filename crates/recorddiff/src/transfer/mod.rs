//! Batch transfer engine.
//!
//! Streams rows of the staged projection from the source connection and
//! inserts them into the staging table on the target connection, one
//! multi-row insert per batch. Rows cross a bounded channel from the
//! reader task, so memory stays bounded regardless of table size.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::schema::Column;
use crate::core::traits::{SourceReader, TargetWriter};
use crate::core::QualifiedName;
use crate::error::{DiffError, Result};
use crate::progress::ProgressSink;
use crate::staging::StagingTable;

/// Statistics from one table transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Rows actually transferred into staging.
    pub rows: i64,

    /// Source row count measured before the transfer.
    pub total_rows: i64,

    /// Number of batches inserted.
    pub batches: usize,
}

/// Transfer engine for copying source rows into the staging table.
pub struct TransferEngine {
    batch_size: usize,
    progress: Arc<dyn ProgressSink>,
}

impl TransferEngine {
    /// Create a new transfer engine.
    pub fn new(batch_size: usize, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            batch_size,
            progress,
        }
    }

    /// Copy the staged projection of `source_table` into `staging`.
    ///
    /// `read_columns` are the staging columns resolved against the source
    /// schema (source-side casing and types), in staging order. Any read or
    /// insert failure aborts the transfer; the caller discards the pair.
    pub async fn execute(
        &self,
        source: &dyn SourceReader,
        target: &dyn TargetWriter,
        source_table: &QualifiedName,
        read_columns: Vec<Column>,
        staging: &StagingTable,
    ) -> Result<TransferStats> {
        let table_name = source_table.display_name();

        info!(
            "Transferring {} from {} to temp table {} in {}",
            table_name,
            source.host(),
            staging.name,
            target.host()
        );

        let total_rows = source.count_rows(source_table).await?;
        if total_rows == 0 {
            // Nothing to stream; report 0% and leave the staging table empty.
            self.progress.batch_transferred(&table_name, 0, 0);
            info!("{}: source table is empty, skipping transfer", table_name);
            return Ok(TransferStats {
                rows: 0,
                total_rows: 0,
                batches: 0,
            });
        }

        let mut rx = source.stream_rows(source_table, read_columns, self.batch_size);

        let mut stats = TransferStats {
            rows: 0,
            total_rows,
            batches: 0,
        };

        while let Some(batch) = rx.recv().await {
            let batch = batch.map_err(|e| wrap_transfer(&table_name, e))?;
            let is_last = batch.is_last;

            if !batch.is_empty() {
                let row_count = batch.len() as i64;
                target
                    .insert_batch(staging, batch.rows)
                    .await
                    .map_err(|e| wrap_transfer(&table_name, e))?;

                stats.rows += row_count;
                stats.batches += 1;

                debug!(
                    "{}: batch {} inserted {} rows",
                    table_name, stats.batches, row_count
                );
                self.progress
                    .batch_transferred(&table_name, stats.rows, total_rows);
            }

            if is_last {
                break;
            }
        }

        info!(
            "{}: transferred {} of {} rows in {} batches",
            table_name, stats.rows, stats.total_rows, stats.batches
        );

        Ok(stats)
    }
}

/// Fold any mid-transfer error into the pair-scoped Transfer variant,
/// keeping an already-specific Transfer message intact.
fn wrap_transfer(table: &str, err: DiffError) -> DiffError {
    match err {
        DiffError::Transfer { .. } => err,
        other => DiffError::transfer(table, other),
    }
}
