//! Core traits for database-agnostic table diffing.
//!
//! This module defines the seams between the pipeline and the database
//! drivers:
//!
//! - [`SourceReader`]: reflects schema and streams rows from the source side
//! - [`TargetWriter`]: reflects schema, hosts the staging table, and executes
//!   the set-difference queries on the target side
//!
//! Tests supply in-memory implementations of both, so the pipeline is
//! exercised without a live database.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::staging::StagingTable;

use super::identifier::QualifiedName;
use super::schema::{Column, TableSchema};
use super::value::{Batch, SqlValue};

/// A relation addressable in the target database: either a regular table or
/// a session-scoped staging table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// A permanent table, possibly schema-qualified.
    Table(QualifiedName),

    /// A session-scoped staging table, addressed by bare name.
    Staging(String),
}

/// An ordered column projection over a relation, as used by the comparator.
#[derive(Debug, Clone)]
pub struct Projection {
    /// The relation the columns are read from.
    pub relation: Relation,

    /// Projected columns in output order, with their catalog types.
    pub columns: Vec<Column>,
}

impl Projection {
    /// Create a projection over a relation.
    pub fn new(relation: Relation, columns: Vec<Column>) -> Self {
        Self { relation, columns }
    }

    /// Projected column names in output order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Read schema and data from a source database.
///
/// # Streaming
///
/// [`stream_rows`] returns a channel receiver yielding batches, enabling
/// backpressure and bounded memory use on arbitrarily large tables. The
/// reader spawns a background task that populates the channel.
///
/// [`stream_rows`]: SourceReader::stream_rows
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Resolve a qualified table name against the live catalog.
    ///
    /// Fails with [`DiffError::TableNotFound`](crate::DiffError::TableNotFound)
    /// when the name does not resolve; there are no retries.
    async fn reflect_table(&self, name: &QualifiedName) -> Result<TableSchema>;

    /// Get the exact row count for a table.
    async fn count_rows(&self, name: &QualifiedName) -> Result<i64>;

    /// Start streaming rows of the given columns from a table.
    ///
    /// Returns a receiver that yields `Result<Batch>` of up to `batch_size`
    /// rows each until the table is exhausted. No ordering is guaranteed.
    fn stream_rows(
        &self,
        name: &QualifiedName,
        columns: Vec<Column>,
        batch_size: usize,
    ) -> mpsc::Receiver<Result<Batch>>;

    /// Host identifier for error and progress messages.
    fn host(&self) -> &str;

    /// Get the database type identifier (e.g., "postgres", "mysql").
    fn db_type(&self) -> &str;

    /// Close the connection.
    async fn close(&self);
}

/// Write staging data and execute comparisons in the target database.
///
/// The staging table is session-scoped, so implementations must pin all
/// operations of a run to a single connection/session.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Resolve a qualified table name against the live catalog.
    async fn reflect_table(&self, name: &QualifiedName) -> Result<TableSchema>;

    /// Begin the transaction covering one pair's staging, load, and compare.
    async fn begin_pair(&self) -> Result<()>;

    /// Commit the pair's transaction, dropping the staging table with it.
    async fn commit_pair(&self) -> Result<()>;

    /// Best-effort rollback after a pair failed mid-flight.
    async fn rollback_pair(&self);

    /// Create the session-scoped staging table.
    async fn create_staging(&self, staging: &StagingTable) -> Result<()>;

    /// Insert a batch of rows into the staging table.
    async fn insert_batch(&self, staging: &StagingTable, rows: Vec<Vec<SqlValue>>) -> Result<u64>;

    /// Get the exact row count of a relation.
    async fn count_rows(&self, relation: &Relation) -> Result<i64>;

    /// Execute `left EXCEPT right` and return the total differing-row count
    /// plus up to `sample_limit` example rows.
    async fn except_diff(
        &self,
        left: &Projection,
        right: &Projection,
        sample_limit: usize,
    ) -> Result<(i64, Vec<Vec<SqlValue>>)>;

    /// Host identifier for error and progress messages.
    fn host(&self) -> &str;

    /// Get the database type identifier (e.g., "postgres").
    fn db_type(&self) -> &str;

    /// Close the connection.
    async fn close(&self);
}
