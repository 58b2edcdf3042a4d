//! In-memory mock backends for pipeline tests.
//!
//! [`MockSource`] and [`MockTarget`] implement the driver traits over plain
//! vectors, with real set-difference semantics on the target side, so the
//! whole pipeline can be exercised without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::identifier::QualifiedName;
use crate::core::schema::{Column, TableSchema};
use crate::core::traits::{Projection, Relation, SourceReader, TargetWriter};
use crate::core::value::{Batch, SqlValue};
use crate::error::{DiffError, Result};
use crate::staging::StagingTable;

type Row = Vec<SqlValue>;

/// Mock source: fixed schemas and rows, optional injected stream errors.
pub struct MockSource {
    host: String,
    tables: Vec<(TableSchema, Vec<Row>)>,
    stream_errors: HashMap<String, String>,
}

impl MockSource {
    /// Single-table source.
    pub fn new(table: &str, columns: Vec<Column>, rows: Vec<Row>) -> Self {
        let schema = TableSchema::new(
            QualifiedName::parse(table).expect("valid mock table name"),
            columns,
        );
        Self {
            host: "src.mock".to_string(),
            tables: vec![(schema, rows)],
            stream_errors: HashMap::new(),
        }
    }

    /// Add another table.
    pub fn with_table(mut self, table: &str, columns: Vec<Column>, rows: Vec<Row>) -> Self {
        let schema = TableSchema::new(
            QualifiedName::parse(table).expect("valid mock table name"),
            columns,
        );
        self.tables.push((schema, rows));
        self
    }

    /// Make every stream fail with the given message.
    pub fn with_stream_error(mut self, message: &str) -> Self {
        self.stream_errors.insert("*".to_string(), message.to_string());
        self
    }

    /// Make streams of one table fail with the given message.
    pub fn with_stream_error_on(mut self, table: &str, message: &str) -> Self {
        self.stream_errors.insert(table.to_string(), message.to_string());
        self
    }

    fn find(&self, name: &QualifiedName) -> Option<&(TableSchema, Vec<Row>)> {
        self.tables.iter().find(|(schema, _)| &schema.name == name)
    }
}

#[async_trait]
impl SourceReader for MockSource {
    async fn reflect_table(&self, name: &QualifiedName) -> Result<TableSchema> {
        self.find(name)
            .map(|(schema, _)| schema.clone())
            .ok_or_else(|| DiffError::TableNotFound {
                table: name.display_name(),
                host: self.host.clone(),
            })
    }

    async fn count_rows(&self, name: &QualifiedName) -> Result<i64> {
        self.find(name)
            .map(|(_, rows)| rows.len() as i64)
            .ok_or_else(|| DiffError::TableNotFound {
                table: name.display_name(),
                host: self.host.clone(),
            })
    }

    fn stream_rows(
        &self,
        name: &QualifiedName,
        columns: Vec<Column>,
        batch_size: usize,
    ) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(16);

        let error = self
            .stream_errors
            .get(&name.table)
            .or_else(|| self.stream_errors.get("*"))
            .cloned();
        if let Some(message) = error {
            tokio::spawn(async move {
                // A raw driver-style error; the transfer engine adds the
                // table context when wrapping it.
                let _ = tx
                    .send(Err(DiffError::pool(message, "mock stream")))
                    .await;
            });
            return rx;
        }

        let Some((schema, rows)) = self.find(name) else {
            let table = name.display_name();
            let host = self.host.clone();
            tokio::spawn(async move {
                let _ = tx.send(Err(DiffError::TableNotFound { table, host })).await;
            });
            return rx;
        };

        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|c| {
                schema
                    .columns
                    .iter()
                    .position(|s| s.name.eq_ignore_ascii_case(&c.name))
            })
            .collect();
        let projected: Vec<Row> = rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        tokio::spawn(async move {
            let total = projected.len();
            let mut sent = 0usize;
            for chunk in projected.chunks(batch_size.max(1)) {
                sent += chunk.len();
                let mut batch = Batch::new(chunk.to_vec());
                if sent == total {
                    batch = batch.mark_final();
                }
                if tx.send(Ok(batch)).await.is_err() {
                    return;
                }
            }
            if total == 0 {
                let _ = tx.send(Ok(Batch::empty_final())).await;
            }
        });

        rx
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn db_type(&self) -> &str {
        "mock"
    }

    async fn close(&self) {}
}

/// Mock target: fixed tables plus an in-memory staging area with real
/// EXCEPT (distinct set-difference) semantics.
pub struct MockTarget {
    host: String,
    tables: Vec<(TableSchema, Vec<Row>)>,
    staging: Mutex<HashMap<String, (Vec<Column>, Vec<Row>)>>,
    staging_ddl: Mutex<Vec<StagingTable>>,
    tx_log: Mutex<Vec<&'static str>>,
    insert_error: Option<String>,
    staging_error: Option<String>,
}

impl MockTarget {
    /// Target with the given permanent tables.
    pub fn new(host: &str, tables: Vec<(TableSchema, Vec<Row>)>) -> Self {
        Self {
            host: host.to_string(),
            tables,
            staging: Mutex::new(HashMap::new()),
            staging_ddl: Mutex::new(Vec::new()),
            tx_log: Mutex::new(Vec::new()),
            insert_error: None,
            staging_error: None,
        }
    }

    /// Make every insert fail with the given message.
    pub fn with_insert_error(mut self, message: &str) -> Self {
        self.insert_error = Some(message.to_string());
        self
    }

    /// Make staging DDL fail with the given message.
    pub fn with_staging_error(mut self, message: &str) -> Self {
        self.staging_error = Some(message.to_string());
        self
    }

    /// Register a staging table without going through `create_staging`.
    pub fn register_staging(&self, staging: &StagingTable) {
        self.staging
            .lock()
            .expect("staging lock")
            .insert(staging.name.clone(), (staging.columns.clone(), Vec::new()));
    }

    /// Append pre-projected rows directly into a staging table.
    pub fn stage_rows(&self, name: &str, rows: Vec<Row>) {
        let mut staging = self.staging.lock().expect("staging lock");
        let entry = staging.get_mut(name).expect("staging table registered");
        entry.1.extend(rows);
    }

    /// Row count of a staging table (0 when absent).
    pub fn staging_row_count(&self, name: &str) -> i64 {
        self.staging
            .lock()
            .expect("staging lock")
            .get(name)
            .map(|(_, rows)| rows.len() as i64)
            .unwrap_or(0)
    }

    /// Staging DDL issued through `create_staging`, in order.
    pub fn created_staging(&self) -> Vec<StagingTable> {
        self.staging_ddl.lock().expect("ddl lock").clone()
    }

    /// Transaction events, in order ("begin" / "commit" / "rollback").
    pub fn transaction_log(&self) -> Vec<&'static str> {
        self.tx_log.lock().expect("tx lock").clone()
    }

    fn find(&self, name: &QualifiedName) -> Option<&(TableSchema, Vec<Row>)> {
        self.tables.iter().find(|(schema, _)| &schema.name == name)
    }

    /// Resolve a projection to concrete rows.
    fn project(&self, projection: &Projection) -> Result<Vec<Row>> {
        match &projection.relation {
            Relation::Table(name) => {
                let (schema, rows) = self.find(name).ok_or_else(|| DiffError::TableNotFound {
                    table: name.display_name(),
                    host: self.host.clone(),
                })?;
                let indices: Vec<usize> = projection
                    .columns
                    .iter()
                    .filter_map(|c| {
                        schema
                            .columns
                            .iter()
                            .position(|s| s.name.eq_ignore_ascii_case(&c.name))
                    })
                    .collect();
                Ok(rows
                    .iter()
                    .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                    .collect())
            }
            Relation::Staging(name) => {
                let staging = self.staging.lock().expect("staging lock");
                let (columns, rows) = staging.get(name).ok_or_else(|| {
                    DiffError::staging(name.clone(), "staging table does not exist")
                })?;
                let indices: Vec<usize> = projection
                    .columns
                    .iter()
                    .filter_map(|c| {
                        columns
                            .iter()
                            .position(|s| s.name.eq_ignore_ascii_case(&c.name))
                    })
                    .collect();
                Ok(rows
                    .iter()
                    .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                    .collect())
            }
        }
    }
}

#[async_trait]
impl TargetWriter for MockTarget {
    async fn reflect_table(&self, name: &QualifiedName) -> Result<TableSchema> {
        self.find(name)
            .map(|(schema, _)| schema.clone())
            .ok_or_else(|| DiffError::TableNotFound {
                table: name.display_name(),
                host: self.host.clone(),
            })
    }

    async fn begin_pair(&self) -> Result<()> {
        self.tx_log.lock().expect("tx lock").push("begin");
        Ok(())
    }

    async fn commit_pair(&self) -> Result<()> {
        self.tx_log.lock().expect("tx lock").push("commit");
        // ON COMMIT DROP semantics.
        self.staging.lock().expect("staging lock").clear();
        Ok(())
    }

    async fn rollback_pair(&self) {
        self.tx_log.lock().expect("tx lock").push("rollback");
        self.staging.lock().expect("staging lock").clear();
    }

    async fn create_staging(&self, staging: &StagingTable) -> Result<()> {
        if let Some(message) = &self.staging_error {
            return Err(DiffError::staging(staging.name.clone(), message.clone()));
        }
        self.staging_ddl
            .lock()
            .expect("ddl lock")
            .push(staging.clone());
        self.register_staging(staging);
        Ok(())
    }

    async fn insert_batch(&self, staging: &StagingTable, rows: Vec<Row>) -> Result<u64> {
        if let Some(message) = &self.insert_error {
            return Err(DiffError::transfer(staging.name.clone(), message.clone()));
        }
        let count = rows.len() as u64;
        self.stage_rows(&staging.name, rows);
        Ok(count)
    }

    async fn count_rows(&self, relation: &Relation) -> Result<i64> {
        match relation {
            Relation::Table(name) => self
                .find(name)
                .map(|(_, rows)| rows.len() as i64)
                .ok_or_else(|| DiffError::TableNotFound {
                    table: name.display_name(),
                    host: self.host.clone(),
                }),
            Relation::Staging(name) => Ok(self.staging_row_count(name)),
        }
    }

    async fn except_diff(
        &self,
        left: &Projection,
        right: &Projection,
        sample_limit: usize,
    ) -> Result<(i64, Vec<Row>)> {
        let left_rows = self.project(left)?;
        let right_rows = self.project(right)?;

        // SQL EXCEPT: distinct left rows absent from the right side.
        let mut diff: Vec<Row> = Vec::new();
        for row in left_rows {
            if !right_rows.contains(&row) && !diff.contains(&row) {
                diff.push(row);
            }
        }

        let count = diff.len() as i64;
        diff.truncate(sample_limit);
        Ok((count, diff))
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn db_type(&self) -> &str {
        "mock"
    }

    async fn close(&self) {}
}
