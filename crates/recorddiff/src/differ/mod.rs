//! Diff run coordinator.
//!
//! Connects the two backends, then drives the staging-and-diff pipeline for
//! each configured table pair in sequence: reflect both sides, compute
//! exclusions, create the staging table, transfer the source rows, run the
//! two-directional comparison, and record the lap time.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::compare::{self, DiffResult};
use crate::config::{Config, TableSpec};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::core::{Column, QualifiedName, TableSchema};
use crate::drivers;
use crate::error::{DiffError, Result};
use crate::filter;
use crate::progress::{ProgressSink, TracingProgress};
use crate::staging::StagingTable;
use crate::timer::LapTimer;
use crate::transfer::TransferEngine;

/// Diff run coordinator.
pub struct Differ {
    config: Config,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    progress: Arc<dyn ProgressSink>,
}

/// Outcome of one table pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairReport {
    /// Source-side table name.
    pub source_table: String,

    /// Target-side table name.
    pub target_table: String,

    /// "ok" or "failed".
    pub status: String,

    /// Rows copied into staging (0 when the pair failed before transfer).
    pub rows_transferred: i64,

    /// Diff result when the pair completed.
    pub result: Option<DiffResult>,

    /// Error text when the pair failed.
    pub error: Option<String>,

    /// Wall-clock seconds for this pair.
    pub elapsed_seconds: f64,
}

impl PairReport {
    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Result of a full diff run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Pairs processed.
    pub pairs_total: usize,

    /// Pairs that completed.
    pub pairs_ok: usize,

    /// Pairs that failed.
    pub pairs_failed: usize,

    /// Per-pair outcomes, in input order.
    pub pairs: Vec<PairReport>,
}

impl RunReport {
    /// Whether every pair completed.
    pub fn all_ok(&self) -> bool {
        self.pairs_failed == 0
    }
}

impl Differ {
    /// Create a differ, connecting both backends from configuration.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let source = drivers::connect_source(&config.source).await?;
        let target = drivers::connect_target(&config.target).await?;
        Ok(Self {
            config,
            source,
            target,
            progress: Arc::new(TracingProgress),
        })
    }

    /// Create a differ over already-connected backends.
    pub fn with_connections(
        config: Config,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            target,
            progress: Arc::new(TracingProgress),
        })
    }

    /// Replace the progress sink.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Run the diff over every configured table pair.
    ///
    /// Configuration and missing-table errors abort the run; any other
    /// error fails only its pair and the run continues.
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let mut timer = LapTimer::start();
        let mut pairs = Vec::with_capacity(self.config.diff.tables.len());

        info!(
            "Comparing {} table pair(s) between {} and {}",
            self.config.diff.tables.len(),
            self.source.host(),
            self.target.host()
        );

        for spec in &self.config.diff.tables {
            timer.start_lap();
            let outcome = self.run_pair(spec).await;
            let elapsed = timer.end_lap();

            match outcome {
                Ok((result, rows_transferred)) => {
                    pairs.push(PairReport {
                        source_table: spec.source_name().to_string(),
                        target_table: spec.target_name().to_string(),
                        status: "ok".to_string(),
                        rows_transferred,
                        result: Some(result),
                        error: None,
                        elapsed_seconds: elapsed.as_secs_f64(),
                    });
                }
                Err(e) if e.is_run_fatal() => {
                    error!("{}: {}", spec.label(), e);
                    return Err(e);
                }
                Err(e) => {
                    error!("{}: pair failed: {}", spec.label(), e);
                    pairs.push(PairReport {
                        source_table: spec.source_name().to_string(),
                        target_table: spec.target_name().to_string(),
                        status: "failed".to_string(),
                        rows_transferred: 0,
                        result: None,
                        error: Some(e.to_string()),
                        elapsed_seconds: elapsed.as_secs_f64(),
                    });
                }
            }
        }

        timer.end();
        let completed_at = Utc::now();
        let pairs_ok = pairs.iter().filter(|p| p.is_ok()).count();

        Ok(RunReport {
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            pairs_total: pairs.len(),
            pairs_ok,
            pairs_failed: pairs.len() - pairs_ok,
            pairs,
        })
    }

    /// Process one pair end to end.
    async fn run_pair(&self, spec: &TableSpec) -> Result<(DiffResult, i64)> {
        let source_name = QualifiedName::parse(spec.source_name())?;
        let target_name = QualifiedName::parse(spec.target_name())?;

        let source_schema = self.source.reflect_table(&source_name).await?;
        let target_schema = self.target.reflect_table(&target_name).await?;

        let excluded = filter::exclusions(
            &self.config.diff.ignore_all,
            &self.config.diff.ignore_cols,
            spec,
        );

        let aligned = StagingTable::alignment_side(
            self.config.diff.alignment,
            &source_schema,
            &target_schema,
        );
        let staging = StagingTable::derive(aligned, &excluded, &source_name)?;

        // The staged projection must be readable from the source; drift
        // beyond the ignore lists is surfaced here, before any data moves.
        let mut read_columns = Vec::with_capacity(staging.columns.len());
        let mut missing = Vec::new();
        for col in &staging.columns {
            match source_schema.find_column(&col.name) {
                Some(source_col) => read_columns.push(source_col.clone()),
                None => missing.push(col.name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(DiffError::Config(format!(
                "Table {} on {} is missing column(s) {} required by the staging \
                 projection; add them to an ignore list or fix the schema",
                source_schema.display_name(),
                self.source.host(),
                missing.join(", ")
            )));
        }

        self.target.begin_pair().await?;
        let outcome = self
            .pair_body(
                spec,
                &source_name,
                &target_schema,
                &staging,
                read_columns,
                &excluded,
            )
            .await;

        match outcome {
            Ok(value) => {
                self.target.commit_pair().await?;
                Ok(value)
            }
            Err(e) => {
                // The rollback discards any partially-populated staging data.
                self.target.rollback_pair().await;
                Err(e)
            }
        }
    }

    /// The transactional part of a pair: staging DDL, transfer, compare.
    #[allow(clippy::too_many_arguments)]
    async fn pair_body(
        &self,
        spec: &TableSpec,
        source_name: &QualifiedName,
        target_schema: &TableSchema,
        staging: &StagingTable,
        read_columns: Vec<Column>,
        excluded: &BTreeSet<String>,
    ) -> Result<(DiffResult, i64)> {
        self.target.create_staging(staging).await?;

        let engine = TransferEngine::new(self.config.diff.batch_size, self.progress.clone());
        let stats = engine
            .execute(
                self.source.as_ref(),
                self.target.as_ref(),
                source_name,
                read_columns,
                staging,
            )
            .await?;

        let result = compare::compare(
            self.target.as_ref(),
            target_schema,
            staging,
            excluded,
            self.config.diff.sample_rows,
        )
        .await?;

        compare::log_result(
            spec.source_name(),
            spec.target_name(),
            self.target.host(),
            &result,
        );

        Ok((result, stats.rows))
    }

    /// Close both backend connections.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
