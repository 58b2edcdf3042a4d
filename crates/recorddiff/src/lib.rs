//! # recorddiff
//!
//! Row-level comparison of two tables living in potentially different
//! database engines.
//!
//! The pipeline stages a filtered, column-aligned copy of the source table
//! as a session-scoped temp table inside the target database, then computes
//! an exact two-directional set difference with the target engine's native
//! `EXCEPT`:
//!
//! - **Bounded memory** via fixed-size batch streaming of the source table
//! - **Schema drift tolerance** through global and per-table column ignore
//!   lists
//! - **Symmetric results**: rows that appeared in the target and rows that
//!   disappeared from it, with sample rows for inspection
//!
//! ## Example
//!
//! ```rust,no_run
//! use recorddiff::{Config, Differ};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let differ = Differ::new(config).await?;
//!     let report = differ.run().await?;
//!     println!("{} of {} pairs clean", report.pairs_ok, report.pairs_total);
//!     Ok(())
//! }
//! ```

pub mod compare;
pub mod config;
pub mod core;
pub mod differ;
pub mod drivers;
pub mod error;
pub mod filter;
pub mod progress;
pub mod staging;
pub mod timer;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports for convenient access
pub use compare::{DiffDirection, DiffResult};
pub use config::{Config, ConnectionConfig, DiffConfig, SchemaAlignment, TableSpec};
pub use crate::core::{Column, QualifiedName, SqlValue, TableSchema};
pub use differ::{Differ, PairReport, RunReport};
pub use error::{DiffError, Result};
pub use progress::{ProgressSink, TracingProgress};
pub use staging::StagingTable;
pub use timer::LapTimer;
pub use transfer::{TransferEngine, TransferStats};
