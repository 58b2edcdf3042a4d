//! Database driver backends and connection factories.

pub mod mysql;
pub mod postgres;

use std::sync::Arc;

use crate::config::{ConnectionConfig, DbType};
use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::{DiffError, Result};

/// Connect the source backend for a configuration.
pub async fn connect_source(config: &ConnectionConfig) -> Result<Arc<dyn SourceReader>> {
    match config.db_type() {
        DbType::Postgres => Ok(Arc::new(postgres::PostgresReader::new(config).await?)),
        DbType::Mysql => Ok(Arc::new(mysql::MysqlReader::new(config).await?)),
        other => Err(DiffError::Config(format!(
            "Unsupported source type '{}'. Valid options: postgres, mysql",
            other
        ))),
    }
}

/// Connect the target backend for a configuration.
///
/// The target must support session temp tables and EXCEPT; configuration
/// validation has already rejected engines that cannot host staging, so
/// this only dispatches.
pub async fn connect_target(config: &ConnectionConfig) -> Result<Arc<dyn TargetWriter>> {
    match config.db_type() {
        DbType::Postgres => Ok(Arc::new(postgres::PostgresWriter::new(config).await?)),
        other => Err(DiffError::Config(format!(
            "Target type '{}' does not support session temp-table staging. \
             Valid options: postgres",
            other
        ))),
    }
}
