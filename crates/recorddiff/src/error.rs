//! Error types for the diff library.

use thiserror::Error;

/// Main error type for diff operations.
#[derive(Error, Debug)]
pub enum DiffError {
    /// Configuration error (invalid YAML, bad table spec, unsupported engine, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A qualified table name failed to resolve against the live catalog
    #[error("Table \"{table}\" not found on {host}")]
    TableNotFound { table: String, host: String },

    /// Staging temp-table DDL failed for a specific pair
    #[error("Staging creation failed for table {table}: {message}")]
    Staging { table: String, message: String },

    /// Data transfer failed for a specific pair
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Connection establishment error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL driver error
    #[error("MySQL error: {0}")]
    Mysql(#[from] sqlx::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DiffError {
    /// Create a Config error
    pub fn config(message: impl Into<String>) -> Self {
        DiffError::Config(message.into())
    }

    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        DiffError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Staging error
    pub fn staging(table: impl Into<String>, message: impl ToString) -> Self {
        DiffError::Staging {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl ToString) -> Self {
        DiffError::Transfer {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error invalidates the whole run rather than one pair.
    ///
    /// A missing table or a configuration mistake means every remaining pair
    /// would be processed against wrong assumptions, so the run stops.
    /// Anything raised mid-pair (staging DDL, transfer, driver errors) fails
    /// only that pair.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            DiffError::Config(_) | DiffError::TableNotFound { .. } | DiffError::Pool { .. }
        )
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for diff operations.
pub type Result<T> = std::result::Result<T, DiffError>;
