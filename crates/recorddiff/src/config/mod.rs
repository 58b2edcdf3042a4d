//! Configuration loading and validation.
//!
//! The configuration is a YAML document with two connection blocks and a
//! diff block describing which tables to compare and which columns to
//! ignore:
//!
//! ```yaml
//! source:
//!   type: mysql
//!   host: legacy-db.internal
//!   database: shop
//!   user: reader
//!   password: secret
//! target:
//!   type: postgres
//!   host: new-db.internal
//!   database: shop
//!   user: writer
//!   password: secret
//! diff:
//!   tables:
//!     - orders
//!     - [legacy_customers, customers]
//!   ignore_all: [updated_at]
//!   ignore_cols:
//!     orders: note
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DiffError, Result};

/// Default batch size for the transfer engine.
pub const DEFAULT_BATCH_SIZE: usize = 15_000;

/// Default number of sample rows captured per diff direction.
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database connection.
    pub source: ConnectionConfig,

    /// Target database connection. Must support session temp tables.
    pub target: ConnectionConfig,

    /// Diff behavior configuration.
    pub diff: DiffConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Target-engine support for session temp tables is a static
    /// precondition checked here, before any connection is opened.
    pub fn validate(&self) -> Result<()> {
        match self.source.db_type() {
            DbType::Postgres | DbType::Mysql => {}
            other => {
                return Err(DiffError::Config(format!(
                    "Unsupported source type '{}'. Valid options: postgres, mysql",
                    other
                )));
            }
        }

        match self.target.db_type() {
            DbType::Postgres => {}
            DbType::Oracle => {
                return Err(DiffError::config(
                    "Oracle does not support temporary tables per session before Oracle 18c. \
                     Use a different database provider for the target.",
                ));
            }
            other => {
                return Err(DiffError::Config(format!(
                    "Target type '{}' does not support session temp-table staging. \
                     Valid options: postgres",
                    other
                )));
            }
        }

        if self.diff.tables.is_empty() {
            return Err(DiffError::config("diff.tables must list at least one table"));
        }

        if self.diff.batch_size == 0 {
            return Err(DiffError::config("diff.batch_size must be greater than 0"));
        }

        Ok(())
    }
}

/// Known database engine types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Mysql,
    Oracle,
    Other,
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DbType::Postgres => "postgres",
            DbType::Mysql => "mysql",
            DbType::Oracle => "oracle",
            DbType::Other => "other",
        };
        f.write_str(s)
    }
}

/// Connection configuration for one side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database type ("postgres" or "mysql").
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port. Defaults per engine (5432 / 3306).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(skip_serializing)]
    pub password: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

impl ConnectionConfig {
    /// Normalized engine type.
    pub fn db_type(&self) -> DbType {
        match self.r#type.to_lowercase().as_str() {
            "postgres" | "postgresql" => DbType::Postgres,
            "mysql" | "mariadb" => DbType::Mysql,
            "oracle" => DbType::Oracle,
            _ => DbType::Other,
        }
    }

    /// Effective port, falling back to the engine default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.db_type() {
            DbType::Mysql => 3306,
            _ => 5432,
        })
    }
}

/// Diff behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Tables to compare.
    pub tables: Vec<TableSpec>,

    /// Columns ignored across all tables.
    #[serde(default)]
    pub ignore_all: Vec<String>,

    /// Columns ignored only for a specific table, keyed by table name.
    #[serde(default)]
    pub ignore_cols: HashMap<String, ColumnList>,

    /// Rows per transfer batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sample rows captured per diff direction.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,

    /// Which side's schema defines the staging table.
    #[serde(default)]
    pub alignment: SchemaAlignment,
}

/// Which reflected schema the staging table mirrors.
///
/// The staging table receives source rows either shaped like the target
/// table (the historical behavior) or like the source table itself. Either
/// way the comparison projects the target table's columns, so both sides
/// must agree after exclusions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaAlignment {
    /// Staging mirrors the target table's columns (minus exclusions).
    #[default]
    Target,

    /// Staging mirrors the source table's columns (minus exclusions).
    Source,
}

/// One entry of the table list: a single name used on both sides, or a
/// (source, target) rename pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableSpec {
    /// Same table name on both sides.
    Same(String),

    /// Different names: `[source, target]`.
    Renamed(String, String),
}

impl TableSpec {
    /// Table name on the source side.
    pub fn source_name(&self) -> &str {
        match self {
            TableSpec::Same(name) => name,
            TableSpec::Renamed(source, _) => source,
        }
    }

    /// Table name on the target side.
    pub fn target_name(&self) -> &str {
        match self {
            TableSpec::Same(name) => name,
            TableSpec::Renamed(_, target) => target,
        }
    }

    /// Whether a per-table ignore key addresses this pair.
    ///
    /// A key matches when it equals either side's name.
    pub fn matches_key(&self, key: &str) -> bool {
        key == self.source_name() || key == self.target_name()
    }

    /// Label for progress and error messages.
    pub fn label(&self) -> String {
        match self {
            TableSpec::Same(name) => name.clone(),
            TableSpec::Renamed(source, target) => format!("{} -> {}", source, target),
        }
    }
}

/// Per-table ignore value: a single column name or a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnList {
    /// A single column name.
    One(String),

    /// Several column names.
    Many(Vec<String>),
}

impl ColumnList {
    /// Iterate the column names regardless of shape.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            ColumnList::One(name) => std::slice::from_ref(name),
            ColumnList::Many(names) => names.as_slice(),
        }
        .iter()
        .map(String::as_str)
    }
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_sample_rows() -> usize {
    DEFAULT_SAMPLE_ROWS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_yaml(source_type: &str, target_type: &str) -> String {
        format!(
            r#"
source:
  type: {source_type}
  host: src.example.com
  database: shop
  user: reader
  password: s3cret
target:
  type: {target_type}
  host: dst.example.com
  database: shop
  user: writer
  password: s3cret
diff:
  tables:
    - orders
    - [legacy_customers, customers]
  ignore_all: [updated_at]
  ignore_cols:
    orders: note
    customers: [created_by, modified_by]
"#
        )
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = serde_yaml::from_str(&base_yaml("mysql", "postgres")).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.db_type(), DbType::Mysql);
        assert_eq!(config.source.effective_port(), 3306);
        assert_eq!(config.target.effective_port(), 5432);
        assert_eq!(config.diff.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.diff.sample_rows, DEFAULT_SAMPLE_ROWS);
        assert_eq!(config.diff.alignment, SchemaAlignment::Target);

        assert_eq!(config.diff.tables.len(), 2);
        assert_eq!(config.diff.tables[0], TableSpec::Same("orders".into()));
        assert_eq!(
            config.diff.tables[1],
            TableSpec::Renamed("legacy_customers".into(), "customers".into())
        );

        assert_eq!(
            config.diff.ignore_cols.get("orders"),
            Some(&ColumnList::One("note".into()))
        );
        assert_eq!(
            config.diff.ignore_cols.get("customers"),
            Some(&ColumnList::Many(vec![
                "created_by".into(),
                "modified_by".into()
            ]))
        );
    }

    #[test]
    fn test_oracle_target_rejected() {
        let config: Config = serde_yaml::from_str(&base_yaml("postgres", "oracle")).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Oracle"));
        assert!(err.is_run_fatal());
    }

    #[test]
    fn test_mysql_target_rejected() {
        let config: Config = serde_yaml::from_str(&base_yaml("postgres", "mysql")).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("staging"));
    }

    #[test]
    fn test_unknown_source_rejected() {
        let config: Config = serde_yaml::from_str(&base_yaml("sqlite", "postgres")).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_tables_rejected() {
        let mut config: Config = serde_yaml::from_str(&base_yaml("mysql", "postgres")).unwrap();
        config.diff.tables.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config: Config = serde_yaml::from_str(&base_yaml("mysql", "postgres")).unwrap();
        config.diff.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_table_spec_rejected() {
        // Three-element entries fit neither TableSpec shape.
        let yaml = base_yaml("mysql", "postgres")
            .replace("[legacy_customers, customers]", "[a, b, c]");
        assert!(serde_yaml::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn test_table_spec_accessors() {
        let same = TableSpec::Same("orders".into());
        assert_eq!(same.source_name(), "orders");
        assert_eq!(same.target_name(), "orders");
        assert!(same.matches_key("orders"));
        assert!(!same.matches_key("customers"));

        let renamed = TableSpec::Renamed("legacy_orders".into(), "orders_v2".into());
        assert_eq!(renamed.source_name(), "legacy_orders");
        assert_eq!(renamed.target_name(), "orders_v2");
        assert!(renamed.matches_key("legacy_orders"));
        assert!(renamed.matches_key("orders_v2"));
        assert!(!renamed.matches_key("orders"));
        assert_eq!(renamed.label(), "legacy_orders -> orders_v2");
    }

    #[test]
    fn test_password_not_serialized() {
        let config: Config = serde_yaml::from_str(&base_yaml("mysql", "postgres")).unwrap();
        let json = serde_json::to_string(&config.source).unwrap();
        assert!(!json.contains("s3cret"), "Password was serialized: {}", json);
    }

    #[test]
    fn test_alignment_parsing() {
        let yaml = base_yaml("mysql", "postgres").replace(
            "ignore_all: [updated_at]",
            "ignore_all: [updated_at]\n  alignment: source",
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.diff.alignment, SchemaAlignment::Source);
    }
}
