//! PostgreSQL target writer implementation.
//!
//! Hosts the staging temp table, the batch inserts, and the EXCEPT diff
//! queries. Everything runs on one connection so the session-scoped staging
//! table stays visible, and each pair's work happens inside one transaction
//! with `ON COMMIT DROP` disposing of the staging table at commit.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio_postgres::types::ToSql;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::core::identifier::{quote_pg, QualifiedName};
use crate::core::schema::TableSchema;
use crate::core::traits::{Projection, Relation, TargetWriter};
use crate::core::value::{SqlNullType, SqlValue};
use crate::error::{DiffError, Result};
use crate::staging::StagingTable;

use super::{connect, convert_pg_row_value, reflect_columns};

/// PostgreSQL wire protocol caps statements at u16::MAX bind parameters.
const MAX_PARAMS_PER_STATEMENT: usize = 65_535;

/// PostgreSQL target writer over a single connection.
pub struct PostgresWriter {
    client: tokio_postgres::Client,
    host: String,
}

impl PostgresWriter {
    /// Create a new PostgreSQL writer from configuration.
    pub async fn new(config: &ConnectionConfig) -> Result<Self> {
        let client = connect(config, "connecting PostgreSQL target").await?;
        Ok(Self {
            client,
            host: config.host.clone(),
        })
    }

    fn render_relation(relation: &Relation) -> Result<String> {
        match relation {
            Relation::Table(name) => name.quote_pg(),
            Relation::Staging(name) => quote_pg(name),
        }
    }

    fn render_select(projection: &Projection) -> Result<String> {
        let cols = projection
            .columns
            .iter()
            .map(|c| quote_pg(&c.name))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        Ok(format!(
            "SELECT {} FROM {}",
            cols,
            Self::render_relation(&projection.relation)?
        ))
    }
}

#[async_trait]
impl TargetWriter for PostgresWriter {
    async fn reflect_table(&self, name: &QualifiedName) -> Result<TableSchema> {
        reflect_columns(&self.client, name, &self.host).await
    }

    async fn begin_pair(&self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit_pair(&self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback_pair(&self) {
        if let Err(e) = self.client.batch_execute("ROLLBACK").await {
            warn!("Rollback after failed pair did not complete: {}", e);
        }
    }

    async fn create_staging(&self, staging: &StagingTable) -> Result<()> {
        let ddl = build_staging_ddl(staging)?;
        debug!("Staging DDL: {}", ddl);
        self.client
            .batch_execute(&ddl)
            .await
            .map_err(|e| DiffError::staging(staging.name.clone(), e))?;
        Ok(())
    }

    async fn insert_batch(&self, staging: &StagingTable, rows: Vec<Vec<SqlValue>>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let ncols = staging.columns.len();
        let rows_per_statement = (MAX_PARAMS_PER_STATEMENT / ncols.max(1)).max(1);
        let mut written = 0u64;

        for chunk in rows.chunks(rows_per_statement) {
            let sql = build_insert_sql(staging, chunk.len())?;

            let coerced: Vec<SqlValue> = chunk
                .iter()
                .flat_map(|row| {
                    row.iter()
                        .zip(staging.columns.iter())
                        .map(|(value, col)| coerce_for_type(value.clone(), &col.data_type))
                })
                .collect();
            let params: Vec<&(dyn ToSql + Sync)> = coerced
                .iter()
                .map(|v| v as &(dyn ToSql + Sync))
                .collect();

            written += self.client.execute(&sql, &params).await?;
        }

        Ok(written)
    }

    async fn count_rows(&self, relation: &Relation) -> Result<i64> {
        let query = format!(
            "SELECT COUNT(*)::int8 FROM {}",
            Self::render_relation(relation)?
        );
        let row = self.client.query_one(&query, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn except_diff(
        &self,
        left: &Projection,
        right: &Projection,
        sample_limit: usize,
    ) -> Result<(i64, Vec<Vec<SqlValue>>)> {
        let left_select = Self::render_select(left)?;
        let right_select = Self::render_select(right)?;

        let count_sql = format!(
            "SELECT COUNT(*)::int8 FROM (({}) EXCEPT ({})) AS diff",
            left_select, right_select
        );
        debug!("Diff count query: {}", count_sql);
        let count: i64 = self.client.query_one(&count_sql, &[]).await?.get(0);

        let sample_sql = format!(
            "({}) EXCEPT ({}) LIMIT {}",
            left_select, right_select, sample_limit
        );
        let rows = self.client.query(&sample_sql, &[]).await?;

        let samples = rows
            .iter()
            .map(|row| {
                left.columns
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        convert_pg_row_value(row, idx, staging_type(&col.data_type))
                    })
                    .collect()
            })
            .collect();

        Ok((count, samples))
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

/// Render the staging temp-table DDL.
///
/// `ON COMMIT DROP` ties the staging table's lifetime to the pair
/// transaction.
pub(crate) fn build_staging_ddl(staging: &StagingTable) -> Result<String> {
    let cols = staging
        .columns
        .iter()
        .map(|c| Ok(format!("{} {}", quote_pg(&c.name)?, staging_type(&c.data_type))))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    Ok(format!(
        "CREATE TEMP TABLE {} ({}) ON COMMIT DROP",
        quote_pg(&staging.name)?,
        cols
    ))
}

/// Render a multi-row parameterized INSERT for `row_count` rows.
pub(crate) fn build_insert_sql(staging: &StagingTable, row_count: usize) -> Result<String> {
    let col_list = staging
        .columns
        .iter()
        .map(|c| quote_pg(&c.name))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let ncols = staging.columns.len();
    let mut values = Vec::with_capacity(row_count);
    for row in 0..row_count {
        let placeholders: Vec<String> = (0..ncols)
            .map(|col| format!("${}", row * ncols + col + 1))
            .collect();
        values.push(format!("({})", placeholders.join(", ")));
    }

    Ok(format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_pg(&staging.name)?,
        col_list,
        values.join(", ")
    ))
}

/// Normalize a reflected type name to a PostgreSQL type usable in staging
/// DDL. PostgreSQL udt names pass through; common MySQL catalog names map to
/// their PostgreSQL equivalents (needed when staging mirrors a MySQL source
/// schema).
pub(crate) fn staging_type(data_type: &str) -> &str {
    match data_type.to_lowercase().as_str() {
        "tinyint" | "smallint" | "int2" => "int2",
        "mediumint" | "int" | "integer" | "int4" => "int4",
        "bigint" | "int8" => "int8",
        "float" | "float4" | "real" => "float4",
        "double" | "float8" | "double precision" => "float8",
        "decimal" | "numeric" => "numeric",
        "bool" | "boolean" => "bool",
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum"
        | "set" | "bpchar" | "name" => "text",
        "datetime" | "timestamp" => "timestamp",
        "timestamptz" => "timestamptz",
        "date" => "date",
        "time" => "time",
        "year" => "int2",
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" | "bit"
        | "bytea" => "bytea",
        "json" | "jsonb" => "jsonb",
        "uuid" => "uuid",
        _ => "text",
    }
}

/// Widen a value to fit the staging column's PostgreSQL type.
///
/// Cross-engine reads can produce narrower Rust types than the staging
/// column declares (a MySQL INT landing in a bigint column); the binary
/// protocol is strict about widths, so widen before binding.
fn coerce_for_type(value: SqlValue, data_type: &str) -> SqlValue {
    match staging_type(data_type) {
        "int4" => match value {
            SqlValue::I16(v) => SqlValue::I32(i32::from(v)),
            other => other,
        },
        "int8" => match value {
            SqlValue::I16(v) => SqlValue::I64(i64::from(v)),
            SqlValue::I32(v) => SqlValue::I64(i64::from(v)),
            other => other,
        },
        "float8" => match value {
            SqlValue::F32(v) => SqlValue::F64(f64::from(v)),
            other => other,
        },
        "numeric" => match value {
            SqlValue::I16(v) => SqlValue::Decimal(Decimal::from(v)),
            SqlValue::I32(v) => SqlValue::Decimal(Decimal::from(v)),
            SqlValue::I64(v) => SqlValue::Decimal(Decimal::from(v)),
            other => other,
        },
        "text" => match value {
            SqlValue::Null(_) => SqlValue::Null(SqlNullType::Text),
            SqlValue::Text(v) => SqlValue::Text(v),
            SqlValue::I16(v) => SqlValue::Text(v.to_string()),
            SqlValue::I32(v) => SqlValue::Text(v.to_string()),
            SqlValue::I64(v) => SqlValue::Text(v.to_string()),
            SqlValue::Decimal(v) => SqlValue::Text(v.to_string()),
            SqlValue::Uuid(v) => SqlValue::Text(v.to_string()),
            other => other,
        },
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Column;

    fn staging() -> StagingTable {
        StagingTable {
            name: "orders_staged".to_string(),
            columns: vec![
                Column::new("id", "int4"),
                Column::new("amount", "numeric"),
                Column::new("note", "text"),
            ],
        }
    }

    #[test]
    fn test_build_staging_ddl() {
        let ddl = build_staging_ddl(&staging()).unwrap();
        assert_eq!(
            ddl,
            "CREATE TEMP TABLE \"orders_staged\" (\"id\" int4, \"amount\" numeric, \
             \"note\" text) ON COMMIT DROP"
        );
    }

    #[test]
    fn test_build_staging_ddl_maps_mysql_types() {
        let staging = StagingTable {
            name: "events_staged".to_string(),
            columns: vec![
                Column::new("id", "bigint"),
                Column::new("kind", "enum"),
                Column::new("seen_at", "datetime"),
            ],
        };
        let ddl = build_staging_ddl(&staging).unwrap();
        assert!(ddl.contains("\"id\" int8"));
        assert!(ddl.contains("\"kind\" text"));
        assert!(ddl.contains("\"seen_at\" timestamp"));
    }

    #[test]
    fn test_build_insert_sql_placeholders() {
        let sql = build_insert_sql(&staging(), 2).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"orders_staged\" (\"id\", \"amount\", \"note\") \
             VALUES ($1, $2, $3), ($4, $5, $6)"
        );
    }

    #[test]
    fn test_render_select_for_table_and_staging() {
        let projection = Projection::new(
            Relation::Table(QualifiedName::parse("sales.orders").unwrap()),
            vec![Column::new("id", "int4")],
        );
        assert_eq!(
            PostgresWriter::render_select(&projection).unwrap(),
            "SELECT \"id\" FROM \"sales\".\"orders\""
        );

        let projection = Projection::new(
            Relation::Staging("orders_staged".to_string()),
            vec![Column::new("id", "int4"), Column::new("amount", "int4")],
        );
        assert_eq!(
            PostgresWriter::render_select(&projection).unwrap(),
            "SELECT \"id\", \"amount\" FROM \"orders_staged\""
        );
    }

    #[test]
    fn test_coerce_widens_integers() {
        assert_eq!(
            coerce_for_type(SqlValue::I32(7), "bigint"),
            SqlValue::I64(7)
        );
        assert_eq!(
            coerce_for_type(SqlValue::I16(7), "int4"),
            SqlValue::I32(7)
        );
        assert_eq!(
            coerce_for_type(SqlValue::F32(1.5), "double"),
            SqlValue::F64(1.5)
        );
        // Already-wide values pass through.
        assert_eq!(
            coerce_for_type(SqlValue::I64(7), "int8"),
            SqlValue::I64(7)
        );
    }

    #[test]
    fn test_staging_type_passthrough_and_fallback() {
        assert_eq!(staging_type("int4"), "int4");
        assert_eq!(staging_type("varchar"), "text");
        assert_eq!(staging_type("something_exotic"), "text");
    }
}
