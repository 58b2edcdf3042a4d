//! Set-difference comparator.
//!
//! With the staged source copy and the target table in the same engine,
//! the diff is two complementary SQL EXCEPT queries executed natively by
//! the target. Duplicate rows collapse per EXCEPT semantics; that is a
//! deliberate simplification, not a bug.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::schema::TableSchema;
use crate::core::traits::{Projection, Relation, TargetWriter};
use crate::core::value::row_to_json;
use crate::error::Result;
use crate::staging::StagingTable;

/// One direction of the diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffDirection {
    /// Number of differing rows.
    pub rows: i64,

    /// Denominator for the percentage: the total row count of the side the
    /// differing rows belong to.
    pub total: i64,

    /// Up to `sample_rows` example rows, keyed by column name. Order is
    /// unspecified.
    pub samples: Vec<serde_json::Value>,
}

impl DiffDirection {
    /// Percentage of differing rows, zero-guarded.
    pub fn percentage(&self) -> f64 {
        if self.total > 0 {
            self.rows as f64 / self.total as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Human-readable `N of M (P%)` summary.
    pub fn summary(&self) -> String {
        format!("{} of {} ({:.1}%)", self.rows, self.total, self.percentage())
    }
}

/// Result of comparing one table pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResult {
    /// Rows present in the live target table but absent from the staged
    /// source copy ("appeared in target since source was captured").
    pub appeared: DiffDirection,

    /// Rows present in the staged source copy but absent from the target
    /// table ("disappeared from target relative to source").
    pub disappeared: DiffDirection,
}

impl DiffResult {
    /// Whether both sides agree completely.
    pub fn is_clean(&self) -> bool {
        self.appeared.rows == 0 && self.disappeared.rows == 0
    }
}

/// Compare the target table against the staged source copy.
///
/// Both queries run in the target engine over the same column projection:
/// the target table's columns minus exclusions on one side, the full staging
/// column list on the other.
pub async fn compare(
    target: &dyn TargetWriter,
    target_schema: &TableSchema,
    staging: &StagingTable,
    excluded: &BTreeSet<String>,
    sample_rows: usize,
) -> Result<DiffResult> {
    let target_projection = Projection::new(
        Relation::Table(target_schema.name.clone()),
        target_schema.projection(excluded),
    );
    let staging_projection = Projection::new(
        Relation::Staging(staging.name.clone()),
        staging.columns.clone(),
    );

    let target_total = target
        .count_rows(&Relation::Table(target_schema.name.clone()))
        .await?;
    let staged_total = target
        .count_rows(&Relation::Staging(staging.name.clone()))
        .await?;

    let (appeared_count, appeared_rows) = target
        .except_diff(&target_projection, &staging_projection, sample_rows)
        .await?;
    let (disappeared_count, disappeared_rows) = target
        .except_diff(&staging_projection, &target_projection, sample_rows)
        .await?;

    let target_names = target_projection.column_names();
    let staging_names = staging_projection.column_names();

    let result = DiffResult {
        appeared: DiffDirection {
            rows: appeared_count,
            total: target_total,
            samples: appeared_rows
                .iter()
                .map(|row| row_to_json(&target_names, row))
                .collect(),
        },
        disappeared: DiffDirection {
            rows: disappeared_count,
            total: staged_total,
            samples: disappeared_rows
                .iter()
                .map(|row| row_to_json(&staging_names, row))
                .collect(),
        },
    };

    Ok(result)
}

/// Log the diff summary the way the console report reads it.
pub fn log_result(source_label: &str, target_label: &str, target_host: &str, result: &DiffResult) {
    info!(
        "{}: {} newly appear in {} ({})",
        target_label,
        result.appeared.rows,
        target_host,
        result.appeared.summary()
    );
    for sample in &result.appeared.samples {
        info!("  {}", sample);
    }

    info!(
        "{}: {} disappear ({})",
        source_label,
        result.disappeared.rows,
        result.disappeared.summary()
    );
    for sample in &result.disappeared.samples {
        info!("  {}", sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::QualifiedName;
    use crate::core::schema::Column;
    use crate::testutil::MockTarget;
    use crate::SqlValue;

    fn orders_schema(name: &str) -> TableSchema {
        TableSchema::new(
            QualifiedName::parse(name).unwrap(),
            vec![
                Column::new("id", "int4"),
                Column::new("amount", "int4"),
                Column::new("note", "text"),
            ],
        )
    }

    fn row(id: i64, amount: i64, note: &str) -> Vec<SqlValue> {
        vec![
            SqlValue::I64(id),
            SqlValue::I64(amount),
            SqlValue::Text(note.to_string()),
        ]
    }

    fn staging_from(schema: &TableSchema, excluded: &BTreeSet<String>) -> StagingTable {
        StagingTable {
            name: "orders_staged".to_string(),
            columns: schema.projection(excluded),
        }
    }

    /// Stage rows into the mock, applying the staging projection.
    fn stage_rows(
        target: &MockTarget,
        staging: &StagingTable,
        source_schema: &TableSchema,
        rows: &[Vec<SqlValue>],
    ) {
        target.register_staging(staging);
        let indices: Vec<usize> = staging
            .columns
            .iter()
            .map(|c| {
                source_schema
                    .columns
                    .iter()
                    .position(|s| s.name.eq_ignore_ascii_case(&c.name))
                    .unwrap()
            })
            .collect();
        let projected: Vec<Vec<SqlValue>> = rows
            .iter()
            .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
            .collect();
        target.stage_rows(&staging.name, projected);
    }

    #[tokio::test]
    async fn test_orders_scenario_no_exclusions() {
        let schema = orders_schema("orders");
        let target_rows = vec![row(1, 10, "a"), row(3, 30, "c")];
        let source_rows = vec![row(1, 10, "a"), row(2, 20, "b")];

        let target = MockTarget::new("dst", vec![(schema.clone(), target_rows)]);
        let excluded = BTreeSet::new();
        let staging = staging_from(&schema, &excluded);
        stage_rows(&target, &staging, &schema, &source_rows);

        let result = compare(&target, &schema, &staging, &excluded, 5)
            .await
            .unwrap();

        assert_eq!(result.appeared.rows, 1);
        assert_eq!(result.appeared.total, 2);
        assert_eq!(
            result.appeared.samples,
            vec![serde_json::json!({"id": 3, "amount": 30, "note": "c"})]
        );

        assert_eq!(result.disappeared.rows, 1);
        assert_eq!(result.disappeared.total, 2);
        assert_eq!(
            result.disappeared.samples,
            vec![serde_json::json!({"id": 2, "amount": 20, "note": "b"})]
        );
        assert!(!result.is_clean());
    }

    #[tokio::test]
    async fn test_orders_scenario_with_note_excluded() {
        let schema = orders_schema("orders");
        let target_rows = vec![row(1, 10, "a"), row(3, 30, "c")];
        let source_rows = vec![row(1, 10, "zzz"), row(2, 20, "b")];

        let target = MockTarget::new("dst", vec![(schema.clone(), target_rows)]);
        let excluded: BTreeSet<String> = ["note".to_string()].into_iter().collect();
        let staging = staging_from(&schema, &excluded);
        stage_rows(&target, &staging, &schema, &source_rows);

        let result = compare(&target, &schema, &staging, &excluded, 5)
            .await
            .unwrap();

        // The note column is absent from the comparison entirely; row 1
        // matches despite differing notes.
        assert_eq!(result.appeared.rows, 1);
        assert_eq!(
            result.appeared.samples,
            vec![serde_json::json!({"id": 3, "amount": 30})]
        );
        assert_eq!(result.disappeared.rows, 1);
        assert_eq!(
            result.disappeared.samples,
            vec![serde_json::json!({"id": 2, "amount": 20})]
        );
    }

    #[tokio::test]
    async fn test_empty_tables_zero_of_zero() {
        let schema = orders_schema("orders");
        let target = MockTarget::new("dst", vec![(schema.clone(), vec![])]);
        let excluded = BTreeSet::new();
        let staging = staging_from(&schema, &excluded);
        stage_rows(&target, &staging, &schema, &[]);

        let result = compare(&target, &schema, &staging, &excluded, 5)
            .await
            .unwrap();

        assert_eq!(result.appeared.summary(), "0 of 0 (0.0%)");
        assert_eq!(result.disappeared.summary(), "0 of 0 (0.0%)");
        assert!(result.is_clean());
    }

    #[tokio::test]
    async fn test_except_collapses_duplicates() {
        let schema = orders_schema("orders");
        // Two identical extra rows in target collapse to one diff row.
        let target_rows = vec![row(1, 10, "a"), row(9, 90, "x"), row(9, 90, "x")];
        let source_rows = vec![row(1, 10, "a")];

        let target = MockTarget::new("dst", vec![(schema.clone(), target_rows)]);
        let excluded = BTreeSet::new();
        let staging = staging_from(&schema, &excluded);
        stage_rows(&target, &staging, &schema, &source_rows);

        let result = compare(&target, &schema, &staging, &excluded, 5)
            .await
            .unwrap();
        assert_eq!(result.appeared.rows, 1);
        assert_eq!(result.appeared.total, 3);
    }

    #[tokio::test]
    async fn test_symmetry_under_swap() {
        let rows_a = vec![row(1, 10, "a"), row(2, 20, "b")];
        let rows_b = vec![row(1, 10, "a"), row(3, 30, "c")];
        let excluded = BTreeSet::new();

        // Direction 1: A as source (staged), B as target.
        let schema_b = orders_schema("b");
        let target1 = MockTarget::new("dst", vec![(schema_b.clone(), rows_b.clone())]);
        let staging1 = staging_from(&schema_b, &excluded);
        stage_rows(&target1, &staging1, &schema_b, &rows_a);
        let result1 = compare(&target1, &schema_b, &staging1, &excluded, 5)
            .await
            .unwrap();

        // Direction 2: B as source (staged), A as target.
        let schema_a = orders_schema("a");
        let target2 = MockTarget::new("dst", vec![(schema_a.clone(), rows_a.clone())]);
        let staging2 = staging_from(&schema_a, &excluded);
        stage_rows(&target2, &staging2, &schema_a, &rows_b);
        let result2 = compare(&target2, &schema_a, &staging2, &excluded, 5)
            .await
            .unwrap();

        // appeared(A,B) equals disappeared(B,A), samples included.
        assert_eq!(result1.appeared.rows, result2.disappeared.rows);
        assert_eq!(result1.appeared.samples, result2.disappeared.samples);
        assert_eq!(result1.disappeared.rows, result2.appeared.rows);
        assert_eq!(result1.disappeared.samples, result2.appeared.samples);
    }

    #[test]
    fn test_percentage_guard() {
        let direction = DiffDirection {
            rows: 0,
            total: 0,
            samples: vec![],
        };
        assert_eq!(direction.percentage(), 0.0);

        let direction = DiffDirection {
            rows: 1,
            total: 4,
            samples: vec![],
        };
        assert!((direction.percentage() - 25.0).abs() < f64::EPSILON);
    }
}
