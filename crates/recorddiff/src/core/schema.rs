//! Reflected schema types for database tables.
//!
//! These types provide a database-agnostic representation of the column
//! metadata resolved from a live catalog, used throughout the diff pipeline.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::identifier::QualifiedName;

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Data type as reported by the catalog (e.g., "int4", "varchar").
    pub data_type: String,
}

impl Column {
    /// Create a column from name and type strings.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Reflected table metadata: a qualified name plus its ordered columns.
///
/// Column names are unique within a schema (the catalog guarantees this);
/// the column order is the catalog's ordinal order and is preserved through
/// staging and comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Qualified table name as resolved.
    pub name: QualifiedName,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Create a schema from a qualified name and columns.
    pub fn new(name: QualifiedName, columns: Vec<Column>) -> Self {
        Self { name, columns }
    }

    /// Get the display name (`schema.table` or `table`).
    pub fn display_name(&self) -> String {
        self.name.display_name()
    }

    /// Columns retained after removing the exclusion set.
    ///
    /// Exclusions are matched case-insensitively; order and types of the
    /// surviving columns are preserved.
    pub fn projection(&self, excluded: &BTreeSet<String>) -> Vec<Column> {
        self.columns
            .iter()
            .filter(|c| !excluded.contains(&c.name.to_lowercase()))
            .cloned()
            .collect()
    }

    /// Look up a column by name, case-insensitively.
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}
