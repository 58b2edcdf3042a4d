//! Staging table derivation.
//!
//! The staging table is a session-scoped temp table in the target database
//! that receives the filtered copy of the source rows. Its definition is
//! derived from the alignment-side schema with excluded columns removed,
//! preserving column order and types.

use std::collections::BTreeSet;

use crate::config::SchemaAlignment;
use crate::core::schema::{Column, TableSchema};
use crate::core::QualifiedName;
use crate::error::{DiffError, Result};

/// Definition of a staging table before and after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingTable {
    /// Staging table name, derived deterministically from the naming seed.
    pub name: String,

    /// Retained columns, in alignment-side order with alignment-side types.
    pub columns: Vec<Column>,
}

impl StagingTable {
    /// Derive the staging definition for one pair.
    ///
    /// `aligned` is the schema whose columns define the staging table
    /// (the target table's for [`SchemaAlignment::Target`], the source
    /// table's for [`SchemaAlignment::Source`]); `seed` is the source bare
    /// table name, keeping the staging name recognizable in the target
    /// session.
    pub fn derive(
        aligned: &TableSchema,
        excluded: &BTreeSet<String>,
        seed: &QualifiedName,
    ) -> Result<Self> {
        let columns = aligned.projection(excluded);
        if columns.is_empty() {
            return Err(DiffError::staging(
                aligned.display_name(),
                "no columns remain after exclusions",
            ));
        }

        Ok(Self {
            name: format!("{}_staged", seed.table),
            columns,
        })
    }

    /// Pick the alignment-side schema for [`derive`](Self::derive).
    pub fn alignment_side<'a>(
        alignment: SchemaAlignment,
        source: &'a TableSchema,
        target: &'a TableSchema,
    ) -> &'a TableSchema {
        match alignment {
            SchemaAlignment::Target => target,
            SchemaAlignment::Source => source,
        }
    }

    /// Column names in staging order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
