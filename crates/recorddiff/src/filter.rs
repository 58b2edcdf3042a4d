//! Column exclusion computation.
//!
//! Merges the global ignore list with per-table ignore entries into the
//! exclusion set used for both staging-table construction and the diff
//! projections. Names are case-folded so configuration casing never has to
//! match catalog casing.

use std::collections::{BTreeSet, HashMap};

use crate::config::{ColumnList, TableSpec};

/// Compute the exclusion set for one table pair.
///
/// The result is the union of the global ignore list and every per-table
/// entry whose key equals either name carried by `spec`. A `BTreeSet` keeps
/// the set deduplicated and deterministically ordered.
pub fn exclusions(
    ignore_all: &[String],
    ignore_cols: &HashMap<String, ColumnList>,
    spec: &TableSpec,
) -> BTreeSet<String> {
    let mut excluded: BTreeSet<String> =
        ignore_all.iter().map(|c| c.to_lowercase()).collect();

    for (key, columns) in ignore_cols {
        if spec.matches_key(key) {
            excluded.extend(columns.iter().map(str::to_lowercase));
        }
    }

    excluded
}
