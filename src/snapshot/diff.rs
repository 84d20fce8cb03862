//! Schema Diff Engine
//!
//! Compares two independently loaded snapshots as sets: which tables exist
//! on one side only, and for shared tables which column names differ.
//! Column attributes (type, nullability) are not compared.

use super::SchemaSnapshot;
use serde::Serialize;
use std::collections::BTreeSet;

/// Set difference between two name lists, each side sorted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameDiff {
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    pub common: Vec<String>,
}

impl NameDiff {
    pub fn between<'a, A, B>(a: A, b: B) -> Self
    where
        A: IntoIterator<Item = &'a String>,
        B: IntoIterator<Item = &'a String>,
    {
        let a: BTreeSet<&String> = a.into_iter().collect();
        let b: BTreeSet<&String> = b.into_iter().collect();
        Self {
            only_in_a: a.difference(&b).map(|s| s.to_string()).collect(),
            only_in_b: b.difference(&a).map(|s| s.to_string()).collect(),
            common: a.intersection(&b).map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_identical(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty()
    }
}

/// Column differences for one table present in both snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDiff {
    pub table: String,
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    pub common_count: usize,
}

/// Complete table/column diff result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDiff {
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    pub common: Vec<String>,
    /// Only tables whose column sets differ, in table order
    pub column_diffs: Vec<ColumnDiff>,
}

/// Summary figures for a diff
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareMetrics {
    pub common_tables: usize,
    pub tables_with_differences: usize,
    pub tables_identical: usize,
    /// Percentage of common tables with identical columns, one decimal
    pub match_rate: f64,
}

impl TableDiff {
    pub fn metrics(&self) -> CompareMetrics {
        let common = self.common.len();
        let differing = self.column_diffs.len();
        let identical = common - differing;
        let match_rate = if common == 0 {
            0.0
        } else {
            (identical as f64 / common as f64 * 1000.0).round() / 10.0
        };
        CompareMetrics {
            common_tables: common,
            tables_with_differences: differing,
            tables_identical: identical,
            match_rate,
        }
    }

    /// Column diff for a table, if its columns differ
    pub fn column_diff(&self, table: &str) -> Option<&ColumnDiff> {
        self.column_diffs.iter().find(|d| d.table == table)
    }
}

/// The diff engine that compares schema snapshots
pub struct DiffEngine;

impl DiffEngine {
    /// Compare two schema snapshots
    pub fn diff(a: &SchemaSnapshot, b: &SchemaSnapshot) -> TableDiff {
        let tables = NameDiff::between(&a.tables, &b.tables);

        let column_diffs = tables
            .common
            .iter()
            .filter_map(|table| {
                let cols = NameDiff::between(a.columns_of(table), b.columns_of(table));
                if cols.is_identical() {
                    None
                } else {
                    Some(ColumnDiff {
                        table: table.clone(),
                        only_in_a: cols.only_in_a,
                        only_in_b: cols.only_in_b,
                        common_count: cols.common.len(),
                    })
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Diffed {} vs {}: {} only in A, {} only in B, {} common, {} with column changes",
            a.schema,
            b.schema,
            tables.only_in_a.len(),
            tables.only_in_b.len(),
            tables.common.len(),
            column_diffs.len()
        );

        TableDiff {
            only_in_a: tables.only_in_a,
            only_in_b: tables.only_in_b,
            common: tables.common,
            column_diffs,
        }
    }
}
