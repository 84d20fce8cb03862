//! Schema Snapshot Module
//!
//! Point-in-time captures of one schema's tables, columns and table
//! statistics. This module provides:
//! - Schema snapshots built from catalog frames
//! - The set-based diff engine (comparing two snapshots)
//! - The metadata cache keyed by (environment, schema)

pub mod diff;
pub mod store;

pub use diff::{CompareMetrics, DiffEngine, NameDiff, TableDiff};
pub use store::{CacheKey, MetadataCache};

use crate::metadata::frame::{Cell, MetadataFrame};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Statistics for one table from `information_schema.tables`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    /// None when the stats query carried no UPDATE_TIME column at all
    pub last_update: Option<Cell>,
    pub created: Option<Cell>,
    pub rows: i64,
    pub data_size: i64,
    pub index_size: i64,
}

impl TableInfo {
    pub fn total_size(&self) -> i64 {
        self.data_size.max(0) + self.index_size.max(0)
    }
}

/// Complete schema snapshot at a point in time
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub schema: String,
    pub tables: Vec<String>,
    pub columns: BTreeMap<String, Vec<String>>,
    pub table_info: BTreeMap<String, TableInfo>,
    pub captured_at: DateTime<Utc>,
    pub checksum: String,
}

impl SchemaSnapshot {
    /// Snapshot with only table and column names
    pub fn new(
        schema: impl Into<String>,
        tables: Vec<String>,
        columns: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self::with_info(schema, tables, columns, BTreeMap::new())
    }

    pub fn with_info(
        schema: impl Into<String>,
        tables: Vec<String>,
        columns: BTreeMap<String, Vec<String>>,
        table_info: BTreeMap<String, TableInfo>,
    ) -> Self {
        let checksum = Self::compute_checksum(&tables, &columns);
        Self {
            schema: schema.into(),
            tables,
            columns,
            table_info,
            captured_at: Utc::now(),
            checksum,
        }
    }

    /// The degraded snapshot used when loading fails
    pub fn empty(schema: impl Into<String>) -> Self {
        Self::new(schema, Vec::new(), BTreeMap::new())
    }

    /// Build a snapshot from the table-stats frame (table name in the first
    /// column) and the (table, column) frame
    pub fn from_frames(schema: &str, stats: &MetadataFrame, columns: &MetadataFrame) -> Self {
        let update_idx = stats.column_index("UPDATE_TIME");
        let create_idx = stats.column_index("CREATE_TIME");
        let rows_idx = stats.column_index("TABLE_ROWS");
        let data_idx = stats.column_index("DATA_LENGTH");
        let index_idx = stats.column_index("INDEX_LENGTH");
        let int_at = |r: usize, idx: Option<usize>| {
            idx.and_then(|i| stats.cell(r, i).as_i64()).unwrap_or(0)
        };

        let mut tables = Vec::with_capacity(stats.len());
        let mut table_info = BTreeMap::new();
        for r in 0..stats.len() {
            let Some(table) = stats.cell(r, 0).as_text() else {
                continue;
            };
            table_info.insert(
                table.clone(),
                TableInfo {
                    last_update: update_idx.map(|i| stats.cell(r, i).clone()),
                    created: create_idx.map(|i| stats.cell(r, i).clone()),
                    rows: int_at(r, rows_idx),
                    data_size: int_at(r, data_idx),
                    index_size: int_at(r, index_idx),
                },
            );
            tables.push(table);
        }

        let mut by_table: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if columns.headers.len() >= 2 {
            for r in 0..columns.len() {
                if let (Some(t), Some(c)) = (columns.cell(r, 0).as_text(), columns.cell(r, 1).as_text()) {
                    by_table.entry(t).or_default().push(c);
                }
            }
        }
        let column_map = tables
            .iter()
            .map(|t| (t.clone(), by_table.remove(t).unwrap_or_default()))
            .collect();

        Self::with_info(schema, tables, column_map, table_info)
    }

    /// Compute checksum from table and column names
    pub fn compute_checksum(tables: &[String], columns: &BTreeMap<String, Vec<String>>) -> String {
        let mut hasher = Sha256::new();

        let mut sorted: Vec<&String> = tables.iter().collect();
        sorted.sort();
        for t in sorted {
            hasher.update(t.as_bytes());
            if let Some(cols) = columns.get(t) {
                for c in cols {
                    hasher.update(format!("{}.{}", t, c).as_bytes());
                }
            }
        }

        format!("{:x}", hasher.finalize())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn columns_of(&self, table: &str) -> &[String] {
        self.columns.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sum of data and index bytes over every table
    pub fn total_size(&self) -> i64 {
        self.table_info.values().map(TableInfo::total_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_checksum_consistency() {
        let columns: BTreeMap<_, _> = [("users".to_string(), vec!["id".to_string()])].into_iter().collect();
        let a = SchemaSnapshot::compute_checksum(&["users".to_string()], &columns);
        let b = SchemaSnapshot::compute_checksum(&["users".to_string()], &columns);
        assert_eq!(a, b);
        assert_ne!(a, SchemaSnapshot::compute_checksum(&[], &BTreeMap::new()));
    }

    #[test]
    fn test_from_frames_reads_stats_and_columns() {
        let stats = MetadataFrame::from_rows(
            &["TABLE_NAME", "UPDATE_TIME", "CREATE_TIME", "TABLE_ROWS", "DATA_LENGTH", "INDEX_LENGTH"],
            vec![
                vec![Cell::from("orders"), Cell::from("2024-05-01 10:00:00"), Cell::Null, Cell::Int(10), Cell::Int(2048), Cell::Int(1024)],
                vec![Cell::from("users"), Cell::Null, Cell::Null, Cell::Null, Cell::Int(0), Cell::Int(0)],
            ],
        );
        let cols = MetadataFrame::from_rows(
            &["TABLE_NAME", "COLUMN_NAME"],
            vec![vec!["orders", "id"], vec!["orders", "user_id"], vec!["users", "id"]],
        );

        let snapshot = SchemaSnapshot::from_frames("app", &stats, &cols);
        assert_eq!(snapshot.tables, vec!["orders", "users"]);
        assert_eq!(snapshot.columns_of("orders"), &["id".to_string(), "user_id".to_string()]);
        let orders = &snapshot.table_info["orders"];
        assert_eq!(orders.total_size(), 3072);
        assert_eq!(orders.rows, 10);
        assert_eq!(snapshot.table_info["users"].last_update, Some(Cell::Null));
        assert_eq!(snapshot.total_size(), 3072);
    }

    #[test]
    fn test_from_frames_without_update_time_column() {
        let stats = MetadataFrame::from_rows(&["TABLE_NAME"], vec![vec!["orders"]]);
        let snapshot = SchemaSnapshot::from_frames("app", &stats, &MetadataFrame::default());
        assert_eq!(snapshot.table_info["orders"].last_update, None);
        assert!(snapshot.columns_of("orders").is_empty());
    }
}
