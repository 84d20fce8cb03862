//! Tabular reports that accompany a generated diagram: grouped keys, table
//! sizes, and per-snapshot activity statistics.

use super::filter::{classify, EnumTablePolicy};
use super::format::{format_thousands, gigabytes, megabytes, timestamp_prefix};
use crate::metadata::normalizer::{ForeignKeyRecord, PrimaryKeyRecord};
use crate::snapshot::SchemaSnapshot;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyKind {
    Single,
    Composite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKeyGroup {
    pub schema: String,
    pub table: String,
    /// Ordered by ordinal position when present
    pub columns: Vec<String>,
    pub kind: KeyKind,
}

/// Group primary-key rows per (schema, table)
pub fn group_primary_keys(rows: &[PrimaryKeyRecord]) -> Vec<PrimaryKeyGroup> {
    let mut groups: BTreeMap<(&str, &str), Vec<&PrimaryKeyRecord>> = BTreeMap::new();
    for row in rows {
        groups
            .entry((row.schema.as_str(), row.table.as_str()))
            .or_default()
            .push(row);
    }

    groups
        .into_iter()
        .map(|((schema, table), mut members)| {
            // Stable sort keeps input order for rows without an ordinal
            members.sort_by_key(|r| r.ordinal.unwrap_or(i64::MAX));
            let columns: Vec<String> = members.iter().map(|r| r.column.clone()).collect();
            PrimaryKeyGroup {
                schema: schema.to_string(),
                table: table.to_string(),
                kind: if columns.len() > 1 { KeyKind::Composite } else { KeyKind::Single },
                columns,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyGroup {
    pub constraint_name: String,
    pub child_table: String,
    pub parent_table: String,
    pub child_columns: Vec<String>,
    pub parent_columns: Vec<String>,
}

/// Group foreign-key rows by constraint name. The first row of a constraint
/// decides its child and parent tables.
pub fn group_foreign_keys(rows: &[ForeignKeyRecord]) -> Vec<ForeignKeyGroup> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, ForeignKeyGroup> = HashMap::new();

    for row in rows {
        let group = groups.entry(row.constraint_name.as_str()).or_insert_with(|| {
            order.push(row.constraint_name.as_str());
            ForeignKeyGroup {
                constraint_name: row.constraint_name.clone(),
                child_table: row.child_ref().qualified(),
                parent_table: row.parent_ref().qualified(),
                child_columns: Vec::new(),
                parent_columns: Vec::new(),
            }
        });
        group.child_columns.push(row.child_column.clone());
        group.parent_columns.push(row.parent_column.clone());
    }

    order.sort_unstable();
    order.into_iter().filter_map(|name| groups.remove(name)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSizeRow {
    pub schema: String,
    pub table: String,
    pub rows: String,
    pub data_mb: f64,
    pub index_mb: f64,
    pub total_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSize {
    pub schema: String,
    pub size_gb: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeReport {
    /// Tables with non-zero size, largest first
    pub tables: Vec<TableSizeRow>,
    pub schemas: Vec<SchemaSize>,
    pub total_gb: f64,
}

/// Size report across the snapshots of a selection
pub fn size_report<'a, I>(snapshots: I) -> SizeReport
where
    I: IntoIterator<Item = &'a SchemaSnapshot>,
{
    let mut report = SizeReport::default();
    let mut total_bytes = 0i64;

    for snapshot in snapshots {
        let schema_bytes = snapshot.total_size();
        total_bytes += schema_bytes;
        report.schemas.push(SchemaSize {
            schema: snapshot.schema.clone(),
            size_gb: gigabytes(schema_bytes),
        });

        for (table, info) in &snapshot.table_info {
            if info.total_size() <= 0 {
                continue;
            }
            report.tables.push(TableSizeRow {
                schema: snapshot.schema.clone(),
                table: table.clone(),
                rows: format_thousands(info.rows),
                data_mb: megabytes(info.data_size),
                index_mb: megabytes(info.index_size),
                total_mb: megabytes(info.total_size()),
            });
        }
    }

    report
        .tables
        .sort_by(|a, b| b.total_mb.total_cmp(&a.total_mb).then_with(|| a.table.cmp(&b.table)));
    report.total_gb = gigabytes(total_bytes);
    report
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableActivity {
    pub active: Vec<String>,
    pub unused: Vec<String>,
}

/// Split a snapshot's tables with the unused-table classifier, sorted
pub fn categorize(policy: &EnumTablePolicy, snapshot: &SchemaSnapshot) -> TableActivity {
    let mut activity = TableActivity::default();
    for table in &snapshot.tables {
        if classify(policy, table, snapshot.table_info.get(table)).is_kept() {
            activity.active.push(table.clone());
        } else {
            activity.unused.push(table.clone());
        }
    }
    activity.active.sort();
    activity.unused.sort();
    activity
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatRow {
    pub table: String,
    pub rows: String,
    pub size_mb: f64,
    pub last_updated: String,
    pub created: String,
}

/// One statistics row per table, in snapshot order
pub fn table_stats(snapshot: &SchemaSnapshot) -> Vec<TableStatRow> {
    snapshot
        .tables
        .iter()
        .map(|table| {
            let info = snapshot.table_info.get(table);
            TableStatRow {
                table: table.clone(),
                rows: format_thousands(info.map(|i| i.rows).unwrap_or(0)),
                size_mb: megabytes(info.map(|i| i.total_size()).unwrap_or(0)),
                last_updated: timestamp_prefix(info.and_then(|i| i.last_update.as_ref())),
                created: timestamp_prefix(info.and_then(|i| i.created.as_ref())),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Cell;
    use crate::snapshot::TableInfo;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    const MB: i64 = 1024 * 1024;

    fn pk(table: &str, column: &str, ordinal: Option<i64>) -> PrimaryKeyRecord {
        PrimaryKeyRecord {
            schema: "app".into(),
            table: table.into(),
            column: column.into(),
            ordinal,
        }
    }

    fn snapshot() -> SchemaSnapshot {
        let tables = vec!["orders".to_string(), "order_status".to_string(), "legacy".to_string()];
        let mut info = BTreeMap::new();
        info.insert(
            "orders".to_string(),
            TableInfo {
                last_update: Some(Cell::from("2024-06-01 12:00:00")),
                created: Some(Cell::from("2020-01-01 00:00:00.000")),
                rows: 5000,
                data_size: 30 * MB,
                index_size: 10 * MB,
            },
        );
        info.insert(
            "legacy".to_string(),
            TableInfo {
                last_update: None,
                created: None,
                rows: 10,
                data_size: 2 * MB,
                index_size: 0,
            },
        );
        info.insert("order_status".to_string(), TableInfo::default());
        SchemaSnapshot::with_info("app", tables, BTreeMap::new(), info)
    }

    #[test]
    fn test_primary_keys_ordered_by_ordinal() {
        let groups = group_primary_keys(&[
            pk("order_lines", "line_no", Some(2)),
            pk("users", "id", Some(1)),
            pk("order_lines", "order_id", Some(1)),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].table, "order_lines");
        assert_eq!(groups[0].columns, vec!["order_id", "line_no"]);
        assert_eq!(groups[0].kind, KeyKind::Composite);
        assert_eq!(groups[1].kind, KeyKind::Single);
    }

    #[test]
    fn test_foreign_keys_grouped_by_constraint() {
        let fk = |name: &str, child_col: &str, parent_col: &str| ForeignKeyRecord {
            constraint_name: name.into(),
            child_schema: "app".into(),
            child_table: "order_lines".into(),
            child_column: child_col.into(),
            parent_schema: "app".into(),
            parent_table: "orders".into(),
            parent_column: parent_col.into(),
        };
        let groups = group_foreign_keys(&[
            fk("fk_b", "order_id", "id"),
            fk("fk_a", "x", "y"),
            fk("fk_b", "shop_id", "shop_id"),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].constraint_name, "fk_a");
        assert_eq!(groups[1].child_columns, vec!["order_id", "shop_id"]);
        assert_eq!(groups[1].parent_columns, vec!["id", "shop_id"]);
        assert_eq!(groups[1].child_table, "app.order_lines");
    }

    #[test]
    fn test_size_report_skips_empty_and_sorts_descending() {
        let snap = snapshot();
        let report = size_report([&snap]);
        let tables: Vec<&str> = report.tables.iter().map(|r| r.table.as_str()).collect();
        assert_eq!(tables, vec!["orders", "legacy"]);
        assert_eq!(report.tables[0].total_mb, 40.0);
        assert_eq!(report.tables[0].rows, "5,000");
        assert_eq!(report.schemas[0].schema, "app");
        assert_eq!(report.total_gb, 0.04);
    }

    #[test]
    fn test_categorize_matches_filter() {
        let activity = categorize(&EnumTablePolicy::default(), &snapshot());
        assert_eq!(activity.active, vec!["order_status", "orders"]);
        assert_eq!(activity.unused, vec!["legacy"]);
    }

    #[test]
    fn test_activity_policy_keeps_attribute_tables() {
        let tables = vec!["equipment_attribute".to_string(), "legacy".to_string()];
        let snap = SchemaSnapshot::with_info("app", tables, BTreeMap::new(), BTreeMap::new());

        let erd = categorize(&EnumTablePolicy::default(), &snap);
        assert_eq!(erd.unused, vec!["equipment_attribute", "legacy"]);

        let policy = EnumTablePolicy::default().extended(crate::erd::ACTIVITY_EXTRA_KEYWORDS);
        let activity = categorize(&policy, &snap);
        assert_eq!(activity.active, vec!["equipment_attribute"]);
        assert_eq!(activity.unused, vec!["legacy"]);
    }

    #[test]
    fn test_table_stats_truncates_timestamps() {
        let rows = table_stats(&snapshot());
        assert_eq!(rows[0].table, "orders");
        assert_eq!(rows[0].created, "2020-01-01 00:00:00");
        assert_eq!(rows[0].size_mb, 40.0);
        assert_eq!(rows[2].last_updated, "Unknown");
    }
}
