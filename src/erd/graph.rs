//! Graph Builder
//!
//! Turns normalized, filtered metadata into a directed graph: one node per
//! kept table with an HTML-like label, one edge per foreign key pointing
//! from child to parent, optionally clustered by schema.

use super::format::{format_thousands, html_escape};
use crate::metadata::normalizer::{ColumnRecord, ForeignKeyRecord, IndexRecord};
use crate::metadata::{MetadataIndex, NormalizedMetadata, TableRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// How foreign-key rows become edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FkEdgeMode {
    /// One edge per column pair, even within a multi-column constraint
    #[default]
    PerColumn,
    /// One edge per constraint, labelled with the full column mapping
    PerConstraint,
}

/// Rendering switches for a generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GraphOptions {
    pub cluster_by_schema: bool,
    pub show_schema_prefix: bool,
    pub max_columns_per_node: usize,
    pub include_indexes: bool,
    pub include_row_counts: bool,
    pub fk_edge_mode: FkEdgeMode,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            cluster_by_schema: true,
            show_schema_prefix: true,
            max_columns_per_node: 80,
            include_indexes: true,
            include_row_counts: false,
            fk_edge_mode: FkEdgeMode::PerColumn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// "schema.table"
    pub id: String,
    pub schema: String,
    pub table: String,
    /// Graphviz HTML-like table markup
    pub label: String,
    pub column_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub label: String,
    pub constraint_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    pub label: String,
    pub node_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Empty when clustering is off
    pub clusters: Vec<Cluster>,
    /// FK rows dropped because their parent table is not a node
    pub dangling_edges: usize,
}

impl Graph {
    pub fn node_ids(&self) -> HashSet<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }
}

pub struct GraphBuilder;

impl GraphBuilder {
    /// Build the graph. `metadata` must already be restricted to `kept`.
    pub fn build(kept: &[TableRef], metadata: &NormalizedMetadata, options: &GraphOptions) -> Graph {
        let index = MetadataIndex::build(metadata);

        let mut columns_by_table: HashMap<TableRef, Vec<&ColumnRecord>> = HashMap::new();
        for col in &metadata.columns {
            columns_by_table.entry(col.table_ref()).or_default().push(col);
        }

        let mut tables = kept.to_vec();
        tables.sort();
        tables.dedup();

        let nodes: Vec<Node> = tables
            .iter()
            .map(|t| {
                let cols = columns_by_table.get(t).map(Vec::as_slice).unwrap_or(&[]);
                Node {
                    id: t.qualified(),
                    schema: t.schema.clone(),
                    table: t.table.clone(),
                    label: table_label(t, cols, &index, options),
                    column_count: cols.len(),
                }
            })
            .collect();

        let clusters = if options.cluster_by_schema {
            let mut by_schema: BTreeMap<&str, Vec<String>> = BTreeMap::new();
            for node in &nodes {
                by_schema.entry(&node.schema).or_default().push(node.id.clone());
            }
            by_schema
                .into_iter()
                .map(|(schema, node_ids)| Cluster {
                    name: format!("cluster_{}", schema),
                    label: schema.to_string(),
                    node_ids,
                })
                .collect()
        } else {
            Vec::new()
        };

        let node_set: HashSet<TableRef> = tables.iter().cloned().collect();
        let (edges, dangling_edges) = match options.fk_edge_mode {
            FkEdgeMode::PerColumn => column_edges(&metadata.foreign_keys, &node_set),
            FkEdgeMode::PerConstraint => constraint_edges(&metadata.foreign_keys, &node_set),
        };

        tracing::debug!(
            "Built graph: {} nodes, {} edges, {} clusters, {} dangling FK rows",
            nodes.len(),
            edges.len(),
            clusters.len(),
            dangling_edges
        );

        Graph {
            nodes,
            edges,
            clusters,
            dangling_edges,
        }
    }
}

fn connected(fk: &ForeignKeyRecord, nodes: &HashSet<TableRef>) -> bool {
    nodes.contains(&fk.child_ref()) && nodes.contains(&fk.parent_ref())
}

fn column_edges(fks: &[ForeignKeyRecord], nodes: &HashSet<TableRef>) -> (Vec<Edge>, usize) {
    let mut dangling = 0;
    let mut edges = Vec::with_capacity(fks.len());
    for fk in fks {
        if !connected(fk, nodes) {
            dangling += 1;
            continue;
        }
        edges.push(Edge {
            from: fk.child_ref().qualified(),
            to: fk.parent_ref().qualified(),
            label: format!("{} → {}", fk.child_column, fk.parent_column),
            constraint_name: fk.constraint_name.clone(),
        });
    }
    (edges, dangling)
}

fn constraint_edges(fks: &[ForeignKeyRecord], nodes: &HashSet<TableRef>) -> (Vec<Edge>, usize) {
    let mut dangling = 0;
    let mut order: Vec<(String, TableRef, TableRef)> = Vec::new();
    let mut pairs: HashMap<(String, TableRef, TableRef), (Vec<&str>, Vec<&str>)> = HashMap::new();

    for fk in fks {
        if !connected(fk, nodes) {
            dangling += 1;
            continue;
        }
        let key = (fk.constraint_name.clone(), fk.child_ref(), fk.parent_ref());
        let entry = pairs.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (Vec::new(), Vec::new())
        });
        entry.0.push(fk.child_column.as_str());
        entry.1.push(fk.parent_column.as_str());
    }

    let edges = order
        .into_iter()
        .filter_map(|key| {
            let (child_cols, parent_cols) = pairs.remove(&key)?;
            let (constraint_name, child, parent) = key;
            Some(Edge {
                from: child.qualified(),
                to: parent.qualified(),
                label: format!("{} → {}", child_cols.join(", "), parent_cols.join(", ")),
                constraint_name,
            })
        })
        .collect();
    (edges, dangling)
}

/// HTML-like label for one table node
pub fn table_label(
    table: &TableRef,
    columns: &[&ColumnRecord],
    index: &MetadataIndex,
    options: &GraphOptions,
) -> String {
    let title = if options.show_schema_prefix {
        table.qualified()
    } else {
        table.table.clone()
    };

    let mut rows = Vec::new();

    if options.include_row_counts {
        if let Some(count) = index.row_counts.get(table) {
            rows.push(format!(
                "<tr><td align='left'><font point-size='9'>~rows: {}</font></td></tr>",
                format_thousands(*count)
            ));
        }
    }

    for (shown, col) in columns.iter().enumerate() {
        if shown >= options.max_columns_per_node {
            rows.push(format!(
                "<tr><td align='left'><i>… {} more columns</i></td></tr>",
                columns.len() - options.max_columns_per_node
            ));
            break;
        }
        rows.push(column_row(table, col, index));
    }

    if options.include_indexes {
        if let Some(indexes) = index.index_map.get(table) {
            rows.extend(index_rows(indexes));
        }
    }

    format!(
        "<table border='0' cellborder='1' cellspacing='0'><tr><td bgcolor='lightblue'><b>{}</b></td></tr>{}</table>",
        html_escape(&title),
        rows.concat()
    )
}

fn column_row(table: &TableRef, col: &ColumnRecord, index: &MetadataIndex) -> String {
    let mut prefix = String::new();
    if index.is_primary(&table.schema, &table.table, &col.name) {
        prefix.push_str("🔑 ");
    }
    if index.is_foreign(&table.schema, &table.table, &col.name) {
        prefix.push_str("🔗 ");
    }
    let nullability = if col.is_nullable { "NULL" } else { "NOT NULL" };
    format!(
        "<tr><td align='left'><font point-size='10'>{} : {} <i>({})</i></font></td></tr>",
        html_escape(&format!("{}{}", prefix, col.name)),
        html_escape(&col.type_detail()),
        nullability
    )
}

fn index_rows(indexes: &[IndexRecord]) -> Vec<String> {
    if indexes.is_empty() {
        return Vec::new();
    }
    let mut rows = vec!["<tr><td><b>Indexes</b></td></tr>".to_string()];
    for idx in indexes {
        let label = format!(
            "{}{} ({})",
            if idx.unique { "UNIQUE " } else { "" },
            idx.name,
            idx.columns.join(",")
        );
        rows.push(format!(
            "<tr><td align='left'><font point-size='9'>{}</font></td></tr>",
            html_escape(&label)
        ));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::normalizer::{PrimaryKeyRecord, RowCountRecord};
    use pretty_assertions::assert_eq;

    fn column(table: &str, name: &str, data_type: &str, nullable: bool) -> ColumnRecord {
        ColumnRecord {
            schema: "app".into(),
            table: table.into(),
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: nullable,
            char_length: None,
            numeric_precision: None,
            numeric_scale: None,
        }
    }

    fn fk(constraint: &str, child: &str, child_col: &str, parent: &str, parent_col: &str) -> ForeignKeyRecord {
        ForeignKeyRecord {
            constraint_name: constraint.into(),
            child_schema: "app".into(),
            child_table: child.into(),
            child_column: child_col.into(),
            parent_schema: "app".into(),
            parent_table: parent.into(),
            parent_column: parent_col.into(),
        }
    }

    fn sample() -> (Vec<TableRef>, NormalizedMetadata) {
        let kept = vec![
            TableRef::new("app", "users"),
            TableRef::new("app", "orders"),
            TableRef::new("app", "order_lines"),
        ];
        let metadata = NormalizedMetadata {
            columns: vec![
                column("users", "id", "int", false),
                column("users", "email", "varchar", true),
                column("orders", "id", "int", false),
                column("orders", "user_id", "int", false),
                column("order_lines", "order_id", "int", false),
                column("order_lines", "line_no", "int", false),
            ],
            primary_keys: vec![
                PrimaryKeyRecord { schema: "app".into(), table: "users".into(), column: "id".into(), ordinal: Some(1) },
                PrimaryKeyRecord { schema: "app".into(), table: "orders".into(), column: "id".into(), ordinal: Some(1) },
            ],
            foreign_keys: vec![
                fk("fk_orders_user", "orders", "user_id", "users", "id"),
                fk("fk_lines_order", "order_lines", "order_id", "orders", "id"),
                fk("fk_lines_order", "order_lines", "line_no", "orders", "id"),
                fk("fk_orders_gone", "orders", "user_id", "archived", "id"),
            ],
            indexes: vec![IndexRecord {
                schema: "app".into(),
                table: "users".into(),
                name: "uq_email".into(),
                columns: vec!["email".into()],
                unique: true,
            }],
            row_counts: vec![RowCountRecord { schema: "app".into(), table: "users".into(), rows: 12345 }],
        };
        (kept, metadata)
    }

    #[test]
    fn test_nodes_equal_kept_set_and_edges_stay_inside() {
        let (kept, metadata) = sample();
        let graph = GraphBuilder::build(&kept, &metadata, &GraphOptions::default());

        let ids = graph.node_ids();
        let expected: HashSet<&str> = ["app.users", "app.orders", "app.order_lines"].into_iter().collect();
        assert_eq!(ids, expected);
        for edge in &graph.edges {
            assert!(ids.contains(edge.from.as_str()));
            assert!(ids.contains(edge.to.as_str()));
        }
        assert_eq!(graph.dangling_edges, 1);
    }

    #[test]
    fn test_per_column_edges_are_not_merged() {
        let (kept, metadata) = sample();
        let graph = GraphBuilder::build(&kept, &metadata, &GraphOptions::default());
        let labels: Vec<&str> = graph.edges.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["user_id → id", "order_id → id", "line_no → id"]);
    }

    #[test]
    fn test_per_constraint_edges_merge_columns() {
        let (kept, metadata) = sample();
        let options = GraphOptions {
            fk_edge_mode: FkEdgeMode::PerConstraint,
            ..Default::default()
        };
        let graph = GraphBuilder::build(&kept, &metadata, &options);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.edges[1].label, "order_id, line_no → id, id");
    }

    #[test]
    fn test_label_markers_and_indexes() {
        let (kept, metadata) = sample();
        let options = GraphOptions {
            include_row_counts: true,
            ..Default::default()
        };
        let graph = GraphBuilder::build(&kept, &metadata, &options);
        let users = graph.nodes.iter().find(|n| n.id == "app.users").unwrap();
        assert!(users.label.contains("<b>app.users</b>"));
        assert!(users.label.contains("🔑 id : int <i>(NOT NULL)</i>"));
        assert!(users.label.contains("email : varchar <i>(NULL)</i>"));
        assert!(users.label.contains("~rows: 12,345"));
        assert!(users.label.contains("UNIQUE uq_email (email)"));

        let orders = graph.nodes.iter().find(|n| n.id == "app.orders").unwrap();
        assert!(orders.label.contains("🔗 user_id"));
    }

    #[test]
    fn test_column_overflow_summary() {
        let (kept, metadata) = sample();
        let options = GraphOptions {
            max_columns_per_node: 1,
            show_schema_prefix: false,
            ..Default::default()
        };
        let graph = GraphBuilder::build(&kept, &metadata, &options);
        let users = graph.nodes.iter().find(|n| n.id == "app.users").unwrap();
        assert!(users.label.contains("<b>users</b>"));
        assert!(users.label.contains("… 1 more columns"));
        assert!(!users.label.contains("email : varchar"));
    }

    #[test]
    fn test_clusters_group_by_schema_in_order() {
        let (kept, metadata) = sample();
        let graph = GraphBuilder::build(&kept, &metadata, &GraphOptions::default());
        assert_eq!(graph.clusters.len(), 1);
        assert_eq!(graph.clusters[0].name, "cluster_app");
        assert_eq!(
            graph.clusters[0].node_ids,
            vec!["app.order_lines", "app.orders", "app.users"]
        );

        let flat = GraphBuilder::build(
            &kept,
            &metadata,
            &GraphOptions { cluster_by_schema: false, ..Default::default() },
        );
        assert!(flat.clusters.is_empty());
    }

    #[test]
    fn test_build_is_deterministic() {
        let (kept, metadata) = sample();
        let a = GraphBuilder::build(&kept, &metadata, &GraphOptions::default());
        let b = GraphBuilder::build(&kept, &metadata, &GraphOptions::default());
        assert_eq!(a, b);
    }
}
