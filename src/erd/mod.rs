//! ERD Module
//!
//! The diagram engine. This module provides:
//! - The unused-table filter and its enum-table policy
//! - The graph builder and DOT/PNG rendering
//! - Grouped key, size and activity reports
//! - `ErdPipeline`, which runs normalize -> filter -> restrict -> build
//!   over frames that were already fetched

pub mod dot;
pub mod filter;
pub mod format;
pub mod graph;
pub mod report;
pub mod service;

pub use filter::{EnumTablePolicy, ExclusionRecord, UnusedTableFilter, ACTIVITY_EXTRA_KEYWORDS};
pub use graph::{FkEdgeMode, Graph, GraphBuilder, GraphOptions};

use crate::error::AppError;
use crate::metadata::normalizer::MissingRoleError;
use crate::metadata::{MetadataFrames, NormalizedMetadata, TableRef};
use crate::snapshot::{SchemaSnapshot, TableInfo};
use report::{ForeignKeyGroup, PrimaryKeyGroup};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ErdError {
    #[error(transparent)]
    MissingRole(#[from] MissingRoleError),

    #[error("No tables found in the selected schemas.")]
    NoTables,
}

impl From<ErdError> for AppError {
    fn from(err: ErdError) -> Self {
        match err {
            ErdError::MissingRole(e) => AppError::MissingRole(e),
            ErdError::NoTables => AppError::NotFound(err.to_string()),
        }
    }
}

/// Everything one generation produces
#[derive(Debug, Clone)]
pub struct ErdOutput {
    pub kept: Vec<TableRef>,
    pub excluded: Vec<ExclusionRecord>,
    /// Restricted to the kept tables
    pub metadata: NormalizedMetadata,
    pub graph: Graph,
    pub dot: String,
    pub primary_keys: Vec<PrimaryKeyGroup>,
    pub foreign_keys: Vec<ForeignKeyGroup>,
}

/// Flatten per-schema snapshot statistics into a (schema, table) lookup
pub fn table_info_lookup<'a, I>(snapshots: I) -> HashMap<TableRef, TableInfo>
where
    I: IntoIterator<Item = &'a SchemaSnapshot>,
{
    snapshots
        .into_iter()
        .flat_map(|snap| {
            snap.table_info
                .iter()
                .map(move |(table, info)| (TableRef::new(&snap.schema, table), info.clone()))
        })
        .collect()
}

pub struct ErdPipeline {
    filter: UnusedTableFilter,
    options: GraphOptions,
}

impl ErdPipeline {
    pub fn new(filter: UnusedTableFilter, options: GraphOptions) -> Self {
        Self { filter, options }
    }

    /// Run the engine over fetched frames. Every frame is restricted to the
    /// kept tables before the graph is built; when the filter excludes every
    /// table the result is an empty graph plus the exclusion list.
    pub fn run(
        &self,
        frames: &MetadataFrames,
        table_info: &HashMap<TableRef, TableInfo>,
    ) -> Result<ErdOutput, ErdError> {
        let normalized = NormalizedMetadata::from_frames(frames)?;
        let universe = normalized.table_universe();
        if universe.is_empty() {
            return Err(ErdError::NoTables);
        }

        let outcome = self.filter.apply(&universe, table_info);
        let kept_set: HashSet<TableRef> = outcome.kept.iter().cloned().collect();
        let metadata = normalized.restrict_to(&kept_set);

        let graph = GraphBuilder::build(&outcome.kept, &metadata, &self.options);
        let dot = dot::render(&graph);

        tracing::info!(
            "ERD generated: {} tables kept, {} excluded, {} nodes, {} edges",
            outcome.kept.len(),
            outcome.excluded.len(),
            graph.nodes.len(),
            graph.edges.len()
        );

        Ok(ErdOutput {
            primary_keys: report::group_primary_keys(&metadata.primary_keys),
            foreign_keys: report::group_foreign_keys(&metadata.foreign_keys),
            kept: outcome.kept,
            excluded: outcome.excluded,
            metadata,
            graph,
            dot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Cell, MetadataFrame};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn frames() -> MetadataFrames {
        MetadataFrames {
            columns: MetadataFrame::from_rows(
                &["TABLE_SCHEMA", "TABLE_NAME", "COLUMN_NAME", "DATA_TYPE", "IS_NULLABLE"],
                vec![
                    vec!["app", "users", "id", "int", "NO"],
                    vec!["app", "orders", "id", "int", "NO"],
                    vec!["app", "orders", "user_id", "int", "NO"],
                    vec!["app", "legacy", "id", "int", "NO"],
                    vec!["app", "legacy", "user_id", "int", "YES"],
                ],
            ),
            primary_keys: MetadataFrame::from_rows(
                &["TABLE_SCHEMA", "TABLE_NAME", "COLUMN_NAME", "ORDINAL_POSITION"],
                vec![vec!["app", "users", "id", "1"], vec!["app", "orders", "id", "1"]],
            ),
            foreign_keys: MetadataFrame::from_rows(
                &[
                    "CONSTRAINT_NAME",
                    "child_schema",
                    "child_table",
                    "child_column",
                    "parent_schema",
                    "parent_table",
                    "parent_column",
                ],
                vec![
                    vec!["fk_orders_user", "app", "orders", "user_id", "app", "users", "id"],
                    vec!["fk_legacy_user", "app", "legacy", "user_id", "app", "users", "id"],
                ],
            ),
            indexes: MetadataFrame::default(),
            row_counts: MetadataFrame::default(),
        }
    }

    fn snapshot(updated: &[&str]) -> SchemaSnapshot {
        let info: BTreeMap<String, TableInfo> = updated
            .iter()
            .map(|t| {
                (
                    t.to_string(),
                    TableInfo {
                        last_update: Some(Cell::from("2024-06-01 12:00:00")),
                        ..Default::default()
                    },
                )
            })
            .collect();
        SchemaSnapshot::with_info("app", Vec::new(), BTreeMap::new(), info)
    }

    #[test]
    fn test_pipeline_restricts_to_kept_tables() {
        let snap = snapshot(&["users", "orders"]);
        let pipeline = ErdPipeline::new(UnusedTableFilter::default(), GraphOptions::default());
        let output = pipeline.run(&frames(), &table_info_lookup([&snap])).unwrap();

        assert_eq!(
            output.kept,
            vec![TableRef::new("app", "orders"), TableRef::new("app", "users")]
        );
        assert_eq!(output.excluded.len(), 1);
        assert_eq!(output.excluded[0].table, "app.legacy");
        assert!(output.metadata.columns.iter().all(|c| c.table != "legacy"));
        assert_eq!(output.metadata.foreign_keys.len(), 1);
        assert_eq!(output.graph.nodes.len(), 2);
        assert_eq!(output.graph.edges.len(), 1);
        assert!(output.dot.contains("\"app.orders\" -> \"app.users\""));
        assert_eq!(output.primary_keys.len(), 2);
    }

    #[test]
    fn test_pipeline_all_excluded_yields_empty_graph() {
        let pipeline = ErdPipeline::new(UnusedTableFilter::default(), GraphOptions::default());
        let output = pipeline.run(&frames(), &HashMap::new()).unwrap();
        assert!(output.kept.is_empty());
        assert!(output.graph.nodes.is_empty());
        assert!(output.graph.edges.is_empty());
        assert_eq!(output.excluded.len(), 3);
    }

    #[test]
    fn test_pipeline_without_columns_is_an_error() {
        let pipeline = ErdPipeline::new(UnusedTableFilter::default(), GraphOptions::default());
        let err = pipeline.run(&MetadataFrames::default(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ErdError::NoTables));
        assert_eq!(err.to_string(), "No tables found in the selected schemas.");
    }

    #[test]
    fn test_pipeline_surfaces_missing_roles() {
        let mut bad = frames();
        bad.columns = MetadataFrame::from_rows(&["foo", "bar"], vec![vec!["x", "y"]]);
        let pipeline = ErdPipeline::new(UnusedTableFilter::default(), GraphOptions::default());
        let err = pipeline.run(&bad, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ErdError::MissingRole(_)));
    }
}
