//! ERD generation service
//!
//! Connects the diagram engine to live environments: fetches frames and
//! cached snapshots, runs the pipeline, records exclusions and renders
//! exports.

use super::dot;
use super::report::{size_report, SizeReport};
use super::{table_info_lookup, ErdOutput, ErdPipeline, ExclusionRecord, GraphOptions, UnusedTableFilter};
use crate::config::ErdConfig;
use crate::error::AppError;
use crate::metadata::MySqlIntrospector;
use crate::snapshot::SchemaSnapshot;
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Schema selection sorted, without blanks or duplicates
pub fn normalize_selection(schemas: &[String]) -> Vec<String> {
    let mut sorted: Vec<String> = schemas
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// Key for the exclusion list of one schema selection. Schema order and
/// duplicates do not matter.
pub fn selection_key(environment: &str, schemas: &[String]) -> String {
    format!("{}_{}", environment, normalize_selection(schemas).join("_"))
}

/// Options used when a request sends none
pub fn default_options(config: &ErdConfig) -> GraphOptions {
    GraphOptions {
        max_columns_per_node: config.max_columns_per_node,
        ..Default::default()
    }
}

/// A finished generation
#[derive(Debug, Clone)]
pub struct Generation {
    pub environment: String,
    pub schemas: Vec<String>,
    pub output: ErdOutput,
    pub sizes: SizeReport,
    /// Seconds, rounded to milliseconds
    pub elapsed: f64,
}

/// Headline figures for a generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub tables: usize,
    pub excluded: usize,
    pub nodes: usize,
    pub edges: usize,
    pub clusters: usize,
    pub dangling_edges: usize,
}

impl Generation {
    pub fn summary(&self) -> GraphSummary {
        let graph = &self.output.graph;
        GraphSummary {
            tables: self.output.kept.len(),
            excluded: self.output.excluded.len(),
            nodes: graph.nodes.len(),
            edges: graph.edges.len(),
            clusters: graph.clusters.len(),
            dangling_edges: graph.dangling_edges,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Dot,
    Png,
}

/// Rendered export
#[derive(Debug, Clone)]
pub struct Export {
    pub format: ExportFormat,
    pub content_type: &'static str,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Generate the diagram for `schemas` of one connected environment
pub async fn generate(
    state: &AppState,
    environment: &str,
    schemas: &[String],
    options: GraphOptions,
) -> Result<Generation, AppError> {
    let schemas = normalize_selection(schemas);
    if schemas.is_empty() {
        return Err(AppError::Validation("Select at least one schema".to_string()));
    }

    let started = Instant::now();
    let (name, _) = state.connections.resolve_environment(environment)?;
    let pool = state.connections.ensure_connected(&name).await?;

    let frames = MySqlIntrospector::fetch_frames(&pool, &schemas, options.include_row_counts).await?;

    let mut snapshots: Vec<Arc<SchemaSnapshot>> = Vec::with_capacity(schemas.len());
    for schema in &schemas {
        snapshots.push(state.snapshot(&name, schema).await?);
    }
    let lookup = table_info_lookup(snapshots.iter().map(Arc::as_ref));

    let pipeline = ErdPipeline::new(UnusedTableFilter::new(state.enum_policy.clone()), options);
    let output = pipeline.run(&frames, &lookup)?;
    let sizes = size_report(snapshots.iter().map(Arc::as_ref));

    state
        .exclusions
        .write()
        .await
        .insert(selection_key(&name, &schemas), output.excluded.clone());

    let elapsed = (started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;
    info!(
        "Generated ERD for {} [{}] in {}s",
        name,
        schemas.join(", "),
        elapsed
    );

    Ok(Generation {
        environment: name,
        schemas,
        output,
        sizes,
        elapsed,
    })
}

/// Exclusions recorded by the last generation of this selection
pub async fn exclusions(state: &AppState, environment: &str, schemas: &[String]) -> Result<Option<Vec<ExclusionRecord>>, AppError> {
    let (name, _) = state.connections.resolve_environment(environment)?;
    Ok(state
        .exclusions
        .read()
        .await
        .get(&selection_key(&name, schemas))
        .cloned())
}

/// Render a generation. PNG falls back to DOT when Graphviz is unavailable.
pub async fn export(generation: &Generation, format: ExportFormat, dot_binary: &str) -> Export {
    let stem = format!("erd_{}", selection_key(&generation.environment, &generation.schemas));

    if format == ExportFormat::Png {
        if let Some(png) = dot::render_png(&generation.output.dot, dot_binary).await {
            return Export {
                format: ExportFormat::Png,
                content_type: "image/png",
                file_name: format!("{}.png", stem),
                bytes: png,
            };
        }
        warn!("PNG export unavailable for {}, returning DOT source", stem);
    }

    Export {
        format: ExportFormat::Dot,
        content_type: "text/vnd.graphviz",
        file_name: format!("{}.dot", stem),
        bytes: generation.output.dot.clone().into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erd::Graph;
    use crate::metadata::NormalizedMetadata;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_selection_key_ignores_order() {
        let a = selection_key("QA", &["sales".to_string(), "app".to_string()]);
        let b = selection_key("QA", &["app".to_string(), "sales".to_string(), "app".to_string()]);
        assert_eq!(a, "QA_app_sales");
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_selection_drops_repeats() {
        let schemas = vec![
            "sales".to_string(),
            " app ".to_string(),
            "sales".to_string(),
            String::new(),
        ];
        assert_eq!(normalize_selection(&schemas), vec!["app", "sales"]);
    }

    #[test]
    fn test_default_options_follow_config() {
        let config = ErdConfig {
            max_columns_per_node: 25,
            ..Default::default()
        };
        let options = default_options(&config);
        assert_eq!(options.max_columns_per_node, 25);
        assert!(options.cluster_by_schema);
    }

    #[test]
    fn test_export_format_parsing() {
        let format: ExportFormat = serde_json::from_str("\"png\"").unwrap();
        assert_eq!(format, ExportFormat::Png);
        assert_eq!(ExportFormat::default(), ExportFormat::Dot);
    }

    fn generation() -> Generation {
        Generation {
            environment: "QA".into(),
            schemas: vec!["app".into()],
            output: ErdOutput {
                kept: Vec::new(),
                excluded: Vec::new(),
                metadata: NormalizedMetadata::default(),
                graph: Graph {
                    nodes: Vec::new(),
                    edges: Vec::new(),
                    clusters: Vec::new(),
                    dangling_edges: 0,
                },
                dot: "digraph {\n}\n".into(),
                primary_keys: Vec::new(),
                foreign_keys: Vec::new(),
            },
            sizes: SizeReport::default(),
            elapsed: 0.0,
        }
    }

    #[test]
    fn test_png_export_falls_back_to_dot() {
        let export = tokio_test::block_on(export(
            &generation(),
            ExportFormat::Png,
            "definitely-not-graphviz-xyz",
        ));
        assert_eq!(export.format, ExportFormat::Dot);
        assert_eq!(export.file_name, "erd_QA_app.dot");
        assert_eq!(export.bytes, b"digraph {\n}\n".to_vec());
    }
}
