//! DOT Rendering
//!
//! Serializes a [`Graph`] to Graphviz DOT text and optionally rasterizes it
//! to PNG through the `dot` binary.

use super::graph::{Graph, Node};
use std::fmt::Write as _;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Quote a DOT identifier or attribute value
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn write_node(out: &mut String, node: &Node, indent: &str) {
    let _ = writeln!(
        out,
        "{}{} [label=<\n{}\n> shape=plaintext]",
        indent,
        quote(&node.id),
        node.label
    );
}

/// Render the graph as DOT text. Output is deterministic for a given graph.
pub fn render(graph: &Graph) -> String {
    let mut out = String::from("digraph {\n\tgraph [fontsize=10 rankdir=LR]\n");

    if graph.clusters.is_empty() {
        for node in &graph.nodes {
            write_node(&mut out, node, "\t");
        }
    } else {
        for cluster in &graph.clusters {
            let _ = writeln!(out, "\tsubgraph {} {{", quote(&cluster.name));
            let _ = writeln!(out, "\t\tcolor=gray label={} style=rounded", quote(&cluster.label));
            for node in graph.nodes.iter().filter(|n| cluster.node_ids.contains(&n.id)) {
                write_node(&mut out, node, "\t\t");
            }
            out.push_str("\t}\n");
        }
    }

    for edge in &graph.edges {
        let _ = writeln!(
            out,
            "\t{} -> {} [label={} arrowsize=0.7]",
            quote(&edge.from),
            quote(&edge.to),
            quote(&edge.label)
        );
    }

    out.push_str("}\n");
    out
}

/// Rasterize DOT text with Graphviz. Returns `None` when the binary is
/// missing or fails; the DOT source stays usable either way.
pub async fn render_png(dot_source: &str, dot_binary: &str) -> Option<Vec<u8>> {
    let binary = match which::which(dot_binary) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("Graphviz '{}' not available, skipping PNG export: {}", dot_binary, e);
            return None;
        }
    };

    let mut child = match Command::new(&binary)
        .arg("-Tpng")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!("Failed to spawn {}: {}", binary.display(), e);
            return None;
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(dot_source.as_bytes()).await {
            tracing::warn!("Failed to write DOT source to Graphviz: {}", e);
            return None;
        }
    }

    match child.wait_with_output().await {
        Ok(output) if output.status.success() => Some(output.stdout),
        Ok(output) => {
            tracing::warn!(
                "Graphviz exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            None
        }
        Err(e) => {
            tracing::warn!("Graphviz failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erd::graph::{Cluster, Edge};
    use pretty_assertions::assert_eq;

    fn node(id: &str, schema: &str) -> Node {
        Node {
            id: id.into(),
            schema: schema.into(),
            table: id.rsplit('.').next().unwrap_or(id).into(),
            label: format!("<table><tr><td>{}</td></tr></table>", id),
            column_count: 1,
        }
    }

    fn graph(clustered: bool) -> Graph {
        Graph {
            nodes: vec![node("app.orders", "app"), node("app.users", "app")],
            edges: vec![Edge {
                from: "app.orders".into(),
                to: "app.users".into(),
                label: "user_id → id".into(),
                constraint_name: "fk_orders_user".into(),
            }],
            clusters: if clustered {
                vec![Cluster {
                    name: "cluster_app".into(),
                    label: "app".into(),
                    node_ids: vec!["app.orders".into(), "app.users".into()],
                }]
            } else {
                Vec::new()
            },
            dangling_edges: 0,
        }
    }

    #[test]
    fn test_render_flat_graph() {
        let dot = render(&graph(false));
        assert!(dot.starts_with("digraph {\n\tgraph [fontsize=10 rankdir=LR]\n"));
        assert!(dot.contains("\t\"app.users\" [label=<\n<table><tr><td>app.users</td></tr></table>\n> shape=plaintext]\n"));
        assert!(dot.contains("\t\"app.orders\" -> \"app.users\" [label=\"user_id → id\" arrowsize=0.7]\n"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_render_clustered_graph() {
        let dot = render(&graph(true));
        assert!(dot.contains("\tsubgraph \"cluster_app\" {\n\t\tcolor=gray label=\"app\" style=rounded\n"));
        assert!(dot.contains("\t\t\"app.orders\" [label=<"));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[tokio::test]
    async fn test_png_missing_binary_is_soft_failure() {
        let png = render_png("digraph {}", "definitely-not-a-graphviz-binary").await;
        assert!(png.is_none());
    }
}
