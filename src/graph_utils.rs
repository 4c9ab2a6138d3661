use crate::{graph_store::GraphStore, types::*};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Write,
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

/// Node-link JSON layout of a graph, readable by most graph tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub directed: bool,
    pub multigraph: bool,
    pub seeds: Vec<String>,
    pub nodes: Vec<NodeRecord>,
    pub links: Vec<LinkRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub role: NodeRole,
    pub level: usize,
    pub anchor: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub source: String,
    pub target: String,
    pub txid: String,
    pub amount: u64,
    pub time: DateTime<Utc>,
}

impl GraphSnapshot {
    pub fn from_graph(store: &GraphStore) -> Self {
        let nodes = store
            .nodes()
            .map(|node| NodeRecord {
                id: node.address.clone(),
                role: node.role,
                level: node.discovery_level,
                anchor: node.anchor,
            })
            .collect();
        let links = store
            .edges()
            .map(|(from, to, edge)| LinkRecord {
                source: from.address.clone(),
                target: to.address.clone(),
                txid: edge.txid.clone(),
                amount: edge.amount,
                time: edge.timestamp,
            })
            .collect();

        Self {
            directed: true,
            multigraph: true,
            seeds: store.seeds().to_vec(),
            nodes,
            links,
        }
    }
}

/// Every edge of the graph as a flat `Transaction` list.
pub fn transactions_of(store: &GraphStore) -> Vec<Transaction> {
    store
        .edges()
        .map(|(from, to, edge)| {
            Transaction::new(
                edge.txid.clone(),
                from.address.clone(),
                to.address.clone(),
                edge.amount,
                edge.timestamp,
            )
        })
        .collect()
}

/// Writes `{prefix}_full_graph.json`, `{prefix}_filtered_graph.json` and
/// `{prefix}_transactions.json`. Returns the paths written.
pub fn save_trace_data(prefix: &str, full: &GraphStore, filtered: &GraphStore) -> Result<Vec<PathBuf>> {
    let outputs = [
        (
            format!("{}_full_graph.json", prefix),
            serde_json::to_string_pretty(&GraphSnapshot::from_graph(full))?,
        ),
        (
            format!("{}_filtered_graph.json", prefix),
            serde_json::to_string_pretty(&GraphSnapshot::from_graph(filtered))?,
        ),
        (
            format!("{}_transactions.json", prefix),
            serde_json::to_string_pretty(&transactions_of(full))?,
        ),
    ];

    let mut written = Vec::with_capacity(outputs.len());
    for (path, body) in outputs {
        fs::write(&path, body).with_context(|| format!("Failed to write {}", path))?;
        info!("Wrote {}", path);
        written.push(PathBuf::from(path));
    }
    Ok(written)
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Write a graph into a DOT string for visualization
///
/// Seeds are drawn red, everything else light blue. Useful with
/// `https://dreampuf.github.io/GraphvizOnline/?engine=dot` or `dot -Tpng`.
pub fn write_graph_to_dot(store: &GraphStore) -> Result<String> {
    let mut dot = String::new();
    writeln!(dot, "digraph TraceGraph {{")?;
    writeln!(dot, "  node [shape=ellipse, style=filled];")?;
    writeln!(dot, "  edge [dir=forward];")?;
    writeln!(dot)?;

    // Add nodes (addresses)
    for node in store.nodes() {
        let color = if node.is_seed() { "red" } else { "lightblue" };
        writeln!(
            dot,
            "  \"{}\" [label=\"{}\" fillcolor={} tooltip=\"level {}\"];",
            escape(&node.address),
            escape(&short_label(&node.address)),
            color,
            node.discovery_level
        )?;
    }

    writeln!(dot)?;

    // Add edges (transactions)
    for (from, to, edge) in store.edges() {
        writeln!(
            dot,
            "  \"{}\" -> \"{}\" [label=\"{}\\n{}\" tooltip=\"Tx: {}\"];",
            escape(&from.address),
            escape(&to.address),
            edge.amount,
            edge.timestamp.format("%Y-%m-%d"),
            escape(&edge.txid)
        )?;
    }

    writeln!(dot, "}}")?;
    Ok(dot)
}

// Long addresses are cut to their first 12 characters
fn short_label(address: &str) -> String {
    match address.char_indices().nth(12) {
        Some((cut, _)) => format!("{}...", &address[..cut]),
        None => address.to_string(),
    }
}

/// Call write_graph_to_dot() and save the result to `path`.
pub fn save_graph_as_dot(store: &GraphStore, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let dot = write_graph_to_dot(store)?;
    fs::write(path, dot).with_context(|| format!("Failed to write DOT to {}", path.display()))?;
    info!("Graph saved to {}", path.display());
    Ok(())
}
