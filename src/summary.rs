use crate::graph_store::GraphStore;
use petgraph::Directed;
use petgraph::Graph;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryEdge {
    pub no_transfers: usize,
    pub total_amount: u64,
}

impl Display for SummaryEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.no_transfers, self.total_amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedTransfer {
    pub from: String,
    pub to: String,
    pub no_transfers: usize,
    pub total_amount: u64,
}

impl Display for AggregatedTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.36} -> {:.36} for {} transfers totalling {}",
            self.from, self.to, self.no_transfers, self.total_amount
        )
    }
}

/// TransferSummary
///
/// A TransferSummary is primarily a graph that collapses every parallel transaction
/// between two addresses into one `SummaryEdge`.
///
/// It also carries a tabular representation, sorted by sender and then by descending
/// transfer count, which is what gets printed.
///
/// `total_amount` is exact per pair. Adding totals of different senders into the same
/// receiver double counts multi-input transactions, see `Transaction::amount`.
pub struct TransferSummary {
    pub summary_graph: Graph<String, SummaryEdge, Directed>,
    pub summary_table: Vec<AggregatedTransfer>,
}

impl TransferSummary {
    pub fn from_graph(store: &GraphStore) -> Self {
        // Accumulate all transactions per ordered address pair
        let mut acc: BTreeMap<(String, String), SummaryEdge> = BTreeMap::new();
        let graph = store.graph();
        for edge in graph.edge_references() {
            let key = (
                graph[edge.source()].address.clone(),
                graph[edge.target()].address.clone(),
            );
            let entry = acc.entry(key).or_insert(SummaryEdge {
                no_transfers: 0,
                total_amount: 0,
            });
            entry.no_transfers += 1;
            entry.total_amount = entry.total_amount.saturating_add(edge.weight().amount);
        }

        // Add the nodes and edges to the summary graph
        let mut summary_graph = Graph::<String, SummaryEdge, Directed>::new();
        let mut node_map = HashMap::<String, NodeIndex>::new();
        let mut summary_table = Vec::with_capacity(acc.len());

        for ((from, to), summary) in acc {
            let from_index = *node_map
                .entry(from.clone())
                .or_insert_with(|| summary_graph.add_node(from.clone()));
            let to_index = *node_map
                .entry(to.clone())
                .or_insert_with(|| summary_graph.add_node(to.clone()));
            summary_graph.add_edge(from_index, to_index, summary);

            summary_table.push(AggregatedTransfer {
                from,
                to,
                no_transfers: summary.no_transfers,
                total_amount: summary.total_amount,
            });
        }

        summary_table.sort_by(|a, b| {
            a.from
                .cmp(&b.from)
                .then_with(|| b.no_transfers.cmp(&a.no_transfers))
                .then_with(|| a.to.cmp(&b.to))
        });

        TransferSummary {
            summary_graph,
            summary_table,
        }
    }
}

impl Display for TransferSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for transfer in &self.summary_table {
            writeln!(f, "{}", transfer)?;
        }
        Ok(())
    }
}
