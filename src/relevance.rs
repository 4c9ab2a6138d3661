use crate::graph_store::GraphStore;
use petgraph::{
    graph::NodeIndex,
    visit::{Bfs, Reversed},
};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Reduces a traced graph to the part that connects distinct seeds.
///
/// A node is kept if it lies on a directed path from one seed to a *different* seed, i.e.
/// it is reachable from some seed `s1` and can reach some seed `s2 != s1`. Seeds are always
/// kept, even when isolated. An edge is kept when both of its endpoints are kept.
///
/// Reachability comes from one forward and one reverse BFS per seed, so the cost is
/// O(|seeds| * (V + E)) regardless of how many paths exist.
pub fn filter_relevant(store: &GraphStore) -> GraphStore {
    let seeds: Vec<NodeIndex> = store
        .seeds()
        .iter()
        .filter_map(|seed| store.node_index(seed))
        .collect();
    let mut keep: HashSet<NodeIndex> = seeds.iter().copied().collect();

    if seeds.len() < 2 {
        // Self-transfers are never stored, so a lone seed carries no edges
        info!("Fewer than two seeds; keeping seeds only");
        return store.retain_nodes(&keep);
    }

    let graph = store.graph();

    // For every node: which seeds reach it, and which seeds it reaches (by seed position)
    let mut reached_from: HashMap<NodeIndex, Vec<usize>> = HashMap::new();
    let mut reaches: HashMap<NodeIndex, Vec<usize>> = HashMap::new();

    for (i, &seed) in seeds.iter().enumerate() {
        let mut bfs = Bfs::new(graph, seed);
        while let Some(node) = bfs.next(graph) {
            reached_from.entry(node).or_default().push(i);
        }

        let reversed = Reversed(graph);
        let mut bfs = Bfs::new(reversed, seed);
        while let Some(node) = bfs.next(reversed) {
            reaches.entry(node).or_default().push(i);
        }
    }

    for (node, sources) in &reached_from {
        let Some(targets) = reaches.get(node) else {
            continue;
        };
        if sources.iter().any(|s1| targets.iter().any(|s2| s1 != s2)) {
            keep.insert(*node);
        }
    }

    let filtered = store.retain_nodes(&keep);
    info!(
        "Filtered graph: {} of {} nodes, {} of {} edges",
        filtered.node_count(),
        store.node_count(),
        filtered.edge_count(),
        store.edge_count()
    );
    filtered
}
