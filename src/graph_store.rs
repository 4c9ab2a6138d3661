use crate::types::*;
use chrono::{DateTime, Utc};
use petgraph::{graph::NodeIndex, visit::EdgeRef};
use std::collections::{HashMap, HashSet};

///
/// InsertOutcome
///
/// What a single `GraphStore::insert_transaction` call changed.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertOutcome {
    pub edge_added: bool,
    pub new_nodes: usize,
}

///
/// GraphStore
///
/// Wraps a `TraceGraph` together with the lookups needed to keep it a proper multigraph:
/// address -> node index (nodes are unique per address) and the set of edge keys already
/// present (edges are unique per `EdgeKey`).
///
/// Every edge's endpoints are always present as nodes, since endpoints are inserted before
/// the edge that references them.
#[derive(Debug, Clone)]
pub struct GraphStore {
    graph: TraceGraph,
    index: HashMap<String, NodeIndex>,
    edge_keys: HashSet<EdgeKey>,
    seeds: Vec<String>,
}

impl GraphStore {
    /// Creates a graph containing only the seed addresses, at level 0.
    ///
    /// Duplicate seeds are collapsed; first-seen order is kept.
    pub fn with_seeds<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut store = Self {
            graph: TraceGraph::new(),
            index: HashMap::new(),
            edge_keys: HashSet::new(),
            seeds: Vec::new(),
        };

        for seed in seeds {
            let seed = seed.into();
            if store.index.contains_key(&seed) {
                continue;
            }
            let idx = store.graph.add_node(AddressNode::seed(seed.clone()));
            store.index.insert(seed.clone(), idx);
            store.seeds.push(seed);
        }

        store
    }

    pub fn seeds(&self) -> &[String] {
        &self.seeds
    }

    pub fn graph(&self) -> &TraceGraph {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(address)
    }

    pub fn node_index(&self, address: &str) -> Option<NodeIndex> {
        self.index.get(address).copied()
    }

    pub fn node(&self, address: &str) -> Option<&AddressNode> {
        self.node_index(address).map(|idx| &self.graph[idx])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AddressNode> {
        self.graph.node_weights()
    }

    /// Iterates edges as (sender, receiver, payload).
    pub fn edges(&self) -> impl Iterator<Item = (&AddressNode, &AddressNode, &TransactionEdge)> {
        self.graph
            .edge_references()
            .map(|edge| (&self.graph[edge.source()], &self.graph[edge.target()], edge.weight()))
    }

    pub fn contains_edge(&self, key: &EdgeKey) -> bool {
        self.edge_keys.contains(key)
    }

    /// Whether at least one transaction goes from `from` to `to`.
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.node_index(from), self.node_index(to)) {
            (Some(a), Some(b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Highest discovery level of any node.
    pub fn max_level(&self) -> usize {
        self.nodes().map(|n| n.discovery_level).max().unwrap_or(0)
    }

    /// Nodes first discovered at `level`, sorted by address.
    pub fn frontier(&self, level: usize) -> Vec<&AddressNode> {
        let mut frontier: Vec<&AddressNode> = self
            .nodes()
            .filter(|node| node.discovery_level == level)
            .collect();
        frontier.sort_by(|a, b| a.address.cmp(&b.address));
        frontier
    }

    /// Folds one transaction seen while expanding `level` into the graph.
    ///
    /// Unseen endpoints become discovered nodes at `level`, anchored at the transaction's
    /// timestamp. Endpoints already present keep their level and anchor. Self-transfers are
    /// ignored and an edge key that is already present is a no-op.
    pub fn insert_transaction(&mut self, tx: &Transaction, level: usize) -> InsertOutcome {
        let mut outcome = InsertOutcome::default();
        if tx.from == tx.to {
            return outcome;
        }

        let (from_idx, from_new) = self.insert_node_if_absent(&tx.from, level, tx.timestamp);
        let (to_idx, to_new) = self.insert_node_if_absent(&tx.to, level, tx.timestamp);
        outcome.new_nodes = usize::from(from_new) + usize::from(to_new);

        if self.edge_keys.insert(tx.key()) {
            self.graph.add_edge(
                from_idx,
                to_idx,
                TransactionEdge {
                    txid: tx.txid.clone(),
                    amount: tx.amount,
                    timestamp: tx.timestamp,
                },
            );
            outcome.edge_added = true;
        }

        outcome
    }

    // Levels are committed in increasing order, so the first insertion of an address is
    // also its minimum level. Later sightings never touch level or anchor.
    fn insert_node_if_absent(
        &mut self,
        address: &str,
        level: usize,
        anchor: DateTime<Utc>,
    ) -> (NodeIndex, bool) {
        if let Some(idx) = self.index.get(address) {
            return (*idx, false);
        }
        let idx = self
            .graph
            .add_node(AddressNode::discovered(address, level, anchor));
        self.index.insert(address.to_string(), idx);
        (idx, true)
    }

    /// Returns an independent copy holding only the nodes in `keep` and the edges between
    /// them. The seed list is carried over unchanged.
    pub fn retain_nodes(&self, keep: &HashSet<NodeIndex>) -> GraphStore {
        let graph = self.graph.filter_map(
            |idx, node| keep.contains(&idx).then(|| node.clone()),
            |_, edge| Some(edge.clone()),
        );

        let index = graph
            .node_indices()
            .map(|idx| (graph[idx].address.clone(), idx))
            .collect();
        let edge_keys = graph
            .edge_references()
            .map(|edge| EdgeKey {
                txid: edge.weight().txid.clone(),
                from: graph[edge.source()].address.clone(),
                to: graph[edge.target()].address.clone(),
            })
            .collect();

        GraphStore {
            graph,
            index,
            edge_keys,
            seeds: self.seeds.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn seeds_start_at_level_zero_without_anchor() {
        let store = GraphStore::with_seeds(["A", "B", "A"]);

        assert_eq!(store.seeds(), ["A".to_string(), "B".to_string()]);
        assert_eq!(store.node_count(), 2);
        for node in store.nodes() {
            assert!(node.is_seed());
            assert_eq!(node.discovery_level, 0);
            assert!(node.anchor.is_none());
        }
    }

    #[test]
    fn inserting_transaction_adds_missing_endpoints() {
        let mut store = GraphStore::with_seeds(["A"]);
        let outcome = store.insert_transaction(&Transaction::new("t1", "A", "X", 5, ts(15)), 1);

        assert_eq!(
            outcome,
            InsertOutcome {
                edge_added: true,
                new_nodes: 1
            }
        );
        let x = store.node("X").unwrap();
        assert_eq!(x.role, NodeRole::Discovered);
        assert_eq!(x.discovery_level, 1);
        assert_eq!(x.anchor, Some(ts(15)));
        assert!(store.has_edge("A", "X"));
        assert!(!store.has_edge("X", "A"));
    }

    #[test]
    fn first_discovery_wins() {
        let mut store = GraphStore::with_seeds(["A"]);
        store.insert_transaction(&Transaction::new("t1", "A", "X", 5, ts(15)), 1);
        store.insert_transaction(&Transaction::new("t2", "Y", "X", 7, ts(20)), 2);

        let x = store.node("X").unwrap();
        assert_eq!(x.discovery_level, 1);
        assert_eq!(x.anchor, Some(ts(15)));
        assert_eq!(store.node("Y").unwrap().discovery_level, 2);
    }

    #[test]
    fn seeds_keep_their_role_when_seen_again() {
        let mut store = GraphStore::with_seeds(["A", "B"]);
        store.insert_transaction(&Transaction::new("t1", "X", "B", 5, ts(15)), 2);

        let b = store.node("B").unwrap();
        assert!(b.is_seed());
        assert_eq!(b.discovery_level, 0);
        assert!(b.anchor.is_none());
    }

    #[test]
    fn edges_are_idempotent_per_key_but_parallel_txids_coexist() {
        let mut store = GraphStore::with_seeds(["A"]);
        let tx = Transaction::new("t1", "A", "B", 5, ts(15));
        store.insert_transaction(&tx, 1);
        let again = store.insert_transaction(&tx, 1);
        store.insert_transaction(&Transaction::new("t2", "A", "B", 9, ts(16)), 1);

        assert!(!again.edge_added);
        assert_eq!(store.edge_count(), 2);
        assert!(store.contains_edge(&tx.key()));
    }

    #[test]
    fn self_transfers_are_ignored() {
        let mut store = GraphStore::with_seeds(["A"]);
        let outcome = store.insert_transaction(&Transaction::new("t1", "A", "A", 5, ts(15)), 1);

        assert_eq!(outcome, InsertOutcome::default());
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn every_edge_endpoint_is_a_node() {
        let mut store = GraphStore::with_seeds(["A"]);
        store.insert_transaction(&Transaction::new("t1", "A", "B", 1, ts(1)), 1);
        store.insert_transaction(&Transaction::new("t2", "C", "D", 1, ts(2)), 2);
        store.insert_transaction(&Transaction::new("t3", "D", "A", 1, ts(3)), 2);

        for (from, to, _) in store.edges() {
            assert!(store.contains(&from.address));
            assert!(store.contains(&to.address));
        }
    }

    #[test]
    fn frontier_is_sorted_and_level_exact() {
        let mut store = GraphStore::with_seeds(["S"]);
        store.insert_transaction(&Transaction::new("t1", "S", "Z", 1, ts(1)), 1);
        store.insert_transaction(&Transaction::new("t2", "M", "S", 1, ts(2)), 1);
        store.insert_transaction(&Transaction::new("t3", "Z", "Q", 1, ts(3)), 2);

        let level_one: Vec<&str> = store.frontier(1).iter().map(|n| n.address.as_str()).collect();
        assert_eq!(level_one, ["M", "Z"]);
        assert_eq!(store.frontier(0).len(), 1);
        assert_eq!(store.max_level(), 2);
    }

    #[test]
    fn retain_nodes_builds_independent_induced_graph() {
        let mut store = GraphStore::with_seeds(["A", "B"]);
        store.insert_transaction(&Transaction::new("t1", "A", "C", 1, ts(1)), 1);
        store.insert_transaction(&Transaction::new("t2", "C", "B", 1, ts(2)), 1);
        store.insert_transaction(&Transaction::new("t3", "C", "D", 1, ts(3)), 2);

        let keep: HashSet<NodeIndex> = ["A", "B", "C"]
            .iter()
            .filter_map(|a| store.node_index(a))
            .collect();
        let pruned = store.retain_nodes(&keep);

        assert_eq!(pruned.node_count(), 3);
        assert_eq!(pruned.edge_count(), 2);
        assert!(!pruned.contains("D"));
        assert!(pruned.has_edge("A", "C"));
        assert_eq!(pruned.seeds(), store.seeds());
        assert_eq!(store.node_count(), 4);
    }
}
