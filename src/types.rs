use chrono::{DateTime, Utc};
use petgraph::{Directed, graph::Graph};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

///
/// TraceGraph
///
/// The graph is a directed multigraph where the nodes are addresses and the edges are
/// transactions between them. For edges, see `TransactionEdge`.
pub type TraceGraph = Graph<AddressNode, TransactionEdge, Directed>;

///
/// NodeRole
///
/// A node is a `Seed` iff it was part of the user's input list. Roles never change.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Seed,
    Discovered,
}

impl Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Seed => write!(f, "seed"),
            NodeRole::Discovered => write!(f, "discovered"),
        }
    }
}

///
/// AddressNode
///
/// `discovery_level` is the first level the address was reached at (0 for seeds) and
/// `anchor` is the timestamp of the transaction that introduced it. Both are written once,
/// at insertion.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressNode {
    pub address: String,
    pub role: NodeRole,
    pub discovery_level: usize,
    pub anchor: Option<DateTime<Utc>>,
}

impl AddressNode {
    pub fn seed(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            role: NodeRole::Seed,
            discovery_level: 0,
            anchor: None,
        }
    }

    pub fn discovered(address: impl Into<String>, level: usize, anchor: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            role: NodeRole::Discovered,
            discovery_level: level,
            anchor: Some(anchor),
        }
    }

    pub fn is_seed(&self) -> bool {
        self.role == NodeRole::Seed
    }
}

impl Display for AddressNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AddressNode {{ address: {}, role: {}, discovery_level: {} }}",
            self.address, self.role, self.discovery_level
        )
    }
}

///
/// Transaction
///
/// A single directed movement of funds from one address to another, as reported by a
/// `TransactionSource`. One on-chain transaction with several inputs and outputs shows up
/// as several `Transaction`s sharing a `txid`.
///
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    pub from: String,
    pub to: String,
    /// Everything the transaction paid `to`, in base units.
    ///
    /// Not the share `from` contributed: inputs are not tied to outputs, so when several
    /// senders fund the same receiver each of their `Transaction`s carries this same total.
    /// Summing amounts across senders of one `txid` overstates the value moved.
    pub amount: u64,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        txid: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            txid: txid.into(),
            from: from.into(),
            to: to.into(),
            amount,
            timestamp,
        }
    }

    pub fn touches(&self, address: &str) -> bool {
        self.from == address || self.to == address
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            txid: self.txid.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

impl Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transaction {{ txid: {}, from: {}, to: {}, amount: {}, timestamp: {} }}",
            self.txid, self.from, self.to, self.amount, self.timestamp
        )
    }
}

///
/// TransactionEdge
///
/// The edge payload stored in the graph. Endpoints live on the graph itself.
///
#[derive(Clone, PartialEq, Eq)]
pub struct TransactionEdge {
    pub txid: String,
    pub amount: u64,
    pub timestamp: DateTime<Utc>,
}

impl Debug for TransactionEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TransactionEdge {{ txid: {}, amount: {}, timestamp: {} }}",
            self.txid, self.amount, self.timestamp
        )
    }
}

impl Display for TransactionEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} @ {})", self.txid, self.amount, self.timestamp)
    }
}

/// Identity of an edge in the multigraph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub txid: String,
    pub from: String,
    pub to: String,
}

///
/// TimeRange
///
/// Inclusive on both ends; a missing bound is open (beginning of history / latest available).
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| start <= t) && self.end.is_none_or(|end| t <= end)
    }
}

impl Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.start {
            Some(start) => write!(f, "[{}, ", start.to_rfc3339())?,
            None => write!(f, "[-inf, ")?,
        }
        match self.end {
            Some(end) => write!(f, "{}]", end.to_rfc3339()),
            None => write!(f, "+inf]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn time_range_bounds_are_inclusive() {
        let start = Utc.with_ymd_and_hms(2020, 6, 8, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 6, 22, 0, 0, 0).unwrap();
        let range = TimeRange::new(Some(start), Some(end));

        assert!(range.contains(start));
        assert!(range.contains(end));
        assert!(!range.contains(end + chrono::Duration::seconds(1)));
        assert!(!range.contains(start - chrono::Duration::seconds(1)));
    }

    #[test]
    fn open_range_contains_everything() {
        let range = TimeRange::unbounded();
        assert!(range.contains(DateTime::<Utc>::UNIX_EPOCH));
        assert!(range.contains(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn transaction_touches_both_endpoints() {
        let tx = Transaction::new("t1", "A", "B", 10, DateTime::<Utc>::UNIX_EPOCH);
        assert!(tx.touches("A"));
        assert!(tx.touches("B"));
        assert!(!tx.touches("a"));
    }
}
