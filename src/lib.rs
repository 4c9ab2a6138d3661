// Basic types used throughout txntracer
pub mod types;

// Error types for tracing and for transaction sources
pub mod error;

// Time-window derivation for expanding discovered addresses
pub mod window;

// The in-memory address/transaction multigraph built during a trace
pub mod graph_store;

// Main transaction source trait with an offline CSV connector
pub mod data_sources;
// The blockchain.info HTTP client lives in its own module
pub mod blockchain_info;

// Module for expanding the graph level by level from the seed addresses
pub mod traversal;

// Pruning the expanded graph down to paths between seed addresses
pub mod relevance;

// Types and functions for summarizing a transaction graph
pub mod summary;

// Module with export helpers (JSON snapshots, DOT)
pub mod graph_utils;

pub use error::{SourceError, TraceError};
pub use graph_store::GraphStore;
pub use relevance::filter_relevant;
pub use traversal::{StopHandle, TraceConfig, TraceReport, TraceWarning, Tracer};
pub use types::{AddressNode, EdgeKey, NodeRole, TimeRange, Transaction, TransactionEdge};
