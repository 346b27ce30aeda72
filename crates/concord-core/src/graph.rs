//! Wrapper-level connection graph.
//!
//! Every context records the connections made through its wrappers,
//! independently of what the native engine (or the offline renderer) holds.
//! Disconnect validation runs against this record. Native engines do not all
//! report a missing connection the same way, so the shim decides from its
//! own bookkeeping.
//!
//! # Architecture
//!
//! Connections are stored per source node, in insertion order. A connection
//! is identified by its full `(source, output, target)` tuple; connecting the
//! same tuple twice records it once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_PARAM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a wrapper node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Process-unique identifier of a wrapper param.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(u64);

impl ParamId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PARAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Param({})", self.0)
    }
}

/// Where a connection lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionTarget {
    /// An input of a node.
    Node {
        /// Destination node.
        id: NodeId,
        /// Destination input index.
        input: u32,
    },
    /// A param.
    Param {
        /// Destination param.
        id: ParamId,
    },
}

/// One recorded connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Connection {
    /// Source node.
    pub source: NodeId,
    /// Source output index.
    pub output: u32,
    /// Destination.
    pub target: ConnectionTarget,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            ConnectionTarget::Node { id, input } => {
                write!(f, "{}:{} → {}:{}", self.source, self.output, id, input)
            }
            ConnectionTarget::Param { id } => write!(f, "{}:{} → {}", self.source, self.output, id),
        }
    }
}

/// Selects connections leaving one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFilter {
    /// Every outgoing connection.
    All,
    /// Connections leaving `output`.
    Output(u32),
    /// Connections to a node, optionally narrowed.
    Node {
        /// Destination node.
        id: NodeId,
        /// Only this source output.
        output: Option<u32>,
        /// Only this destination input.
        input: Option<u32>,
    },
    /// Connections to a param, optionally narrowed.
    Param {
        /// Destination param.
        id: ParamId,
        /// Only this source output.
        output: Option<u32>,
    },
}

impl ConnectionFilter {
    /// True when `connection` is selected.
    pub fn matches(&self, connection: &Connection) -> bool {
        match *self {
            ConnectionFilter::All => true,
            ConnectionFilter::Output(output) => connection.output == output,
            ConnectionFilter::Node { id, output, input } => match connection.target {
                ConnectionTarget::Node {
                    id: target,
                    input: target_input,
                } => {
                    target == id
                        && output.is_none_or(|o| o == connection.output)
                        && input.is_none_or(|i| i == target_input)
                }
                ConnectionTarget::Param { .. } => false,
            },
            ConnectionFilter::Param { id, output } => {
                connection.target == ConnectionTarget::Param { id }
                    && output.is_none_or(|o| o == connection.output)
            }
        }
    }
}

/// Connections recorded for one context.
#[derive(Debug, Default)]
pub struct WrapperGraph {
    outgoing: HashMap<NodeId, Vec<Connection>>,
    edge_count: usize,
}

impl WrapperGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a connection. Returns false if it was already recorded.
    pub fn insert(&mut self, connection: Connection) -> bool {
        let edges = self.outgoing.entry(connection.source).or_default();
        if edges.contains(&connection) {
            return false;
        }
        edges.push(connection);
        self.edge_count += 1;
        true
    }

    /// Connections from `source` selected by `filter`.
    pub fn matching(&self, source: NodeId, filter: &ConnectionFilter) -> Vec<Connection> {
        self.outgoing
            .get(&source)
            .map(|edges| edges.iter().filter(|c| filter.matches(c)).copied().collect())
            .unwrap_or_default()
    }

    /// Removes connections from `source` selected by `filter` and returns them.
    pub fn remove_matching(&mut self, source: NodeId, filter: &ConnectionFilter) -> Vec<Connection> {
        let Some(edges) = self.outgoing.get_mut(&source) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        edges.retain(|c| {
            if filter.matches(c) {
                removed.push(*c);
                false
            } else {
                true
            }
        });
        if edges.is_empty() {
            self.outgoing.remove(&source);
        }
        self.edge_count -= removed.len();
        removed
    }

    /// True when the exact connection is recorded.
    pub fn contains(&self, connection: &Connection) -> bool {
        self.outgoing
            .get(&connection.source)
            .is_some_and(|edges| edges.contains(connection))
    }

    /// Connections leaving `source`, in insertion order.
    pub fn outgoing(&self, source: NodeId) -> &[Connection] {
        self.outgoing.get(&source).map_or(&[], Vec::as_slice)
    }

    /// Every recorded connection, sorted.
    pub fn connections(&self) -> Vec<Connection> {
        let mut all: Vec<_> = self.outgoing.values().flatten().copied().collect();
        all.sort_unstable();
        all
    }

    /// Number of recorded connections.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}
