//! Selective disconnect on engines that only know "disconnect everything".
//!
//! The ledger records every native edge a node makes. A selective disconnect
//! then becomes a bare `disconnect()` followed by reconnecting every edge
//! that was not selected.

use parking_lot::Mutex;

use crate::error::NativeError;
use crate::native::{
    NativeNode, NativeNodeRef, NativeParamRef, same_native_node, same_native_param,
};

/// One native edge leaving the adapted node.
#[derive(Clone)]
pub(crate) enum NativeEdge {
    Node {
        destination: NativeNodeRef,
        output: u32,
        input: u32,
    },
    Param {
        destination: NativeParamRef,
        output: u32,
    },
}

impl NativeEdge {
    pub(crate) fn output(&self) -> u32 {
        match self {
            NativeEdge::Node { output, .. } | NativeEdge::Param { output, .. } => *output,
        }
    }

    pub(crate) fn targets_node(&self, node: &NativeNodeRef) -> bool {
        matches!(self, NativeEdge::Node { destination, .. } if same_native_node(destination.as_ref(), node.as_ref()))
    }

    pub(crate) fn targets_param(&self, param: &NativeParamRef) -> bool {
        matches!(self, NativeEdge::Param { destination, .. } if same_native_param(destination.as_ref(), param.as_ref()))
    }

    fn same_edge(&self, other: &NativeEdge) -> bool {
        match (self, other) {
            (
                NativeEdge::Node {
                    destination,
                    output,
                    input,
                },
                NativeEdge::Node {
                    output: o,
                    input: i,
                    ..
                },
            ) => output == o && input == i && other.targets_node(destination),
            (NativeEdge::Param { destination, output }, NativeEdge::Param { output: o, .. }) => {
                output == o && other.targets_param(destination)
            }
            _ => false,
        }
    }

    fn reconnect(&self, source: &dyn NativeNode) -> Result<(), NativeError> {
        match self {
            NativeEdge::Node {
                destination,
                output,
                input,
            } => source.connect(destination, *output, *input),
            NativeEdge::Param {
                destination,
                output,
            } => source.connect_param(destination, *output),
        }
    }
}

/// Native edges of one node.
#[derive(Default)]
pub(crate) struct EdgeLedger {
    edges: Mutex<Vec<NativeEdge>>,
}

impl EdgeLedger {
    pub(crate) fn record(&self, edge: NativeEdge) {
        let mut edges = self.edges.lock();
        if !edges.iter().any(|e| e.same_edge(&edge)) {
            edges.push(edge);
        }
    }

    pub(crate) fn clear(&self) {
        self.edges.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.edges.lock().len()
    }

    /// Removes the edges `selected` picks by disconnecting `source` entirely
    /// and reconnecting the rest. Returns how many edges were removed.
    ///
    /// If a reconnect fails, the ledger keeps only the edges that were
    /// rewired before the failure.
    pub(crate) fn disconnect_where(
        &self,
        source: &dyn NativeNode,
        selected: impl Fn(&NativeEdge) -> bool,
    ) -> Result<usize, NativeError> {
        let snapshot = self.edges.lock().clone();
        let (removed, kept): (Vec<_>, Vec<_>) = snapshot.into_iter().partition(|e| selected(e));
        if removed.is_empty() {
            return Ok(0);
        }

        source.disconnect()?;
        let mut rewired = Vec::with_capacity(kept.len());
        for edge in kept {
            if let Err(err) = edge.reconnect(source) {
                *self.edges.lock() = rewired;
                return Err(err);
            }
            rewired.push(edge);
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(
            removed = removed.len(),
            rewired = rewired.len(),
            "selective_disconnect_emulated"
        );

        *self.edges.lock() = rewired;
        Ok(removed.len())
    }
}
