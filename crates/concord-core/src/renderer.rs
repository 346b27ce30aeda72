//! Offline render graph.
//!
//! Offline contexts do not wire native nodes when the caller connects them.
//! Connections are recorded on per-node and per-param [`Renderer`]s instead,
//! and the native graph is built from them only when rendering starts. That
//! gives the shim one place to look at the whole graph before any audio is
//! produced. It uses that place to silence cycles.
//!
//! # Architecture
//!
//! All renderers of one context live in a shared [`RenderGraph`] arena and
//! are addressed by [`RendererId`]. An edge is stored on its *destination*
//! renderer as `(source, output, input)`; param renderers have no input
//! index. A param renderer also remembers the node that owns the param,
//! which matters for cycles: a node feeding its own gain param through a
//! chain is a cycle even though no node input is involved.
//!
//! `wire` does not check for cycles. Cycles are legal to build and are
//! resolved by [`RenderGraph::plan`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::native::{NativeNodeRef, NativeParamRef};

/// Index of a renderer in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RendererId(u32);

impl RendererId {
    /// Position in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RendererId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Renderer({})", self.0)
    }
}

/// An incoming edge recorded on a destination renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderEdge {
    /// Source renderer (always a node).
    pub source: RendererId,
    /// Source output index.
    pub output: u32,
    /// Destination input index, `None` for params.
    pub input: Option<u32>,
}

/// What a renderer stands for.
#[derive(Clone)]
pub enum RenderTarget {
    /// A node.
    Node(NativeNodeRef),
    /// A param, with the renderer of the node that owns it.
    Param {
        /// Native param.
        native: NativeParamRef,
        /// Renderer of the owning node.
        owner: RendererId,
    },
}

struct RenderNode {
    target: RenderTarget,
    inputs: Vec<RenderEdge>,
}

/// Arena of renderers for one offline context.
#[derive(Default)]
pub struct RenderGraph {
    nodes: Vec<RenderNode>,
}

/// Shared handle to a render graph.
pub type SharedRenderGraph = Arc<Mutex<RenderGraph>>;

/// Edges to build natively and renderers whose output is silenced.
#[derive(Debug, Default, Clone)]
pub struct RenderPlan {
    /// `(destination, edge)` pairs to wire, in arena order.
    pub edges: Vec<(RendererId, RenderEdge)>,
    /// Renderers that belong to a cycle.
    pub muted: BTreeSet<RendererId>,
}

impl RenderGraph {
    /// Creates an empty shared graph.
    pub fn shared() -> SharedRenderGraph {
        Arc::new(Mutex::new(Self::default()))
    }

    fn push(&mut self, target: RenderTarget) -> RendererId {
        let id = RendererId(self.nodes.len() as u32);
        self.nodes.push(RenderNode {
            target,
            inputs: Vec::new(),
        });
        id
    }

    /// Number of renderers.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no renderer exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// What `id` renders.
    pub fn target(&self, id: RendererId) -> &RenderTarget {
        &self.nodes[id.index()].target
    }

    /// Incoming edges of `id`.
    pub fn inputs(&self, id: RendererId) -> &[RenderEdge] {
        &self.nodes[id.index()].inputs
    }

    /// Dependency edges `(from, to)`: sources feed destinations, params feed
    /// their owner.
    fn dependencies(&self) -> Vec<(usize, usize)> {
        let mut deps = Vec::new();
        for (to, node) in self.nodes.iter().enumerate() {
            deps.extend(node.inputs.iter().map(|edge| (edge.source.index(), to)));
            if let RenderTarget::Param { owner, .. } = node.target {
                deps.push((to, owner.index()));
            }
        }
        deps
    }

    /// Builds the native wiring plan.
    ///
    /// With `mute_cycles` set, every renderer in a cycle is muted and its
    /// outgoing edges are left out, so nothing downstream of a cycle hears
    /// it.
    pub fn plan(&self, mute_cycles: bool) -> RenderPlan {
        let muted: BTreeSet<RendererId> = if mute_cycles {
            cycle_members(self.nodes.len(), &self.dependencies())
                .into_iter()
                .enumerate()
                .filter(|&(_, cyclic)| cyclic)
                .map(|(i, _)| RendererId(i as u32))
                .collect()
        } else {
            BTreeSet::new()
        };

        let edges = self
            .nodes
            .iter()
            .enumerate()
            .flat_map(|(i, node)| {
                node.inputs
                    .iter()
                    .map(move |edge| (RendererId(i as u32), *edge))
            })
            .filter(|(_, edge)| !muted.contains(&edge.source))
            .collect();

        #[cfg(feature = "tracing")]
        {
            if !muted.is_empty() {
                tracing::debug!(muted = muted.len(), "render_plan_muted_cycles");
            }
        }

        RenderPlan { edges, muted }
    }
}

/// Marks every vertex that lies on a cycle, self-loops included.
///
/// Tarjan's strongly connected components over `node_count` vertices and the
/// given `(from, to)` edges. Iterative, so deep chains do not exhaust the
/// stack.
pub fn cycle_members(node_count: usize, edges: &[(usize, usize)]) -> Vec<bool> {
    let mut successors = vec![Vec::new(); node_count];
    let mut self_loop = vec![false; node_count];
    for &(from, to) in edges {
        if from < node_count && to < node_count {
            successors[from].push(to);
            if from == to {
                self_loop[from] = true;
            }
        }
    }

    const UNVISITED: usize = usize::MAX;
    let mut index = vec![UNVISITED; node_count];
    let mut lowlink = vec![0; node_count];
    let mut on_stack = vec![false; node_count];
    let mut stack = Vec::new();
    let mut cyclic = vec![false; node_count];
    let mut next_index = 0;

    for root in 0..node_count {
        if index[root] != UNVISITED {
            continue;
        }
        // (vertex, next successor position)
        let mut work = vec![(root, 0_usize)];
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;

        while let Some(frame) = work.last_mut() {
            let v = frame.0;
            if let Some(&w) = successors[v].get(frame.1) {
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    work.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if lowlink[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                if component.len() > 1 || self_loop[v] {
                    for w in component {
                        cyclic[w] = true;
                    }
                }
            }
        }
    }
    cyclic
}

/// Handle to one node or param in a render graph.
#[derive(Clone)]
pub struct Renderer {
    graph: SharedRenderGraph,
    id: RendererId,
}

impl Renderer {
    /// Adds a node renderer to `graph`.
    pub fn for_node(graph: &SharedRenderGraph, native: NativeNodeRef) -> Self {
        let id = graph.lock().push(RenderTarget::Node(native));
        Self {
            graph: Arc::clone(graph),
            id,
        }
    }

    /// Adds a param renderer owned by `owner` to its graph.
    pub fn for_param(owner: &Renderer, native: NativeParamRef) -> Self {
        let id = owner.graph.lock().push(RenderTarget::Param {
            native,
            owner: owner.id,
        });
        Self {
            graph: Arc::clone(&owner.graph),
            id,
        }
    }

    /// Id within the graph.
    pub fn id(&self) -> RendererId {
        self.id
    }

    /// The graph this renderer belongs to.
    pub fn graph(&self) -> &SharedRenderGraph {
        &self.graph
    }

    /// True when both renderers live in the same graph.
    pub fn same_graph(&self, other: &Renderer) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph)
    }

    /// True for param renderers.
    pub fn is_param(&self) -> bool {
        matches!(self.graph.lock().target(self.id), RenderTarget::Param { .. })
    }

    /// Records an edge from `source` into this renderer. Duplicates are ignored.
    pub fn wire(&self, source: &Renderer, output: u32, input: Option<u32>) {
        let edge = RenderEdge {
            source: source.id,
            output,
            input,
        };
        let mut graph = self.graph.lock();
        let inputs = &mut graph.nodes[self.id.index()].inputs;
        if !inputs.contains(&edge) {
            inputs.push(edge);
        }
    }

    /// Removes every edge from `source`. Returns how many were removed.
    pub fn unwire(&self, source: &Renderer) -> usize {
        self.unwire_matching(source, None, None)
    }

    /// Removes edges from `source`, optionally narrowed by output and input.
    pub fn unwire_matching(&self, source: &Renderer, output: Option<u32>, input: Option<u32>) -> usize {
        let mut graph = self.graph.lock();
        let inputs = &mut graph.nodes[self.id.index()].inputs;
        let before = inputs.len();
        inputs.retain(|edge| {
            !(edge.source == source.id
                && output.is_none_or(|o| o == edge.output)
                && input.is_none_or(|i| Some(i) == edge.input))
        });
        before - inputs.len()
    }

    /// True when at least one edge from `source` is recorded here.
    pub fn is_wired_from(&self, source: &Renderer) -> bool {
        self.graph
            .lock()
            .inputs(self.id)
            .iter()
            .any(|edge| edge.source == source.id)
    }

    /// Incoming edges.
    pub fn inputs(&self) -> Vec<RenderEdge> {
        self.graph.lock().inputs(self.id).to_vec()
    }
}

impl PartialEq for Renderer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.same_graph(other)
    }
}

impl Eq for Renderer {}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Renderer").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(count: usize, edges: &[(usize, usize)]) -> Vec<usize> {
        cycle_members(count, edges)
            .into_iter()
            .enumerate()
            .filter_map(|(i, c)| c.then_some(i))
            .collect()
    }

    #[test]
    fn acyclic_graph_has_no_members() {
        assert!(members(4, &[(0, 1), (1, 2), (0, 2), (2, 3)]).is_empty());
    }

    #[test]
    fn finds_simple_cycle() {
        assert_eq!(members(4, &[(0, 1), (1, 2), (2, 1), (2, 3)]), vec![1, 2]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        assert_eq!(members(3, &[(0, 1), (1, 1)]), vec![1]);
    }

    #[test]
    fn separate_cycles() {
        assert_eq!(
            members(6, &[(0, 1), (1, 0), (2, 3), (3, 4), (4, 2), (4, 5)]),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let n = 100_000;
        let edges: Vec<_> = (0..n - 1).map(|i| (i, i + 1)).collect();
        assert!(members(n, &edges).is_empty());
    }

    #[test]
    fn out_of_range_edges_are_ignored() {
        assert!(members(2, &[(0, 5), (7, 1)]).is_empty());
    }
}
