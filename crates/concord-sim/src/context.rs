//! Simulated contexts.
//!
//! Every node of a context lives in one arena of [`NodeSlot`]s. Edges are
//! stored on their source slot and name destinations by arena index, so the
//! graph can hold cycles without reference cycles.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use concord_config::QuirkProfile;
use concord_core::{
    AudioBuffer, ContextState, NativeContext, NativeError, NativeListener, NativeNode,
    NativeNodeRef, NodeKind, RenderFuture,
};
use parking_lot::Mutex;

use crate::listeners::Listeners;
use crate::node::SimNode;
use crate::param::{ParamSpec, SimParam};
use crate::render::{Evaluator, SourceSchedule};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Largest channel count a simulated context accepts.
pub const MAX_CHANNELS: u32 = 32;

/// One edge leaving a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEdge {
    /// Into an input of a node.
    Node {
        /// Arena index of the destination node.
        destination: usize,
        /// Source output.
        output: u32,
        /// Destination input.
        input: u32,
    },
    /// Into a param.
    Param {
        /// Arena index of the node owning the param.
        owner: usize,
        /// Position of the param on its node.
        param: usize,
        /// Source output.
        output: u32,
    },
}

impl SimEdge {
    /// Source output the edge leaves from.
    pub fn output(&self) -> u32 {
        match *self {
            SimEdge::Node { output, .. } | SimEdge::Param { output, .. } => output,
        }
    }

    /// Arena index of the node the edge ends at (the param owner for param
    /// edges).
    pub fn target_node(&self) -> usize {
        match *self {
            SimEdge::Node { destination, .. } => destination,
            SimEdge::Param { owner, .. } => owner,
        }
    }
}

/// Arena entry for one node.
pub(crate) struct NodeSlot {
    pub(crate) kind: NodeKind,
    pub(crate) edges: Vec<SimEdge>,
    pub(crate) params: Vec<Arc<SimParam>>,
    pub(crate) schedule: SourceSchedule,
    pub(crate) node: Weak<SimNode>,
}

/// State shared by a context and everything created in it.
pub(crate) struct ContextShared {
    id: u64,
    profile: QuirkProfile,
    sample_rate: f32,
    offline: Option<(u32, usize)>,
    state: Mutex<ContextState>,
    frames: AtomicU64,
    pub(crate) slots: Mutex<Vec<NodeSlot>>,
}

impl ContextShared {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn profile(&self) -> &QuirkProfile {
        &self.profile
    }

    pub(crate) fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub(crate) fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / f64::from(self.sample_rate)
    }

    pub(crate) fn create_node(self: &Arc<Self>, kind: NodeKind) -> Result<Arc<SimNode>, NativeError> {
        match kind {
            NodeKind::Processor { inputs, outputs } => {
                if inputs > self.profile.max_processor_inputs {
                    return Err(NativeError::not_supported(format!(
                        "processors accept at most {} inputs, {inputs} requested",
                        self.profile.max_processor_inputs
                    )));
                }
                if inputs == 0 && outputs == 0 {
                    return Err(NativeError::not_supported(
                        "a processor needs at least one input or output",
                    ));
                }
            }
            NodeKind::ChannelMerger { inputs } if inputs == 0 || inputs > MAX_CHANNELS => {
                return Err(NativeError::index_size(format!(
                    "merger inputs {inputs} outside 1..={MAX_CHANNELS}"
                )));
            }
            _ => {}
        }

        let nyquist = self.sample_rate / 2.0;
        let mut slots = self.slots.lock();
        let index = slots.len();
        let params: Vec<Arc<SimParam>> = kind
            .param_names()
            .iter()
            .enumerate()
            .map(|(i, &name)| {
                Arc::new(SimParam::new(
                    self,
                    index,
                    i,
                    ParamSpec::for_param(kind, name, nyquist),
                ))
            })
            .collect();
        let node = SimNode::new(Arc::clone(self), index, kind, params.clone());
        slots.push(NodeSlot {
            kind,
            edges: Vec::new(),
            params,
            schedule: SourceSchedule::default(),
            node: Arc::downgrade(&node),
        });
        drop(slots);

        tracing::debug!(context = self.id, index, kind = %kind, "sim_node_created");
        Ok(node)
    }

    /// Renders `frames` frames starting at the current time and advances
    /// the clock. Returns the destination signal and the sources that ended.
    fn process(&self, frames: usize) -> (Vec<f32>, Vec<(Weak<SimNode>, f64)>) {
        let start_frame = self.frames.load(Ordering::Acquire);
        let evaluator = Evaluator::new(&self.slots.lock());
        let rate = f64::from(self.sample_rate);
        let samples = (0..frames)
            .map(|i| evaluator.frame((start_frame + i as u64) as f64 / rate))
            .collect();
        let end_frame = start_frame + frames as u64;
        self.frames.store(end_frame, Ordering::Release);

        let end_time = end_frame as f64 / rate;
        let mut ended = Vec::new();
        for slot in self.slots.lock().iter_mut() {
            if let Some(stop) = slot.schedule.take_ended(end_time) {
                ended.push((Weak::clone(&slot.node), stop));
            }
        }
        (samples, ended)
    }
}

fn fire_ended(ended: Vec<(Weak<SimNode>, f64)>) {
    for (node, time) in ended {
        if let Some(node) = node.upgrade() {
            node.fire_at("ended", time);
        }
    }
}

/// A simulated live or offline context.
pub struct SimContext {
    shared: Arc<ContextShared>,
    destination: Arc<SimNode>,
    listeners: Listeners,
    this: Weak<SimContext>,
}

impl SimContext {
    pub(crate) fn create(
        profile: QuirkProfile,
        sample_rate: f32,
        offline: Option<(u32, usize)>,
    ) -> Result<Arc<Self>, NativeError> {
        let shared = Arc::new(ContextShared {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            profile,
            sample_rate,
            offline,
            state: Mutex::new(if offline.is_some() {
                ContextState::Suspended
            } else {
                ContextState::Running
            }),
            frames: AtomicU64::new(0),
            slots: Mutex::new(Vec::new()),
        });
        let destination = shared.create_node(NodeKind::Destination)?;
        if let Some((channels, _)) = offline {
            destination.set_channel_count(channels)?;
        }

        tracing::debug!(
            context = shared.id,
            profile = shared.profile.name.as_str(),
            sample_rate,
            offline = offline.is_some(),
            "sim_context_created"
        );

        Ok(Arc::new_cyclic(|this| Self {
            shared,
            destination,
            listeners: Listeners::default(),
            this: Weak::clone(this),
        }))
    }

    /// Recovers a simulated context.
    pub fn downcast(context: &dyn NativeContext) -> Option<&SimContext> {
        context.as_any().downcast_ref::<SimContext>()
    }

    /// Unique id of this context.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// The quirks this context exhibits.
    pub fn profile(&self) -> &QuirkProfile {
        &self.shared.profile
    }

    /// Number of nodes created, destination included.
    pub fn node_count(&self) -> usize {
        self.shared.slots.lock().len()
    }

    /// Number of native edges.
    pub fn edge_count(&self) -> usize {
        self.shared
            .slots
            .lock()
            .iter()
            .map(|slot| slot.edges.len())
            .sum()
    }

    /// True when `source` has an edge into any input of `destination`.
    pub fn is_connected(&self, source: &dyn NativeNode, destination: &dyn NativeNode) -> bool {
        let (Some(source), Some(destination)) =
            (SimNode::downcast(source), SimNode::downcast(destination))
        else {
            return false;
        };
        if source.context_id() != self.id() || destination.context_id() != self.id() {
            return false;
        }
        source.edges().iter().any(|edge| {
            matches!(edge, SimEdge::Node { destination: d, .. } if *d == destination.index())
        })
    }

    /// Number of listeners for `event_type` on the context.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners.count(event_type)
    }

    /// Renders `frames` frames of a running live context and returns the
    /// destination signal. A live context that is not running produces
    /// silence and its clock stands still.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        if self.shared.offline.is_some() || *self.shared.state.lock() != ContextState::Running {
            return vec![0.0; frames];
        }
        let (samples, ended) = self.shared.process(frames);
        fire_ended(ended);
        samples
    }

    fn dispatch(&self, event_type: &str) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let target: Arc<dyn Any + Send + Sync> = this;
        self.listeners
            .dispatch(event_type, self.shared.current_time(), target);
    }

    fn transition(&self, to: ContextState) -> Result<(), NativeError> {
        if self.shared.offline.is_some() {
            return Err(NativeError::not_supported(
                "offline contexts are driven by start_rendering",
            ));
        }
        let changed = {
            let mut state = self.shared.state.lock();
            if *state == ContextState::Closed {
                return Err(NativeError::invalid_state("the context is closed"));
            }
            let changed = *state != to;
            *state = to;
            changed
        };
        if changed {
            tracing::debug!(context = self.shared.id, state = ?to, "sim_context_state");
            self.dispatch("statechange");
        }
        Ok(())
    }
}

impl NativeContext for SimContext {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_offline(&self) -> bool {
        self.shared.offline.is_some()
    }

    fn sample_rate(&self) -> f32 {
        self.shared.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.shared.current_time()
    }

    fn state(&self) -> ContextState {
        *self.shared.state.lock()
    }

    fn destination(&self) -> NativeNodeRef {
        self.destination.clone()
    }

    fn create_node(&self, kind: &NodeKind) -> Result<NativeNodeRef, NativeError> {
        if *kind == NodeKind::Destination {
            return Err(NativeError::not_supported("a context has exactly one destination"));
        }
        let node: NativeNodeRef = self.shared.create_node(*kind)?;
        Ok(node)
    }

    fn resume(&self) -> Result<(), NativeError> {
        self.transition(ContextState::Running)
    }

    fn suspend(&self) -> Result<(), NativeError> {
        self.transition(ContextState::Suspended)
    }

    fn close(&self) -> Result<(), NativeError> {
        self.transition(ContextState::Closed)
    }

    fn start_rendering(&self) -> RenderFuture {
        let this = self.this.upgrade();
        Box::pin(async move {
            let Some(this) = this else {
                return Err(NativeError::invalid_state("the context is gone"));
            };
            let Some((channels, length)) = this.shared.offline else {
                return Err(NativeError::not_supported(
                    "only offline contexts can render",
                ));
            };
            {
                let mut state = this.shared.state.lock();
                if *state != ContextState::Suspended {
                    return Err(NativeError::invalid_state("rendering already started"));
                }
                *state = ContextState::Running;
            }

            // Rendering completes asynchronously, as it does natively.
            tokio::task::yield_now().await;

            let (samples, ended) = this.shared.process(length);
            *this.shared.state.lock() = ContextState::Closed;
            fire_ended(ended);

            tracing::debug!(context = this.shared.id, length, channels, "sim_render_complete");
            this.dispatch("complete");

            let channels = vec![samples; channels as usize];
            Ok(AudioBuffer::new(this.shared.sample_rate, channels))
        })
    }

    fn add_event_listener(&self, event_type: &str, listener: NativeListener) {
        self.listeners.add(event_type, listener);
    }

    fn remove_event_listener(&self, event_type: &str, listener: &NativeListener) {
        self.listeners.remove(event_type, listener);
    }

    fn set_event_handler(&self, event_type: &str, handler: Option<NativeListener>) {
        self.listeners.set_handler(event_type, handler);
    }
}
