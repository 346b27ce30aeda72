//! Node wrapper.
//!
//! An [`AudioNode`] is what callers hold. It carries no native reference of
//! its own: the native node, and for offline contexts the renderer, are
//! found through the identity stores. Connection methods hand off to the
//! [`router`](crate::router).

use std::fmt;
use std::sync::{Arc, Weak};

use crate::capability::{self, create_processor};
use crate::context::{Context, ContextInner};
use crate::error::{AudioError, Result};
use crate::event::{EventBridge, EventListener, EventTarget};
use crate::graph::NodeId;
use crate::identity::{WeakKey, lost_association, stores};
use crate::native::{ChannelCountMode, ChannelInterpretation, NativeNodeRef, NativeParamRef, NodeKind};
use crate::param::AudioParam;
use crate::renderer::Renderer;
use crate::router::{self, DisconnectTarget};

/// Largest channel count a node accepts.
pub const MAX_CHANNEL_COUNT: u32 = 32;

/// How a node reaches its context.
///
/// The destination is owned by its context, so it links back weakly to keep
/// the pair from owning each other.
pub(crate) enum ContextLink {
    Strong(Context),
    Weak(Weak<ContextInner>),
}

impl ContextLink {
    fn get(&self) -> Context {
        match self {
            ContextLink::Strong(context) => context.clone(),
            ContextLink::Weak(inner) => match Context::upgrade(inner) {
                Some(context) => context,
                None => lost_association("destination context"),
            },
        }
    }
}

/// Shared state behind an [`AudioNode`] handle.
pub struct NodeInner {
    id: NodeId,
    kind: NodeKind,
    context: ContextLink,
    inputs: u32,
    outputs: u32,
    params: Vec<AudioParam>,
    events: EventBridge<AudioNode>,
}

/// Handle to a node of the audio graph.
///
/// Clones share identity; equality is identity.
#[derive(Clone)]
pub struct AudioNode {
    inner: Arc<NodeInner>,
}

/// Non-owning handle to an [`AudioNode`].
#[derive(Clone)]
pub struct WeakAudioNode(Weak<NodeInner>);

impl WeakAudioNode {
    /// The node, if it is still alive.
    pub fn upgrade(&self) -> Option<AudioNode> {
        self.0.upgrade().map(|inner| AudioNode { inner })
    }
}

impl WeakKey for AudioNode {
    type Target = NodeInner;

    fn key_arc(&self) -> &Arc<NodeInner> {
        &self.inner
    }
}

impl EventTarget for AudioNode {
    type Handle = WeakAudioNode;

    fn downgrade(&self) -> WeakAudioNode {
        AudioNode::downgrade(self)
    }

    fn upgrade(handle: &WeakAudioNode) -> Option<Self> {
        handle.upgrade()
    }
}

impl AudioNode {
    /// Creates a node of `kind` in `context`.
    ///
    /// Processors with more inputs than the engine supports are built as a
    /// composite. Adapters are installed according to the context's
    /// capabilities.
    pub fn new(context: &Context, kind: NodeKind) -> Result<Self> {
        if kind == NodeKind::Destination {
            return Err(AudioError::not_supported(
                "the destination is created by its context",
            ));
        }
        context.ensure_open()?;

        let native_context = context.native();
        let native = match kind {
            NodeKind::Processor { inputs, outputs } => create_processor(
                native_context.as_ref(),
                inputs,
                outputs,
                context.capabilities().needs_composite(inputs),
            )?,
            _ => native_context.create_node(&kind)?,
        };
        Self::register(ContextLink::Strong(context.clone()), context, kind, native)
    }

    /// Wraps `native`, installs adapters and registers every association.
    pub(crate) fn register(
        link: ContextLink,
        context: &Context,
        kind: NodeKind,
        native: NativeNodeRef,
    ) -> Result<Self> {
        let capabilities = context.capabilities();
        let native = capability::adapt_node(native, &capabilities);
        let id = NodeId::next();

        let mut native_params = Vec::with_capacity(kind.param_names().len());
        for &name in kind.param_names() {
            let param = native.param(name).ok_or_else(|| {
                AudioError::not_supported(format!("native {kind} has no `{name}` param"))
            })?;
            native_params.push((name, capability::adapt_param(param, &capabilities)));
        }
        let params: Vec<AudioParam> = native_params
            .iter()
            .map(|(name, param)| {
                AudioParam::register(context, id, *name, NativeParamRef::clone(param))
            })
            .collect();

        let node = Self {
            inner: Arc::new(NodeInner {
                id,
                kind,
                context: link,
                inputs: native.number_of_inputs(),
                outputs: native.number_of_outputs(),
                params,
                events: EventBridge::new(),
            }),
        };

        let stores = stores();
        stores.node_natives.set(&node, NativeNodeRef::clone(&native));
        if let Some(render_graph) = context.render_graph() {
            let renderer = Renderer::for_node(render_graph, native);
            for (param, (_, native_param)) in node.inner.params.iter().zip(native_params) {
                stores
                    .param_renderers
                    .set(param, Renderer::for_param(&renderer, native_param));
            }
            stores.node_renderers.set(&node, renderer);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(node = %id, kind = %kind, params = node.inner.params.len(), "node_created");

        Ok(node)
    }

    /// Stable id used by the context's connection graph.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// What kind of node this is.
    pub fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    /// The owning context. Never changes.
    pub fn context(&self) -> Context {
        self.inner.context.get()
    }

    /// Number of inputs.
    pub fn number_of_inputs(&self) -> u32 {
        self.inner.inputs
    }

    /// Number of outputs.
    pub fn number_of_outputs(&self) -> u32 {
        self.inner.outputs
    }

    /// Automatable params, in creation order.
    pub fn params(&self) -> &[AudioParam] {
        &self.inner.params
    }

    /// Looks up a param by name.
    pub fn param(&self, name: &str) -> Option<AudioParam> {
        self.inner.params.iter().find(|p| p.name() == name).cloned()
    }

    /// The (possibly adapted) native node.
    pub fn native(&self) -> NativeNodeRef {
        stores().node_natives.require(self)
    }

    /// Returns a non-owning handle.
    pub fn downgrade(&self) -> WeakAudioNode {
        WeakAudioNode(Arc::downgrade(&self.inner))
    }

    /// True when both handles are the same node.
    pub fn ptr_eq(&self, other: &AudioNode) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // -- connections --

    /// Connects `output` of this node to `input` of `destination`.
    /// Returns `destination` for chaining.
    pub fn connect(&self, destination: &AudioNode, output: u32, input: u32) -> Result<AudioNode> {
        router::connect(self, destination, output, input)
    }

    /// Connects `output` of this node to a param.
    pub fn connect_param(&self, destination: &AudioParam, output: u32) -> Result<()> {
        router::connect_param(self, destination, output)
    }

    /// Removes the connections `target` selects.
    pub fn disconnect(&self, target: DisconnectTarget<'_>) -> Result<()> {
        router::disconnect(self, target)
    }

    /// Removes every outgoing connection.
    pub fn disconnect_all(&self) -> Result<()> {
        router::disconnect(self, DisconnectTarget::All)
    }

    // -- channel configuration --

    /// Channel count.
    pub fn channel_count(&self) -> u32 {
        self.native().channel_config().count
    }

    /// Sets the channel count. Zero or more than 32 is not supported.
    pub fn set_channel_count(&self, count: u32) -> Result<()> {
        if count == 0 || count > MAX_CHANNEL_COUNT {
            return Err(AudioError::not_supported(format!(
                "channel count {count} outside 1..={MAX_CHANNEL_COUNT}"
            )));
        }
        Ok(self.native().set_channel_count(count)?)
    }

    /// Channel count mode.
    pub fn channel_count_mode(&self) -> ChannelCountMode {
        self.native().channel_config().mode
    }

    /// Sets the channel count mode.
    pub fn set_channel_count_mode(&self, mode: ChannelCountMode) -> Result<()> {
        Ok(self.native().set_channel_count_mode(mode)?)
    }

    /// Channel interpretation.
    pub fn channel_interpretation(&self) -> ChannelInterpretation {
        self.native().channel_config().interpretation
    }

    /// Sets the channel interpretation.
    pub fn set_channel_interpretation(&self, interpretation: ChannelInterpretation) -> Result<()> {
        Ok(self.native().set_channel_interpretation(interpretation)?)
    }

    // -- sources and filters --

    /// Starts a source node at `when` seconds.
    pub fn start(&self, when: f64) -> Result<()> {
        if !when.is_finite() || when < 0.0 {
            return Err(AudioError::range(format!("start time {when} is invalid")));
        }
        Ok(self.native().start(when)?)
    }

    /// Stops a source node at `when` seconds.
    pub fn stop(&self, when: f64) -> Result<()> {
        if !when.is_finite() || when < 0.0 {
            return Err(AudioError::range(format!("stop time {when} is invalid")));
        }
        Ok(self.native().stop(when)?)
    }

    /// Fills magnitude and phase response at `frequencies`.
    ///
    /// All three slices must have the same length.
    pub fn get_frequency_response(
        &self,
        frequencies: &[f32],
        magnitude: &mut [f32],
        phase: &mut [f32],
    ) -> Result<()> {
        Ok(self
            .native()
            .get_frequency_response(frequencies, magnitude, phase)?)
    }

    // -- events --

    /// Adds a listener for `event_type`. Adding the same listener twice
    /// registers it once.
    pub fn add_event_listener(&self, event_type: &str, listener: EventListener<AudioNode>) {
        if let Some(native) = self.inner.events.wrap(self, Some(listener)) {
            self.native().add_event_listener(event_type, native);
        }
    }

    /// Removes a listener added with [`add_event_listener`](Self::add_event_listener).
    pub fn remove_event_listener(&self, event_type: &str, listener: &EventListener<AudioNode>) {
        if let Some(native) = self.inner.events.lookup(listener) {
            self.native().remove_event_listener(event_type, &native);
        }
    }

    /// Sets or clears the `on<event_type>` handler slot.
    pub fn set_event_handler(&self, event_type: &str, handler: Option<EventListener<AudioNode>>) {
        let native = self.inner.events.wrap(self, handler);
        self.native().set_event_handler(event_type, native);
    }

    /// Sets or clears the `onended` handler of a source node.
    pub fn set_onended(&self, handler: Option<EventListener<AudioNode>>) {
        self.set_event_handler("ended", handler);
    }
}

impl PartialEq for AudioNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for AudioNode {}

impl fmt::Debug for AudioNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioNode")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("inputs", &self.inner.inputs)
            .field("outputs", &self.inner.outputs)
            .finish()
    }
}
