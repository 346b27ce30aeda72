//! Context wrapper.
//!
//! A [`Context`] owns the per-context state the router works with: the
//! [`WrapperGraph`] of recorded connections, the capability verdicts its
//! nodes were adapted for and, for offline contexts, the shared
//! [`RenderGraph`] that stands in for the native graph until rendering.
//!
//! Construction is async because it waits for the capability probes. Probe
//! verdicts are shared by every context created from the same backend.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use concord_config::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, RenderConfig, ShimConfig};
use parking_lot::Mutex;

use crate::capability::{self, Capabilities};
use crate::error::{AudioError, Result};
use crate::event::{EventBridge, EventListener, EventTarget};
use crate::graph::{Connection, WrapperGraph};
use crate::identity::{WeakKey, lost_association, stores};
use crate::native::{
    AudioBuffer, ContextState, NativeBackendRef, NativeContextOptions, NativeContextRef, NodeKind,
};
use crate::node::{AudioNode, ContextLink, MAX_CHANNEL_COUNT};
use crate::probe::ProbeCache;
use crate::renderer::{RenderGraph, RenderTarget, SharedRenderGraph};
use crate::router::native_input;

/// Live or offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// Real-time; connections go straight to the native graph.
    Live,
    /// Batch; connections are recorded in the render graph until rendering.
    Offline,
}

/// Shape of an offline render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfflineOptions {
    /// Output channel count.
    pub channels: u32,
    /// Length in frames.
    pub length: usize,
    /// Sample rate in Hz.
    pub sample_rate: f32,
}

impl OfflineOptions {
    /// Creates options for `length` frames of `channels` channels.
    pub fn new(channels: u32, length: usize, sample_rate: f32) -> Self {
        Self {
            channels,
            length,
            sample_rate,
        }
    }

    /// Rejects shapes no engine can render.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels > MAX_CHANNEL_COUNT {
            return Err(AudioError::not_supported(format!(
                "channel count {} outside 1..={MAX_CHANNEL_COUNT}",
                self.channels
            )));
        }
        if self.length == 0 {
            return Err(AudioError::not_supported("render length must be nonzero"));
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(AudioError::not_supported(format!(
                "sample rate {} outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}",
                self.sample_rate
            )));
        }
        Ok(())
    }
}

/// Shared state behind a [`Context`] handle.
pub struct ContextInner {
    kind: ContextKind,
    backend: NativeBackendRef,
    capabilities: Capabilities,
    render: RenderConfig,
    graph: Mutex<WrapperGraph>,
    render_graph: Option<SharedRenderGraph>,
    /// Offline lifecycle. Live contexts ask the native side instead.
    rendering: Mutex<ContextState>,
    destination: OnceLock<AudioNode>,
    events: EventBridge<Context>,
}

/// Handle to an audio context.
///
/// Clones share identity; equality is identity.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

/// Non-owning handle to a [`Context`].
#[derive(Clone)]
pub struct WeakContext(Weak<ContextInner>);

impl WeakContext {
    /// The context, if it is still alive.
    pub fn upgrade(&self) -> Option<Context> {
        Context::upgrade(&self.0)
    }
}

impl WeakKey for Context {
    type Target = ContextInner;

    fn key_arc(&self) -> &Arc<ContextInner> {
        &self.inner
    }
}

impl EventTarget for Context {
    type Handle = WeakContext;

    fn downgrade(&self) -> WeakContext {
        Context::downgrade(self)
    }

    fn upgrade(handle: &WeakContext) -> Option<Self> {
        handle.upgrade()
    }
}

impl Context {
    /// Creates a live context on `backend`.
    pub async fn new_live(backend: &NativeBackendRef, config: &ShimConfig) -> Result<Self> {
        let options = NativeContextOptions {
            sample_rate: config.context.sample_rate,
            latency_hint: config.context.latency_hint,
        };
        let native = backend.create_context(&options)?;
        Self::assemble(backend, native, ContextKind::Live, config).await
    }

    /// Creates an offline context on `backend`.
    pub async fn new_offline(
        backend: &NativeBackendRef,
        options: OfflineOptions,
        config: &ShimConfig,
    ) -> Result<Self> {
        options.validate()?;
        let native =
            backend.create_offline_context(options.channels, options.length, options.sample_rate)?;
        Self::assemble(backend, native, ContextKind::Offline, config).await
    }

    async fn assemble(
        backend: &NativeBackendRef,
        native: NativeContextRef,
        kind: ContextKind,
        config: &ShimConfig,
    ) -> Result<Self> {
        let cache = ProbeCache::for_backend(backend);
        capability::seed_overrides(&cache, &config.probes);
        let capabilities = capability::detect(backend, &native, &cache).await;

        let context = Self {
            inner: Arc::new(ContextInner {
                kind,
                backend: NativeBackendRef::clone(backend),
                capabilities,
                render: config.render.clone(),
                graph: Mutex::new(WrapperGraph::new()),
                render_graph: (kind == ContextKind::Offline).then(RenderGraph::shared),
                rendering: Mutex::new(ContextState::Suspended),
                destination: OnceLock::new(),
                events: EventBridge::new(),
            }),
        };

        let stores = stores();
        stores
            .context_natives
            .set(&context, NativeContextRef::clone(&native));
        stores
            .native_contexts
            .set(&native, Arc::downgrade(&context.inner));

        let destination = AudioNode::register(
            ContextLink::Weak(Arc::downgrade(&context.inner)),
            &context,
            NodeKind::Destination,
            native.destination(),
        )?;
        let _ = context.inner.destination.set(destination);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            backend = backend.name(),
            ?kind,
            sample_rate = native.sample_rate(),
            "context_created"
        );

        Ok(context)
    }

    pub(crate) fn upgrade(inner: &Weak<ContextInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// The wrapper registered for `native`, if it is still alive.
    pub fn from_native(native: &NativeContextRef) -> Option<Self> {
        stores()
            .native_contexts
            .get(native)
            .and_then(|inner| Self::upgrade(&inner))
    }

    /// Returns a non-owning handle.
    pub fn downgrade(&self) -> WeakContext {
        WeakContext(Arc::downgrade(&self.inner))
    }

    /// True when both handles are the same context.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Live or offline.
    pub fn kind(&self) -> ContextKind {
        self.inner.kind
    }

    /// True for offline contexts.
    pub fn is_offline(&self) -> bool {
        self.inner.kind == ContextKind::Offline
    }

    /// The native context.
    pub fn native(&self) -> NativeContextRef {
        stores().context_natives.require(self)
    }

    /// The backend this context was created on.
    pub fn backend(&self) -> &NativeBackendRef {
        &self.inner.backend
    }

    /// Capability verdicts this context's nodes were adapted for.
    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.native().sample_rate()
    }

    /// Seconds of audio processed so far.
    pub fn current_time(&self) -> f64 {
        self.native().current_time()
    }

    /// Lifecycle state.
    pub fn state(&self) -> ContextState {
        match self.inner.kind {
            ContextKind::Live => self.native().state(),
            ContextKind::Offline => *self.inner.rendering.lock(),
        }
    }

    /// The node everything audible ends up in.
    pub fn destination(&self) -> AudioNode {
        match self.inner.destination.get() {
            Some(destination) => destination.clone(),
            None => lost_association("context destination"),
        }
    }

    /// Snapshot of the recorded connections, sorted.
    pub fn connections(&self) -> Vec<Connection> {
        self.inner.graph.lock().connections()
    }

    pub(crate) fn graph(&self) -> &Mutex<WrapperGraph> {
        &self.inner.graph
    }

    pub(crate) fn render_graph(&self) -> Option<&SharedRenderGraph> {
        self.inner.render_graph.as_ref()
    }

    /// Fails with `InvalidStateError` once the context is closed.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.state() == ContextState::Closed {
            return Err(AudioError::invalid_state("the context is closed"));
        }
        Ok(())
    }

    fn ensure_live(&self, operation: &str) -> Result<()> {
        if self.is_offline() {
            return Err(AudioError::not_supported(format!(
                "{operation} is not available on offline contexts"
            )));
        }
        Ok(())
    }

    // -- lifecycle --

    /// Resumes a suspended live context.
    pub fn resume(&self) -> Result<()> {
        self.ensure_live("resume")?;
        self.ensure_open()?;
        Ok(self.native().resume()?)
    }

    /// Suspends a running live context.
    pub fn suspend(&self) -> Result<()> {
        self.ensure_live("suspend")?;
        self.ensure_open()?;
        Ok(self.native().suspend()?)
    }

    /// Closes a live context. Closing twice is an `InvalidStateError`.
    pub fn close(&self) -> Result<()> {
        self.ensure_live("close")?;
        self.ensure_open()?;
        Ok(self.native().close()?)
    }

    /// Renders an offline context.
    ///
    /// The shadow graph is turned into native edges first. Renderers on a
    /// cycle are muted when `render.mute_cycles` is set, so everything
    /// downstream of a cycle renders silence. The context is closed
    /// afterwards, whether rendering succeeded or not.
    pub async fn start_rendering(&self) -> Result<AudioBuffer> {
        let Some(render_graph) = self.render_graph() else {
            return Err(AudioError::not_supported(
                "only offline contexts can start rendering",
            ));
        };
        {
            let mut state = self.inner.rendering.lock();
            if *state != ContextState::Suspended {
                return Err(AudioError::invalid_state(
                    "an offline context renders only once",
                ));
            }
            *state = ContextState::Running;
        }

        let result = self.render(render_graph).await;
        *self.inner.rendering.lock() = ContextState::Closed;

        #[cfg(feature = "tracing")]
        tracing::debug!(ok = result.is_ok(), "offline_render_finished");

        result
    }

    async fn render(&self, render_graph: &SharedRenderGraph) -> Result<AudioBuffer> {
        let jobs: Vec<_> = {
            let graph = render_graph.lock();
            let plan = graph.plan(self.inner.render.mute_cycles);

            #[cfg(feature = "tracing")]
            tracing::debug!(
                renderers = graph.len(),
                edges = plan.edges.len(),
                muted = plan.muted.len(),
                "render_plan"
            );

            plan.edges
                .iter()
                .map(|(destination, edge)| {
                    (
                        graph.target(edge.source).clone(),
                        edge.output,
                        graph.target(*destination).clone(),
                        edge.input,
                    )
                })
                .collect()
        };

        for (source, output, destination, input) in jobs {
            // Only node renderers ever feed anything.
            let RenderTarget::Node(source) = source else {
                continue;
            };
            match destination {
                RenderTarget::Node(destination) => {
                    let (part, part_input) = native_input(&destination, input.unwrap_or(0))?;
                    source.connect(&part, output, part_input)?;
                }
                RenderTarget::Param { native, .. } => source.connect_param(&native, output)?,
            }
        }

        Ok(self.native().start_rendering().await?)
    }

    // -- factories --

    /// Creates a gain node.
    pub fn create_gain(&self) -> Result<AudioNode> {
        AudioNode::new(self, NodeKind::Gain)
    }

    /// Creates a constant source node.
    pub fn create_constant_source(&self) -> Result<AudioNode> {
        AudioNode::new(self, NodeKind::ConstantSource)
    }

    /// Creates a biquad filter node.
    pub fn create_biquad_filter(&self) -> Result<AudioNode> {
        AudioNode::new(self, NodeKind::BiquadFilter)
    }

    /// Creates a channel merger with `inputs` inputs.
    pub fn create_channel_merger(&self, inputs: u32) -> Result<AudioNode> {
        if inputs == 0 || inputs > MAX_CHANNEL_COUNT {
            return Err(AudioError::index_size(format!(
                "merger inputs {inputs} outside 1..={MAX_CHANNEL_COUNT}"
            )));
        }
        AudioNode::new(self, NodeKind::ChannelMerger { inputs })
    }

    /// Creates a processing node with the given port counts.
    pub fn create_processor(&self, inputs: u32, outputs: u32) -> Result<AudioNode> {
        if inputs == 0 && outputs == 0 {
            return Err(AudioError::not_supported(
                "a processor needs at least one input or output",
            ));
        }
        AudioNode::new(self, NodeKind::Processor { inputs, outputs })
    }

    // -- events --

    /// Adds a listener for `event_type`.
    pub fn add_event_listener(&self, event_type: &str, listener: EventListener<Context>) {
        if let Some(native) = self.inner.events.wrap(self, Some(listener)) {
            self.native().add_event_listener(event_type, native);
        }
    }

    /// Removes a listener added with [`add_event_listener`](Self::add_event_listener).
    pub fn remove_event_listener(&self, event_type: &str, listener: &EventListener<Context>) {
        if let Some(native) = self.inner.events.lookup(listener) {
            self.native().remove_event_listener(event_type, &native);
        }
    }

    /// Sets or clears the `onstatechange` handler.
    pub fn set_onstatechange(&self, handler: Option<EventListener<Context>>) {
        let native = self.inner.events.wrap(self, handler);
        self.native().set_event_handler("statechange", native);
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("kind", &self.inner.kind)
            .field("backend", &self.inner.backend.name())
            .field("capabilities", &self.inner.capabilities)
            .finish()
    }
}
