//! Concord Core - a uniform audio graph API over divergent native engines
//!
//! Native audio engines agree on the shape of the audio graph API but not on
//! its details: some cannot disconnect a single destination, some throw the
//! wrong error for a foreign param, some lack `cancel_and_hold_at_time`. This
//! crate mediates every graph operation so callers see one behavior.
//!
//! # Core Abstractions
//!
//! ## Wrappers
//!
//! - [`Context`] - live or offline audio context
//! - [`AudioNode`] - node handle; `connect` is chainable
//! - [`AudioParam`] - automatable param handle
//!
//! Wrappers never embed native references. Their native counterparts live in
//! process-wide weak [identity stores](identity), so a wrapper's lifetime is
//! independent of its native object's.
//!
//! ## Routing
//!
//! - [`router`] - validates `connect`/`disconnect` and sends them to the
//!   native graph (live) or the render graph (offline)
//! - [`WrapperGraph`] - per-context record of connections
//! - [`Renderer`] / [`RenderGraph`] - cycle-tolerant shadow graph for offline
//!   contexts, turned into native edges when rendering starts
//!
//! ## Capabilities
//!
//! - [`ProbeCache`] - one-shot, single-flight capability probes
//! - [`Capabilities`] - settled verdicts for a context
//! - [`AdaptedNode`], [`AdaptedParam`], [`CompositeProcessor`] - adapters
//!   installed when a probe says the engine falls short
//!
//! ## Events
//!
//! - [`EventBridge`] - retargets native events to wrappers and memoizes the
//!   wrapped listener so removal finds it
//!
//! # Native engines
//!
//! An engine plugs in by implementing [`NativeBackend`], [`NativeContext`],
//! [`NativeNode`] and [`NativeParam`].
//!
//! # Example
//!
//! ```rust,ignore
//! use concord_config::ShimConfig;
//! use concord_core::{Context, DisconnectTarget, OfflineOptions};
//!
//! let config = ShimConfig::default();
//! let context = Context::new_offline(&backend, OfflineOptions::new(1, 128, 44_100.0), &config).await?;
//!
//! let source = context.create_constant_source()?;
//! let gain = context.create_gain()?;
//! source.connect(&gain, 0, 0)?.connect(&context.destination(), 0, 0)?;
//! source.disconnect(DisconnectTarget::node(&gain))?;
//!
//! let rendered = context.start_rendering().await?;
//! ```
//!
//! # Features
//!
//! - `tracing`: structured logs for connections, probes and store evictions

pub mod automation;
pub mod capability;
pub mod context;
pub mod error;
pub mod event;
pub mod graph;
pub mod identity;
pub mod native;
pub mod node;
pub mod param;
pub mod probe;
pub mod renderer;
pub mod router;

pub use automation::{AutomationEvent, AutomationTimeline};
pub use capability::{AdaptedNode, AdaptedParam, Capabilities, CompositeProcessor};
pub use context::{Context, ContextKind, OfflineOptions, WeakContext};
pub use error::{AudioError, ErrorKind, NativeError, Result};
pub use event::{Event, EventBridge, EventListener, EventTarget};
pub use graph::{Connection, ConnectionFilter, ConnectionTarget, NodeId, ParamId, WrapperGraph};
pub use identity::{IdentityStore, WeakKey, stores};
pub use native::{
    AudioBuffer, ChannelConfig, ChannelCountMode, ChannelInterpretation, ContextState,
    NativeBackend, NativeBackendRef, NativeContext, NativeContextOptions, NativeContextRef,
    NativeListener, NativeNode, NativeNodeRef, NativeParam, NativeParamRef, NodeKind,
    RenderFuture, same_native_node, same_native_param,
};
pub use node::{AudioNode, MAX_CHANNEL_COUNT, WeakAudioNode};
pub use param::AudioParam;
pub use probe::{ProbeCache, ProbeId, ProbeState};
pub use renderer::{RenderEdge, RenderGraph, RenderPlan, Renderer, RendererId, cycle_members};
pub use router::DisconnectTarget;
