//! Native engine boundary.
//!
//! The shim never renders audio itself. Everything audible happens inside a
//! native engine reached through these traits: [`NativeBackend`] creates
//! contexts, [`NativeContext`] creates nodes and renders, [`NativeNode`] and
//! [`NativeParam`] are the objects the wrappers forward to.
//!
//! # Design Decision
//!
//! Native objects are handled as `Arc<dyn Trait>` so that capability
//! adapters can sit in front of a native object without the wrapper layer
//! knowing. Adapters forward [`NativeNode::as_any`] to the object they wrap,
//! which lets an engine recognise its own nodes behind any number of adapter
//! layers.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use concord_config::LatencyHint;

use crate::error::NativeError;
use crate::event::Event;

/// Shared handle to a native node.
pub type NativeNodeRef = Arc<dyn NativeNode>;

/// Shared handle to a native param.
pub type NativeParamRef = Arc<dyn NativeParam>;

/// Shared handle to a native context.
pub type NativeContextRef = Arc<dyn NativeContext>;

/// Shared handle to a native backend.
pub type NativeBackendRef = Arc<dyn NativeBackend>;

/// Listener as a native engine sees it.
pub type NativeListener = Arc<dyn Fn(&mut Event) + Send + Sync>;

/// Future resolving to the rendered buffer of an offline context.
pub type RenderFuture = Pin<Box<dyn Future<Output = Result<AudioBuffer, NativeError>> + Send>>;

/// Node types the shim knows how to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The context's final output. Never created directly.
    Destination,
    /// Multiplies its input by the `gain` param.
    Gain,
    /// Emits the `offset` param once started.
    ConstantSource,
    /// Second-order filter with `frequency`, `detune`, `Q` and `gain` params.
    BiquadFilter,
    /// Combines several inputs into one output.
    ChannelMerger {
        /// Number of inputs.
        inputs: u32,
    },
    /// User processing node with a configurable input count.
    Processor {
        /// Number of inputs.
        inputs: u32,
        /// Number of outputs.
        outputs: u32,
    },
}

impl NodeKind {
    /// Short type name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Destination => "destination",
            NodeKind::Gain => "gain",
            NodeKind::ConstantSource => "constant-source",
            NodeKind::BiquadFilter => "biquad-filter",
            NodeKind::ChannelMerger { .. } => "channel-merger",
            NodeKind::Processor { .. } => "processor",
        }
    }

    /// Number of inputs a node of this kind exposes.
    pub fn number_of_inputs(&self) -> u32 {
        match *self {
            NodeKind::ConstantSource => 0,
            NodeKind::ChannelMerger { inputs } | NodeKind::Processor { inputs, .. } => inputs,
            NodeKind::Destination | NodeKind::Gain | NodeKind::BiquadFilter => 1,
        }
    }

    /// Number of outputs a node of this kind exposes.
    pub fn number_of_outputs(&self) -> u32 {
        match *self {
            NodeKind::Destination => 0,
            NodeKind::Processor { outputs, .. } => outputs,
            _ => 1,
        }
    }

    /// Names of the automatable params of this kind, in creation order.
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            NodeKind::Gain => &["gain"],
            NodeKind::ConstantSource => &["offset"],
            NodeKind::BiquadFilter => &["frequency", "detune", "Q", "gain"],
            _ => &[],
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// Not processing. Offline contexts start here.
    Suspended,
    /// Processing audio.
    Running,
    /// Terminal.
    Closed,
}

/// How channel counts of multiple connections are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelCountMode {
    /// Use the largest connection count.
    #[default]
    Max,
    /// Like `Max`, clamped to the node's channel count.
    ClampedMax,
    /// Use the node's channel count.
    Explicit,
}

/// How channels are up- or down-mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelInterpretation {
    /// Speaker layout aware mixing.
    #[default]
    Speakers,
    /// Fill or drop channels by index.
    Discrete,
}

/// Channel mixing configuration of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelConfig {
    /// Channel count.
    pub count: u32,
    /// Count mode.
    pub mode: ChannelCountMode,
    /// Interpretation.
    pub interpretation: ChannelInterpretation,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            count: 2,
            mode: ChannelCountMode::default(),
            interpretation: ChannelInterpretation::default(),
        }
    }
}

/// Options for creating a live native context.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NativeContextOptions {
    /// Requested sample rate, or the engine default.
    pub sample_rate: Option<f32>,
    /// Latency hint.
    pub latency_hint: LatencyHint,
}

/// Rendered audio: one `Vec<f32>` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: f32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Wraps rendered channel data.
    pub fn new(sample_rate: f32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Sample rate the buffer was rendered at.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Number of channels.
    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn length(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }
}

/// Creates native contexts.
///
/// One backend stands for one native engine. Capability probe results are
/// memoized per backend instance.
pub trait NativeBackend: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Creates a live (real-time) context.
    fn create_context(&self, options: &NativeContextOptions) -> Result<NativeContextRef, NativeError>;

    /// Creates an offline context rendering `length` frames.
    fn create_offline_context(
        &self,
        channels: u32,
        length: usize,
        sample_rate: f32,
    ) -> Result<NativeContextRef, NativeError>;
}

/// A native context.
pub trait NativeContext: Send + Sync {
    /// The concrete object, for engine-side downcasting.
    fn as_any(&self) -> &dyn Any;

    /// True for offline contexts.
    fn is_offline(&self) -> bool;

    /// Sample rate in Hz.
    fn sample_rate(&self) -> f32;

    /// Seconds of audio processed so far.
    fn current_time(&self) -> f64;

    /// Current lifecycle state.
    fn state(&self) -> ContextState;

    /// The destination node.
    fn destination(&self) -> NativeNodeRef;

    /// Creates a node. `NodeKind::Destination` is not creatable.
    fn create_node(&self, kind: &NodeKind) -> Result<NativeNodeRef, NativeError>;

    /// Resumes processing.
    fn resume(&self) -> Result<(), NativeError>;

    /// Suspends processing.
    fn suspend(&self) -> Result<(), NativeError>;

    /// Closes the context for good.
    fn close(&self) -> Result<(), NativeError>;

    /// Renders an offline context. Calling twice is an `InvalidStateError`.
    fn start_rendering(&self) -> RenderFuture;

    /// Registers a listener for `event_type`.
    fn add_event_listener(&self, event_type: &str, listener: NativeListener);

    /// Removes a listener previously added with the same handle.
    fn remove_event_listener(&self, event_type: &str, listener: &NativeListener);

    /// Sets or clears the single handler slot for `event_type`.
    fn set_event_handler(&self, event_type: &str, handler: Option<NativeListener>);
}

/// A native node.
pub trait NativeNode: Send + Sync {
    /// The concrete object, for engine-side downcasting.
    fn as_any(&self) -> &dyn Any;

    /// What this node is.
    fn kind(&self) -> NodeKind;

    /// Number of inputs.
    fn number_of_inputs(&self) -> u32;

    /// Number of outputs.
    fn number_of_outputs(&self) -> u32;

    /// Channel mixing configuration.
    fn channel_config(&self) -> ChannelConfig;

    /// Sets the channel count.
    fn set_channel_count(&self, count: u32) -> Result<(), NativeError>;

    /// Sets the channel count mode.
    fn set_channel_count_mode(&self, mode: ChannelCountMode) -> Result<(), NativeError>;

    /// Sets the channel interpretation.
    fn set_channel_interpretation(
        &self,
        interpretation: ChannelInterpretation,
    ) -> Result<(), NativeError>;

    /// Looks up an automatable param by name.
    fn param(&self, name: &str) -> Option<NativeParamRef>;

    /// Connects `output` of this node to `input` of `destination`.
    fn connect(&self, destination: &NativeNodeRef, output: u32, input: u32)
    -> Result<(), NativeError>;

    /// Connects `output` of this node to a param.
    fn connect_param(&self, destination: &NativeParamRef, output: u32) -> Result<(), NativeError>;

    /// Removes every outgoing connection.
    fn disconnect(&self) -> Result<(), NativeError>;

    /// Removes every connection leaving `output`.
    fn disconnect_output(&self, output: u32) -> Result<(), NativeError>;

    /// Removes connections to `destination`, optionally narrowed by output and input.
    fn disconnect_node(
        &self,
        destination: &NativeNodeRef,
        output: Option<u32>,
        input: Option<u32>,
    ) -> Result<(), NativeError>;

    /// Removes connections to a param, optionally narrowed by output.
    fn disconnect_param(
        &self,
        destination: &NativeParamRef,
        output: Option<u32>,
    ) -> Result<(), NativeError>;

    /// Schedules a source node to start.
    fn start(&self, _when: f64) -> Result<(), NativeError> {
        Err(NativeError::invalid_state(format!("{} is not a source", self.kind())))
    }

    /// Schedules a source node to stop.
    fn stop(&self, _when: f64) -> Result<(), NativeError> {
        Err(NativeError::invalid_state(format!("{} is not a source", self.kind())))
    }

    /// Fills magnitude and phase response at the given frequencies.
    fn get_frequency_response(
        &self,
        _frequencies: &[f32],
        _magnitude: &mut [f32],
        _phase: &mut [f32],
    ) -> Result<(), NativeError> {
        Err(NativeError::not_supported(format!(
            "{} has no frequency response",
            self.kind()
        )))
    }

    /// Native nodes standing in for this node's inputs, when it is a
    /// composite built from several native nodes. Input `i` of the composite
    /// is input 0 of the `i`-th node.
    fn composite_inputs(&self) -> Option<&[NativeNodeRef]> {
        None
    }

    /// Registers a listener for `event_type`.
    fn add_event_listener(&self, event_type: &str, listener: NativeListener);

    /// Removes a listener previously added with the same handle.
    fn remove_event_listener(&self, event_type: &str, listener: &NativeListener);

    /// Sets or clears the single handler slot for `event_type`.
    fn set_event_handler(&self, event_type: &str, handler: Option<NativeListener>);
}

/// A native automatable param.
pub trait NativeParam: Send + Sync {
    /// The concrete object, for engine-side downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Current value.
    fn value(&self) -> f32;

    /// Sets the intrinsic value.
    fn set_value(&self, value: f32) -> Result<(), NativeError>;

    /// Default value.
    fn default_value(&self) -> f32;

    /// Smallest allowed value.
    fn min_value(&self) -> f32;

    /// Largest allowed value.
    fn max_value(&self) -> f32;

    /// Schedules an instant value change.
    fn set_value_at_time(&self, value: f32, start_time: f64) -> Result<(), NativeError>;

    /// Schedules a linear ramp ending at `end_time`.
    fn linear_ramp_to_value_at_time(&self, value: f32, end_time: f64) -> Result<(), NativeError>;

    /// Schedules an exponential ramp ending at `end_time`.
    fn exponential_ramp_to_value_at_time(&self, value: f32, end_time: f64)
    -> Result<(), NativeError>;

    /// Schedules an exponential approach to `target`.
    fn set_target_at_time(
        &self,
        target: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<(), NativeError>;

    /// Removes events at or after `cancel_time`.
    fn cancel_scheduled_values(&self, cancel_time: f64) -> Result<(), NativeError>;

    /// Removes events after `cancel_time` and holds the value reached there.
    fn cancel_and_hold_at_time(&self, cancel_time: f64) -> Result<(), NativeError>;
}

/// Address of the object behind `as_any`, looking through adapters.
fn any_addr(any: &dyn Any) -> usize {
    std::ptr::from_ref(any).cast::<()>().addr()
}

/// True when both handles reach the same native node.
pub fn same_native_node(a: &dyn NativeNode, b: &dyn NativeNode) -> bool {
    any_addr(a.as_any()) == any_addr(b.as_any())
}

/// True when both handles reach the same native param.
pub fn same_native_param(a: &dyn NativeParam, b: &dyn NativeParam) -> bool {
    any_addr(a.as_any()) == any_addr(b.as_any())
}
