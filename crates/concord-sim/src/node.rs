//! Simulated nodes.

use std::any::Any;
use std::sync::{Arc, Weak};

use concord_config::ParamConnectError;
use concord_core::{
    ChannelConfig, ChannelCountMode, ChannelInterpretation, NativeError, NativeListener,
    NativeNode, NativeNodeRef, NativeParamRef, NodeKind,
};
use parking_lot::Mutex;

use crate::biquad;
use crate::context::{ContextShared, MAX_CHANNELS, SimEdge};
use crate::listeners::Listeners;
use crate::param::SimParam;

/// A node of a simulated context.
pub struct SimNode {
    context: Arc<ContextShared>,
    index: usize,
    kind: NodeKind,
    params: Vec<Arc<SimParam>>,
    channels: Mutex<ChannelConfig>,
    listeners: Listeners,
    this: Weak<SimNode>,
}

impl SimNode {
    pub(crate) fn new(
        context: Arc<ContextShared>,
        index: usize,
        kind: NodeKind,
        params: Vec<Arc<SimParam>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            context,
            index,
            kind,
            params,
            channels: Mutex::new(ChannelConfig::default()),
            listeners: Listeners::default(),
            this: Weak::clone(this),
        })
    }

    /// Recovers a simulated node from behind any adapters.
    pub fn downcast(node: &dyn NativeNode) -> Option<&SimNode> {
        node.as_any().downcast_ref::<SimNode>()
    }

    /// Arena index within the owning context.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Id of the owning context.
    pub fn context_id(&self) -> u64 {
        self.context.id()
    }

    /// Outgoing edges.
    pub fn edges(&self) -> Vec<SimEdge> {
        self.context.slots.lock()[self.index].edges.clone()
    }

    /// Number of listeners for `event_type`, handler slot included.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners.count(event_type)
    }

    /// Dispatches an event of `event_type` at the current context time.
    /// Returns how many listeners ran.
    pub fn fire(&self, event_type: &str) -> usize {
        self.fire_at(event_type, self.context.current_time())
    }

    pub(crate) fn fire_at(&self, event_type: &str, time: f64) -> usize {
        let Some(this) = self.this.upgrade() else {
            return 0;
        };
        let target: Arc<dyn Any + Send + Sync> = this;
        self.listeners.dispatch(event_type, time, target)
    }

    /// Resolves `destination` to a node of this node's context.
    fn same_context_node<'a>(&self, destination: &'a NativeNodeRef) -> Result<&'a SimNode, NativeError> {
        let node = SimNode::downcast(destination.as_ref())
            .ok_or_else(|| NativeError::invalid_access("destination is not a node of this engine"))?;
        if node.context.id() != self.context.id() {
            return Err(NativeError::invalid_access(
                "destination belongs to a different context",
            ));
        }
        Ok(node)
    }

    /// Resolves `destination` to a param of this node's context.
    fn same_context_param<'a>(&self, destination: &'a NativeParamRef) -> Result<&'a SimParam, NativeError> {
        let foreign = |message: &str| match self.context.profile().param_connect_error {
            ParamConnectError::InvalidAccess => NativeError::invalid_access(message),
            ParamConnectError::InvalidState => NativeError::invalid_state(message),
        };
        let param = SimParam::downcast(destination.as_ref())
            .ok_or_else(|| foreign("destination is not a param of this engine"))?;
        if !param.belongs_to(self.context.id()) {
            return Err(foreign("destination param belongs to a different context"));
        }
        Ok(param)
    }

    fn check_output(&self, output: u32) -> Result<(), NativeError> {
        let outputs = self.kind.number_of_outputs();
        if output >= outputs {
            return Err(NativeError::index_size(format!(
                "output {output} out of range for {} with {outputs} outputs",
                self.kind
            )));
        }
        Ok(())
    }

    fn check_input(node: &SimNode, input: u32) -> Result<(), NativeError> {
        let inputs = node.kind.number_of_inputs();
        if input >= inputs {
            return Err(NativeError::index_size(format!(
                "input {input} out of range for {} with {inputs} inputs",
                node.kind
            )));
        }
        Ok(())
    }

    fn add_edge(&self, edge: SimEdge) {
        let mut slots = self.context.slots.lock();
        let edges = &mut slots[self.index].edges;
        if !edges.contains(&edge) {
            edges.push(edge);
        }
    }

    /// Removes the edges `selected` picks. Returns how many went.
    fn remove_edges(&self, selected: impl Fn(&SimEdge) -> bool) -> usize {
        let mut slots = self.context.slots.lock();
        let edges = &mut slots[self.index].edges;
        let before = edges.len();
        edges.retain(|edge| !selected(edge));
        before - edges.len()
    }

    fn schedule(&self, apply: impl FnOnce(&mut crate::render::SourceSchedule) -> Result<(), NativeError>) -> Result<(), NativeError> {
        if self.kind != NodeKind::ConstantSource {
            return Err(NativeError::invalid_state(format!("{} is not a source", self.kind)));
        }
        apply(&mut self.context.slots.lock()[self.index].schedule)
    }
}

impl NativeNode for SimNode {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn number_of_inputs(&self) -> u32 {
        self.kind.number_of_inputs()
    }

    fn number_of_outputs(&self) -> u32 {
        self.kind.number_of_outputs()
    }

    fn channel_config(&self) -> ChannelConfig {
        *self.channels.lock()
    }

    fn set_channel_count(&self, count: u32) -> Result<(), NativeError> {
        if count == 0 || count > MAX_CHANNELS {
            return Err(NativeError::not_supported(format!(
                "channel count {count} outside 1..={MAX_CHANNELS}"
            )));
        }
        self.channels.lock().count = count;
        Ok(())
    }

    fn set_channel_count_mode(&self, mode: ChannelCountMode) -> Result<(), NativeError> {
        self.channels.lock().mode = mode;
        Ok(())
    }

    fn set_channel_interpretation(
        &self,
        interpretation: ChannelInterpretation,
    ) -> Result<(), NativeError> {
        self.channels.lock().interpretation = interpretation;
        Ok(())
    }

    fn param(&self, name: &str) -> Option<NativeParamRef> {
        self.params
            .iter()
            .find(|p| p.name() == name)
            .map(|p| -> NativeParamRef { p.clone() })
    }

    fn connect(&self, destination: &NativeNodeRef, output: u32, input: u32) -> Result<(), NativeError> {
        let node = self.same_context_node(destination)?;
        self.check_output(output)?;
        Self::check_input(node, input)?;
        self.add_edge(SimEdge::Node {
            destination: node.index,
            output,
            input,
        });
        Ok(())
    }

    fn connect_param(&self, destination: &NativeParamRef, output: u32) -> Result<(), NativeError> {
        let param = self.same_context_param(destination)?;
        self.check_output(output)?;
        self.add_edge(SimEdge::Param {
            owner: param.owner(),
            param: param.index(),
            output,
        });
        Ok(())
    }

    fn disconnect(&self) -> Result<(), NativeError> {
        self.remove_edges(|_| true);
        Ok(())
    }

    fn disconnect_output(&self, output: u32) -> Result<(), NativeError> {
        self.check_output(output)?;
        self.remove_edges(|edge| edge.output() == output);
        Ok(())
    }

    fn disconnect_node(
        &self,
        destination: &NativeNodeRef,
        output: Option<u32>,
        input: Option<u32>,
    ) -> Result<(), NativeError> {
        let node = self.same_context_node(destination)?;
        if let Some(output) = output {
            self.check_output(output)?;
        }
        if let Some(input) = input {
            Self::check_input(node, input)?;
        }
        if !self.context.profile().selective_disconnect {
            // Broken engines ignore the destination.
            self.remove_edges(|_| true);
            return Ok(());
        }
        let target = node.index;
        let removed = self.remove_edges(|edge| match *edge {
            SimEdge::Node {
                destination,
                output: o,
                input: i,
            } => destination == target && output.is_none_or(|w| w == o) && input.is_none_or(|w| w == i),
            SimEdge::Param { .. } => false,
        });
        if removed == 0 {
            return Err(NativeError::invalid_access(
                "the node is not connected to the given destination",
            ));
        }
        Ok(())
    }

    fn disconnect_param(&self, destination: &NativeParamRef, output: Option<u32>) -> Result<(), NativeError> {
        let param = SimParam::downcast(destination.as_ref())
            .filter(|p| p.belongs_to(self.context.id()))
            .ok_or_else(|| NativeError::invalid_access("destination param belongs to a different context"))?;
        if let Some(output) = output {
            self.check_output(output)?;
        }
        if !self.context.profile().selective_disconnect {
            self.remove_edges(|_| true);
            return Ok(());
        }
        let (owner, index) = (param.owner(), param.index());
        let removed = self.remove_edges(|edge| match *edge {
            SimEdge::Param {
                owner: o,
                param: p,
                output: out,
            } => o == owner && p == index && output.is_none_or(|w| w == out),
            SimEdge::Node { .. } => false,
        });
        if removed == 0 {
            return Err(NativeError::invalid_access(
                "the node is not connected to the given param",
            ));
        }
        Ok(())
    }

    fn start(&self, when: f64) -> Result<(), NativeError> {
        self.schedule(|schedule| {
            if schedule.start.is_some() {
                return Err(NativeError::invalid_state("a source starts only once"));
            }
            schedule.start = Some(when);
            Ok(())
        })
    }

    fn stop(&self, when: f64) -> Result<(), NativeError> {
        self.schedule(|schedule| {
            if schedule.start.is_none() {
                return Err(NativeError::invalid_state("the source was never started"));
            }
            schedule.stop = Some(when);
            Ok(())
        })
    }

    fn get_frequency_response(
        &self,
        frequencies: &[f32],
        magnitude: &mut [f32],
        phase: &mut [f32],
    ) -> Result<(), NativeError> {
        if self.kind != NodeKind::BiquadFilter {
            return Err(NativeError::not_supported(format!(
                "{} has no frequency response",
                self.kind
            )));
        }
        if self.context.profile().validates_frequency_response
            && (magnitude.len() != frequencies.len() || phase.len() != frequencies.len())
        {
            return Err(NativeError::invalid_access(
                "frequency response arrays differ in length",
            ));
        }

        let now = self.context.current_time();
        let value = |name: &str| {
            self.params
                .iter()
                .find(|p| p.name() == name)
                .map_or(0.0, |p| p.value_at(now))
        };
        let sample_rate = self.context.sample_rate();
        let cutoff = biquad::detuned(value("frequency"), value("detune"));
        let coefficients = biquad::lowpass_coefficients(cutoff, value("Q"), sample_rate);

        for ((&frequency, m), p) in frequencies.iter().zip(magnitude.iter_mut()).zip(phase.iter_mut()) {
            (*m, *p) = biquad::response(coefficients, frequency, sample_rate);
        }
        Ok(())
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
