//! Multi-input processor built from single-input parts.
//!
//! ```text
//!  input 0 ──▶ gain ──┐
//!  input 1 ──▶ gain ──┤
//!    ...              ├──▶ merger(n) ──▶ processor(1 input) ──▶ outputs
//!  input n-1 ─▶ gain ─┘
//! ```
//!
//! Callers connect into input `i` by connecting into input 0 of the `i`-th
//! gain, which [`NativeNode::composite_inputs`] exposes. As a source the
//! composite behaves as its processor.

use std::any::Any;
use std::sync::Arc;

use crate::error::NativeError;
use crate::native::{
    ChannelConfig, ChannelCountMode, ChannelInterpretation, NativeContext, NativeListener,
    NativeNode, NativeNodeRef, NativeParamRef, NodeKind,
};

/// Processor with `n` inputs assembled from gains, a merger and a
/// single-input processor.
pub struct CompositeProcessor {
    inputs: Vec<NativeNodeRef>,
    merger: NativeNodeRef,
    processor: NativeNodeRef,
    outputs: u32,
}

impl CompositeProcessor {
    /// Builds the composite inside `context`.
    pub fn build(context: &dyn NativeContext, inputs: u32, outputs: u32) -> Result<Self, NativeError> {
        let merger = context.create_node(&NodeKind::ChannelMerger { inputs })?;
        let processor = context.create_node(&NodeKind::Processor { inputs: 1, outputs })?;

        let mut gains = Vec::with_capacity(inputs as usize);
        for input in 0..inputs {
            let gain = context.create_node(&NodeKind::Gain)?;
            gain.connect(&merger, 0, input)?;
            gains.push(gain);
        }
        merger.connect(&processor, 0, 0)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(inputs, outputs, "composite_processor_built");

        Ok(Self {
            inputs: gains,
            merger,
            processor,
            outputs,
        })
    }

    /// The internal merger.
    pub fn merger(&self) -> &NativeNodeRef {
        &self.merger
    }

    /// The internal single-input processor.
    pub fn processor(&self) -> &NativeNodeRef {
        &self.processor
    }
}

impl NativeNode for CompositeProcessor {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Processor {
            inputs: self.inputs.len() as u32,
            outputs: self.outputs,
        }
    }

    fn number_of_inputs(&self) -> u32 {
        self.inputs.len() as u32
    }

    fn number_of_outputs(&self) -> u32 {
        self.processor.number_of_outputs()
    }

    fn channel_config(&self) -> ChannelConfig {
        self.inputs
            .first()
            .map_or_else(|| self.processor.channel_config(), |gain| gain.channel_config())
    }

    fn set_channel_count(&self, count: u32) -> Result<(), NativeError> {
        self.inputs
            .iter()
            .try_for_each(|gain| gain.set_channel_count(count))
    }

    fn set_channel_count_mode(&self, mode: ChannelCountMode) -> Result<(), NativeError> {
        self.inputs
            .iter()
            .try_for_each(|gain| gain.set_channel_count_mode(mode))
    }

    fn set_channel_interpretation(
        &self,
        interpretation: ChannelInterpretation,
    ) -> Result<(), NativeError> {
        self.inputs
            .iter()
            .try_for_each(|gain| gain.set_channel_interpretation(interpretation))
    }

    fn param(&self, name: &str) -> Option<NativeParamRef> {
        self.processor.param(name)
    }

    fn connect(
        &self,
        destination: &NativeNodeRef,
        output: u32,
        input: u32,
    ) -> Result<(), NativeError> {
        self.processor.connect(destination, output, input)
    }

    fn connect_param(&self, destination: &NativeParamRef, output: u32) -> Result<(), NativeError> {
        self.processor.connect_param(destination, output)
    }

    fn disconnect(&self) -> Result<(), NativeError> {
        self.processor.disconnect()
    }

    fn disconnect_output(&self, output: u32) -> Result<(), NativeError> {
        self.processor.disconnect_output(output)
    }

    fn disconnect_node(
        &self,
        destination: &NativeNodeRef,
        output: Option<u32>,
        input: Option<u32>,
    ) -> Result<(), NativeError> {
        self.processor.disconnect_node(destination, output, input)
    }

    fn disconnect_param(
        &self,
        destination: &NativeParamRef,
        output: Option<u32>,
    ) -> Result<(), NativeError> {
        self.processor.disconnect_param(destination, output)
    }

    fn composite_inputs(&self) -> Option<&[NativeNodeRef]> {
        Some(&self.inputs)
    }

    fn add_event_listener(&self, event_type: &str, listener: NativeListener) {
        self.processor.add_event_listener(event_type, listener);
    }

    fn remove_event_listener(&self, event_type: &str, listener: &NativeListener) {
        self.processor.remove_event_listener(event_type, listener);
    }

    fn set_event_handler(&self, event_type: &str, handler: Option<NativeListener>) {
        self.processor.set_event_handler(event_type, handler);
    }
}

/// Creates a processor node, building a composite when the engine cannot
/// create one with `inputs` inputs directly.
pub(crate) fn create_processor(
    context: &dyn NativeContext,
    inputs: u32,
    outputs: u32,
    composite: bool,
) -> Result<NativeNodeRef, NativeError> {
    if composite {
        Ok(Arc::new(CompositeProcessor::build(context, inputs, outputs)?))
    } else {
        context.create_node(&NodeKind::Processor { inputs, outputs })
    }
}
