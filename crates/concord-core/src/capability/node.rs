//! Node adapter.

use std::any::Any;

use super::disconnect::{EdgeLedger, NativeEdge};
use super::frequency_response::check_lengths;
use crate::error::NativeError;
use crate::native::{
    ChannelConfig, ChannelCountMode, ChannelInterpretation, NativeListener, NativeNode,
    NativeNodeRef, NativeParamRef, NodeKind,
};

/// A native node with emulated selective disconnect and/or frequency
/// response validation. Everything else forwards to the wrapped node.
pub struct AdaptedNode {
    inner: NativeNodeRef,
    ledger: Option<EdgeLedger>,
    validate_frequency_response: bool,
}

impl AdaptedNode {
    /// Wraps `inner`.
    pub fn new(
        inner: NativeNodeRef,
        emulate_selective_disconnect: bool,
        validate_frequency_response: bool,
    ) -> Self {
        #[cfg(feature = "tracing")]
        tracing::trace!(
            kind = %inner.kind(),
            emulate_selective_disconnect,
            validate_frequency_response,
            "node_adapter_installed"
        );
        Self {
            inner,
            ledger: emulate_selective_disconnect.then(EdgeLedger::default),
            validate_frequency_response,
        }
    }

    /// The wrapped native node.
    pub fn inner(&self) -> &NativeNodeRef {
        &self.inner
    }

    /// True when selective disconnect is emulated.
    pub fn emulates_selective_disconnect(&self) -> bool {
        self.ledger.is_some()
    }

    /// Native edges tracked for emulation.
    pub fn tracked_edges(&self) -> usize {
        self.ledger.as_ref().map_or(0, EdgeLedger::len)
    }

    fn check_output(&self, output: u32) -> Result<(), NativeError> {
        let outputs = self.inner.number_of_outputs();
        if output >= outputs {
            return Err(NativeError::index_size(format!(
                "output {output} out of range for {} outputs",
                outputs
            )));
        }
        Ok(())
    }

    fn selective(
        &self,
        ledger: &EdgeLedger,
        selected: impl Fn(&NativeEdge) -> bool,
    ) -> Result<(), NativeError> {
        if ledger.disconnect_where(self.inner.as_ref(), selected)? == 0 {
            return Err(NativeError::invalid_access(
                "the node is not connected to the given destination",
            ));
        }
        Ok(())
    }
}

impl NativeNode for AdaptedNode {
    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }

    fn kind(&self) -> NodeKind {
        self.inner.kind()
    }

    fn number_of_inputs(&self) -> u32 {
        self.inner.number_of_inputs()
    }

    fn number_of_outputs(&self) -> u32 {
        self.inner.number_of_outputs()
    }

    fn channel_config(&self) -> ChannelConfig {
        self.inner.channel_config()
    }

    fn set_channel_count(&self, count: u32) -> Result<(), NativeError> {
        self.inner.set_channel_count(count)
    }

    fn set_channel_count_mode(&self, mode: ChannelCountMode) -> Result<(), NativeError> {
        self.inner.set_channel_count_mode(mode)
    }

    fn set_channel_interpretation(
        &self,
        interpretation: ChannelInterpretation,
    ) -> Result<(), NativeError> {
        self.inner.set_channel_interpretation(interpretation)
    }

    fn param(&self, name: &str) -> Option<NativeParamRef> {
        self.inner.param(name)
    }

    fn connect(
        &self,
        destination: &NativeNodeRef,
        output: u32,
        input: u32,
    ) -> Result<(), NativeError> {
        self.inner.connect(destination, output, input)?;
        if let Some(ledger) = &self.ledger {
            ledger.record(NativeEdge::Node {
                destination: NativeNodeRef::clone(destination),
                output,
                input,
            });
        }
        Ok(())
    }

    fn connect_param(&self, destination: &NativeParamRef, output: u32) -> Result<(), NativeError> {
        self.inner.connect_param(destination, output)?;
        if let Some(ledger) = &self.ledger {
            ledger.record(NativeEdge::Param {
                destination: NativeParamRef::clone(destination),
                output,
            });
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<(), NativeError> {
        self.inner.disconnect()?;
        if let Some(ledger) = &self.ledger {
            ledger.clear();
        }
        Ok(())
    }

    fn disconnect_output(&self, output: u32) -> Result<(), NativeError> {
        let Some(ledger) = &self.ledger else {
            return self.inner.disconnect_output(output);
        };
        self.check_output(output)?;
        ledger
            .disconnect_where(self.inner.as_ref(), |edge| edge.output() == output)
            .map(|_| ())
    }

    fn disconnect_node(
        &self,
        destination: &NativeNodeRef,
        output: Option<u32>,
        input: Option<u32>,
    ) -> Result<(), NativeError> {
        let Some(ledger) = &self.ledger else {
            return self.inner.disconnect_node(destination, output, input);
        };
        if let Some(output) = output {
            self.check_output(output)?;
        }
        if let Some(input) = input {
            let inputs = destination.number_of_inputs();
            if input >= inputs {
                return Err(NativeError::index_size(format!(
                    "input {input} out of range for {inputs} inputs"
                )));
            }
        }
        self.selective(ledger, |edge| match edge {
            NativeEdge::Node {
                output: o,
                input: i,
                ..
            } => {
                edge.targets_node(destination)
                    && output.is_none_or(|want| want == *o)
                    && input.is_none_or(|want| want == *i)
            }
            NativeEdge::Param { .. } => false,
        })
    }

    fn disconnect_param(
        &self,
        destination: &NativeParamRef,
        output: Option<u32>,
    ) -> Result<(), NativeError> {
        let Some(ledger) = &self.ledger else {
            return self.inner.disconnect_param(destination, output);
        };
        if let Some(output) = output {
            self.check_output(output)?;
        }
        self.selective(ledger, |edge| {
            edge.targets_param(destination) && output.is_none_or(|want| want == edge.output())
        })
    }

    fn start(&self, when: f64) -> Result<(), NativeError> {
        self.inner.start(when)
    }

    fn stop(&self, when: f64) -> Result<(), NativeError> {
        self.inner.stop(when)
    }

    fn get_frequency_response(
        &self,
        frequencies: &[f32],
        magnitude: &mut [f32],
        phase: &mut [f32],
    ) -> Result<(), NativeError> {
        if self.validate_frequency_response {
            check_lengths(frequencies.len(), magnitude.len(), phase.len())?;
        }
        self.inner
            .get_frequency_response(frequencies, magnitude, phase)
    }

    fn composite_inputs(&self) -> Option<&[NativeNodeRef]> {
        self.inner.composite_inputs()
    }

    fn add_event_listener(&self, event_type: &str, listener: NativeListener) {
        self.inner.add_event_listener(event_type, listener);
    }

    fn remove_event_listener(&self, event_type: &str, listener: &NativeListener) {
        self.inner.remove_event_listener(event_type, listener);
    }

    fn set_event_handler(&self, event_type: &str, handler: Option<NativeListener>) {
        self.inner.set_event_handler(event_type, handler);
    }
}
