//! Probe bodies.
//!
//! Each probe builds a few throwaway native nodes and checks one behavior.
//! A probe that cannot even set up its experiment reports the capability as
//! missing, which installs the adapter; the adapters are correct on
//! conformant engines too, just slower.

use crate::error::NativeError;
use crate::native::{NativeBackendRef, NativeContext, NodeKind};

/// Renders a one-frame graph where a node is connected to two gains and
/// then selectively disconnected from one of them. Only an engine with
/// selective disconnect keeps the other path audible.
pub async fn selective_disconnect(backend: NativeBackendRef) -> bool {
    let Ok(context) = backend.create_offline_context(1, 1, 44100.0) else {
        return false;
    };

    let build = || -> Result<(), NativeError> {
        let source = context.create_node(&NodeKind::ConstantSource)?;
        let kept = context.create_node(&NodeKind::Gain)?;
        let dropped = context.create_node(&NodeKind::Gain)?;
        source.connect(&kept, 0, 0)?;
        source.connect(&dropped, 0, 0)?;
        kept.connect(&context.destination(), 0, 0)?;
        source.disconnect_node(&dropped, None, None)?;
        source.start(0.0)
    };
    if build().is_err() {
        return false;
    }

    match context.start_rendering().await {
        Ok(buffer) => buffer
            .channel(0)
            .and_then(|samples| samples.first())
            .is_some_and(|&sample| sample != 0.0),
        Err(_) => false,
    }
}

/// `cancel_and_hold_at_time` exists on a gain param.
pub fn cancel_and_hold(context: &dyn NativeContext) -> bool {
    let Ok(node) = context.create_node(&NodeKind::Gain) else {
        return false;
    };
    node.param("gain")
        .is_some_and(|gain| gain.cancel_and_hold_at_time(0.0).is_ok())
}

/// An exponential ramp to zero is rejected with a `RangeError`.
pub fn exponential_ramp_validation(context: &dyn NativeContext) -> bool {
    let Ok(node) = context.create_node(&NodeKind::Gain) else {
        return false;
    };
    let Some(gain) = node.param("gain") else {
        return false;
    };
    matches!(
        gain.exponential_ramp_to_value_at_time(0.0, 1.0),
        Err(e) if e.name == "RangeError"
    )
}

/// A frequency response query with unequal array lengths is rejected with
/// an `InvalidAccessError`.
pub fn frequency_response_validation(context: &dyn NativeContext) -> bool {
    let Ok(filter) = context.create_node(&NodeKind::BiquadFilter) else {
        return false;
    };
    let frequencies = [440.0, 880.0];
    let mut magnitude = [0.0; 1];
    let mut phase = [0.0; 2];
    matches!(
        filter.get_frequency_response(&frequencies, &mut magnitude, &mut phase),
        Err(e) if e.code == NativeError::INVALID_ACCESS_ERR
    )
}

/// A processor node with two inputs can be created.
pub fn multi_input_processor(context: &dyn NativeContext) -> bool {
    context
        .create_node(&NodeKind::Processor {
            inputs: 2,
            outputs: 1,
        })
        .is_ok()
}
