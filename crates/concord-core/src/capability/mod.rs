//! Capability detection and adapter installation.
//!
//! Native engines differ in a handful of observable behaviors. Each one is
//! settled by a probe (see [`probes`]) whose verdict is memoized per backend.
//! When a context is created the verdicts are collected into
//! [`Capabilities`], and from then on every node and param the context
//! creates is either handed out as-is or wrapped in an adapter that supplies
//! the missing behavior.
//!
//! | Probe | Kind | Adapter when missing |
//! |-------|------|----------------------|
//! | `selective-disconnect` | async, renders audio | [`AdaptedNode`] edge ledger |
//! | `cancel-and-hold` | sync | [`AdaptedParam`] mirrored timeline |
//! | `exponential-ramp-validation` | sync | [`AdaptedParam`] zero check |
//! | `frequency-response-validation` | sync | [`AdaptedNode`] length check |
//! | `multi-input-processor` | sync | [`CompositeProcessor`] |

mod automation;
mod composite;
mod disconnect;
mod frequency_response;
mod node;
pub mod probes;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use automation::AdaptedParam;
pub(crate) use composite::create_processor;
pub use composite::CompositeProcessor;
pub use node::AdaptedNode;

use crate::native::{NativeBackendRef, NativeContextRef, NativeNodeRef, NativeParamRef, NodeKind};
use crate::probe::{ProbeCache, ProbeId};

/// `disconnect(destination)` removes only the edges to that destination.
pub const SELECTIVE_DISCONNECT: ProbeId = ProbeId::new("selective-disconnect");
/// Params implement `cancel_and_hold_at_time`.
pub const CANCEL_AND_HOLD: ProbeId = ProbeId::new("cancel-and-hold");
/// Exponential ramps to zero are rejected.
pub const EXPONENTIAL_RAMP_VALIDATION: ProbeId = ProbeId::new("exponential-ramp-validation");
/// Frequency response queries reject unequal array lengths.
pub const FREQUENCY_RESPONSE_VALIDATION: ProbeId = ProbeId::new("frequency-response-validation");
/// Processor nodes accept more than one input.
pub const MULTI_INPUT_PROCESSOR: ProbeId = ProbeId::new("multi-input-processor");

/// Every probe the shim runs.
pub const ALL_PROBES: [ProbeId; 5] = [
    SELECTIVE_DISCONNECT,
    CANCEL_AND_HOLD,
    EXPONENTIAL_RAMP_VALIDATION,
    FREQUENCY_RESPONSE_VALIDATION,
    MULTI_INPUT_PROCESSOR,
];

/// Looks up a probe by name.
pub fn probe_by_name(name: &str) -> Option<ProbeId> {
    ALL_PROBES.into_iter().find(|id| id.name() == name)
}

/// Probe verdicts for one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// See [`SELECTIVE_DISCONNECT`].
    pub selective_disconnect: bool,
    /// See [`CANCEL_AND_HOLD`].
    pub cancel_and_hold: bool,
    /// See [`EXPONENTIAL_RAMP_VALIDATION`].
    pub exponential_ramp_validation: bool,
    /// See [`FREQUENCY_RESPONSE_VALIDATION`].
    pub frequency_response_validation: bool,
    /// See [`MULTI_INPUT_PROCESSOR`].
    pub multi_input_processor: bool,
}

impl Capabilities {
    /// Everything supported; no adapter is ever installed.
    pub const CONFORMANT: Self = Self {
        selective_disconnect: true,
        cancel_and_hold: true,
        exponential_ramp_validation: true,
        frequency_response_validation: true,
        multi_input_processor: true,
    };

    /// True when no adapter is needed.
    pub fn is_conformant(&self) -> bool {
        *self == Self::CONFORMANT
    }

    /// True when nodes of `kind` get an [`AdaptedNode`].
    pub fn adapts_node(&self, kind: NodeKind) -> bool {
        !self.selective_disconnect
            || (kind == NodeKind::BiquadFilter && !self.frequency_response_validation)
    }

    /// True when params get an [`AdaptedParam`].
    pub fn adapts_params(&self) -> bool {
        !self.cancel_and_hold || !self.exponential_ramp_validation
    }

    /// True when a processor with `inputs` inputs is built as a composite.
    pub fn needs_composite(&self, inputs: u32) -> bool {
        inputs > 1 && !self.multi_input_processor
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::CONFORMANT
    }
}

/// Forces configured verdicts into `cache` before anything probes.
///
/// Names that are not probes are ignored; configuration loading rejects
/// them earlier.
pub fn seed_overrides(cache: &ProbeCache, overrides: &BTreeMap<String, bool>) {
    for (name, &verdict) in overrides {
        if let Some(id) = probe_by_name(name) {
            let applied = cache.seed(id, verdict);
            #[cfg(feature = "tracing")]
            tracing::debug!(probe = name.as_str(), verdict, applied, "probe_override");
            #[cfg(not(feature = "tracing"))]
            let _ = applied;
        }
    }
}

/// Runs (or recalls) every probe against `backend` and `native`.
pub async fn detect(
    backend: &NativeBackendRef,
    native: &NativeContextRef,
    cache: &ProbeCache,
) -> Capabilities {
    let selective_disconnect = cache
        .test_async(SELECTIVE_DISCONNECT, || {
            probes::selective_disconnect(Arc::clone(backend))
        })
        .await;
    let capabilities = Capabilities {
        selective_disconnect,
        cancel_and_hold: cache.test(CANCEL_AND_HOLD, || probes::cancel_and_hold(native.as_ref())),
        exponential_ramp_validation: cache.test(EXPONENTIAL_RAMP_VALIDATION, || {
            probes::exponential_ramp_validation(native.as_ref())
        }),
        frequency_response_validation: cache.test(FREQUENCY_RESPONSE_VALIDATION, || {
            probes::frequency_response_validation(native.as_ref())
        }),
        multi_input_processor: cache.test(MULTI_INPUT_PROCESSOR, || {
            probes::multi_input_processor(native.as_ref())
        }),
    };

    #[cfg(feature = "tracing")]
    {
        let missing = [
            (SELECTIVE_DISCONNECT, capabilities.selective_disconnect),
            (CANCEL_AND_HOLD, capabilities.cancel_and_hold),
            (EXPONENTIAL_RAMP_VALIDATION, capabilities.exponential_ramp_validation),
            (FREQUENCY_RESPONSE_VALIDATION, capabilities.frequency_response_validation),
            (MULTI_INPUT_PROCESSOR, capabilities.multi_input_processor),
        ];
        for (probe, supported) in missing {
            if !supported {
                tracing::warn!(backend = backend.name(), %probe, "capability_missing_adapter_installed");
            }
        }
        tracing::debug!(backend = backend.name(), ?capabilities, "capabilities_detected");
    }

    capabilities
}

/// Wraps a freshly created native node in the adapters `capabilities` call for.
pub fn adapt_node(native: NativeNodeRef, capabilities: &Capabilities) -> NativeNodeRef {
    let kind = native.kind();
    if !capabilities.adapts_node(kind) {
        return native;
    }
    let validate_frequency_response =
        kind == NodeKind::BiquadFilter && !capabilities.frequency_response_validation;
    Arc::new(AdaptedNode::new(
        native,
        !capabilities.selective_disconnect,
        validate_frequency_response,
    ))
}

/// Wraps a native param in the adapters `capabilities` call for.
pub fn adapt_param(native: NativeParamRef, capabilities: &Capabilities) -> NativeParamRef {
    if !capabilities.adapts_params() {
        return native;
    }
    Arc::new(AdaptedParam::new(
        native,
        !capabilities.cancel_and_hold,
        !capabilities.exponential_ramp_validation,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_names_match_config() {
        let names: Vec<_> = ALL_PROBES.iter().map(|id| id.name()).collect();
        assert_eq!(names, concord_config::PROBE_NAMES);
        assert_eq!(probe_by_name("cancel-and-hold"), Some(CANCEL_AND_HOLD));
        assert_eq!(probe_by_name("nope"), None);
    }

    #[test]
    fn adapter_selection() {
        let caps = Capabilities::CONFORMANT;
        assert!(!caps.adapts_node(NodeKind::Gain));
        assert!(!caps.adapts_params());
        assert!(!caps.needs_composite(4));

        let caps = Capabilities {
            frequency_response_validation: false,
            multi_input_processor: false,
            ..Capabilities::CONFORMANT
        };
        assert!(caps.adapts_node(NodeKind::BiquadFilter));
        assert!(!caps.adapts_node(NodeKind::Gain));
        assert!(caps.needs_composite(2));
        assert!(!caps.needs_composite(1));
    }

    #[test]
    fn overrides_seed_known_probes() {
        let cache = ProbeCache::new();
        let overrides = BTreeMap::from([
            ("cancel-and-hold".to_string(), false),
            ("unknown".to_string(), true),
        ]);
        seed_overrides(&cache, &overrides);
        assert!(!cache.test(CANCEL_AND_HOLD, || true));
    }
}
