//! Simulated params.

use std::any::Any;
use std::sync::{Arc, Weak};

use concord_core::{AutomationEvent, AutomationTimeline, NativeError, NativeParam, NodeKind};
use parking_lot::Mutex;

use crate::context::ContextShared;

/// Range and default of one param.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParamSpec {
    pub(crate) name: &'static str,
    pub(crate) default: f32,
    pub(crate) min: f32,
    pub(crate) max: f32,
}

impl ParamSpec {
    const fn new(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            default,
            min,
            max,
        }
    }

    /// Range and default of param `name` on a node of `kind`.
    pub(crate) fn for_param(kind: NodeKind, name: &'static str, nyquist: f32) -> Self {
        match (kind, name) {
            (NodeKind::BiquadFilter, "gain") => Self::new(name, 0.0, f32::MIN, 1541.0),
            (NodeKind::BiquadFilter, "frequency") => Self::new(name, 350.0, 0.0, nyquist),
            (NodeKind::BiquadFilter, "detune") => Self::new(name, 0.0, -153_600.0, 153_600.0),
            (_, "gain" | "offset" | "Q") => Self::new(name, 1.0, f32::MIN, f32::MAX),
            _ => Self::new(name, 0.0, f32::MIN, f32::MAX),
        }
    }
}

/// An automatable param of a simulated node.
pub struct SimParam {
    context: Weak<ContextShared>,
    context_id: u64,
    owner: usize,
    index: usize,
    spec: ParamSpec,
    cancel_and_hold: bool,
    validates_exponential_ramp: bool,
    timeline: Mutex<AutomationTimeline>,
}

impl SimParam {
    pub(crate) fn new(
        context: &Arc<ContextShared>,
        owner: usize,
        index: usize,
        spec: ParamSpec,
    ) -> Self {
        let profile = context.profile();
        Self {
            context: Arc::downgrade(context),
            context_id: context.id(),
            owner,
            index,
            spec,
            cancel_and_hold: profile.cancel_and_hold,
            validates_exponential_ramp: profile.validates_exponential_ramp,
            timeline: Mutex::new(AutomationTimeline::new(spec.default)),
        }
    }

    /// Recovers a simulated param from behind any adapters.
    pub fn downcast(param: &dyn NativeParam) -> Option<&SimParam> {
        param.as_any().downcast_ref::<SimParam>()
    }

    /// Param name.
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Index of the owning node in its context.
    pub(crate) fn owner(&self) -> usize {
        self.owner
    }

    /// Position among the owning node's params.
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// True when the param belongs to the context with id `context_id`.
    pub(crate) fn belongs_to(&self, context_id: u64) -> bool {
        self.context_id == context_id
    }

    /// Scheduled value at `time`, without audio-rate input.
    pub fn value_at(&self, time: f64) -> f32 {
        self.timeline
            .lock()
            .value_at(time)
            .clamp(self.spec.min, self.spec.max)
    }

    /// Scheduled automation events.
    pub fn scheduled(&self) -> Vec<AutomationEvent> {
        self.timeline.lock().events().to_vec()
    }

    fn now(&self) -> f64 {
        self.context
            .upgrade()
            .map_or(0.0, |context| context.current_time())
    }
}

impl NativeParam for SimParam {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value(&self) -> f32 {
        self.value_at(self.now())
    }

    fn set_value(&self, value: f32) -> Result<(), NativeError> {
        self.timeline.lock().set_intrinsic(value);
        Ok(())
    }

    fn default_value(&self) -> f32 {
        self.spec.default
    }

    fn min_value(&self) -> f32 {
        self.spec.min
    }

    fn max_value(&self) -> f32 {
        self.spec.max
    }

    fn set_value_at_time(&self, value: f32, start_time: f64) -> Result<(), NativeError> {
        self.timeline.lock().insert(AutomationEvent::SetValue {
            value,
            time: start_time,
        });
        Ok(())
    }

    fn linear_ramp_to_value_at_time(&self, value: f32, end_time: f64) -> Result<(), NativeError> {
        self.timeline
            .lock()
            .insert(AutomationEvent::LinearRamp { value, end_time });
        Ok(())
    }

    fn exponential_ramp_to_value_at_time(
        &self,
        value: f32,
        end_time: f64,
    ) -> Result<(), NativeError> {
        if self.validates_exponential_ramp && value == 0.0 {
            return Err(NativeError::range("exponential ramp target must be nonzero"));
        }
        self.timeline
            .lock()
            .insert(AutomationEvent::ExponentialRamp { value, end_time });
        Ok(())
    }

    fn set_target_at_time(
        &self,
        target: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<(), NativeError> {
        self.timeline.lock().insert(AutomationEvent::SetTarget {
            target,
            start_time,
            time_constant,
        });
        Ok(())
    }

    fn cancel_scheduled_values(&self, cancel_time: f64) -> Result<(), NativeError> {
        self.timeline.lock().cancel_from(cancel_time);
        Ok(())
    }

    fn cancel_and_hold_at_time(&self, cancel_time: f64) -> Result<(), NativeError> {
        if !self.cancel_and_hold {
            return Err(NativeError::not_supported(
                "cancel_and_hold_at_time is not implemented",
            ));
        }
        self.timeline.lock().cancel_and_hold(cancel_time);
        Ok(())
    }
}
