//! Param adapter.
//!
//! Supplies `cancel_and_hold_at_time` on engines without it by mirroring the
//! param's schedule in an [`AutomationTimeline`], and rejects exponential
//! ramps to zero on engines that accept them silently.

use std::any::Any;

use parking_lot::Mutex;

use crate::automation::{AutomationEvent, AutomationTimeline};
use crate::error::NativeError;
use crate::native::{NativeParam, NativeParamRef};

/// A native param with emulated cancel-and-hold and/or exponential ramp
/// validation.
pub struct AdaptedParam {
    inner: NativeParamRef,
    mirror: Option<Mutex<AutomationTimeline>>,
    validate_exponential_ramp: bool,
}

impl AdaptedParam {
    /// Wraps `inner`.
    pub fn new(
        inner: NativeParamRef,
        emulate_cancel_and_hold: bool,
        validate_exponential_ramp: bool,
    ) -> Self {
        let mirror = emulate_cancel_and_hold
            .then(|| Mutex::new(AutomationTimeline::new(inner.value())));
        Self {
            inner,
            mirror,
            validate_exponential_ramp,
        }
    }

    /// The wrapped native param.
    pub fn inner(&self) -> &NativeParamRef {
        &self.inner
    }

    /// True when cancel-and-hold is emulated.
    pub fn emulates_cancel_and_hold(&self) -> bool {
        self.mirror.is_some()
    }

    fn mirror(&self, event: AutomationEvent) {
        if let Some(mirror) = &self.mirror {
            mirror.lock().insert(event);
        }
    }

    fn schedule(&self, event: AutomationEvent) -> Result<(), NativeError> {
        match event {
            AutomationEvent::SetValue { value, time } => self.inner.set_value_at_time(value, time),
            AutomationEvent::LinearRamp { value, end_time } => {
                self.inner.linear_ramp_to_value_at_time(value, end_time)
            }
            AutomationEvent::ExponentialRamp { value, end_time } => {
                self.inner.exponential_ramp_to_value_at_time(value, end_time)
            }
            AutomationEvent::SetTarget {
                target,
                start_time,
                time_constant,
            } => self
                .inner
                .set_target_at_time(target, start_time, time_constant),
        }
    }
}

impl NativeParam for AdaptedParam {
    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }

    fn value(&self) -> f32 {
        self.inner.value()
    }

    fn set_value(&self, value: f32) -> Result<(), NativeError> {
        self.inner.set_value(value)?;
        if let Some(mirror) = &self.mirror {
            mirror.lock().set_intrinsic(value);
        }
        Ok(())
    }

    fn default_value(&self) -> f32 {
        self.inner.default_value()
    }

    fn min_value(&self) -> f32 {
        self.inner.min_value()
    }

    fn max_value(&self) -> f32 {
        self.inner.max_value()
    }

    fn set_value_at_time(&self, value: f32, start_time: f64) -> Result<(), NativeError> {
        self.inner.set_value_at_time(value, start_time)?;
        self.mirror(AutomationEvent::SetValue {
            value,
            time: start_time,
        });
        Ok(())
    }

    fn linear_ramp_to_value_at_time(&self, value: f32, end_time: f64) -> Result<(), NativeError> {
        self.inner.linear_ramp_to_value_at_time(value, end_time)?;
        self.mirror(AutomationEvent::LinearRamp { value, end_time });
        Ok(())
    }

    fn exponential_ramp_to_value_at_time(
        &self,
        value: f32,
        end_time: f64,
    ) -> Result<(), NativeError> {
        if self.validate_exponential_ramp && value == 0.0 {
            return Err(NativeError::range(
                "exponential ramp target must be nonzero",
            ));
        }
        self.inner.exponential_ramp_to_value_at_time(value, end_time)?;
        self.mirror(AutomationEvent::ExponentialRamp { value, end_time });
        Ok(())
    }

    fn set_target_at_time(
        &self,
        target: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<(), NativeError> {
        self.inner
            .set_target_at_time(target, start_time, time_constant)?;
        self.mirror(AutomationEvent::SetTarget {
            target,
            start_time,
            time_constant,
        });
        Ok(())
    }

    fn cancel_scheduled_values(&self, cancel_time: f64) -> Result<(), NativeError> {
        self.inner.cancel_scheduled_values(cancel_time)?;
        if let Some(mirror) = &self.mirror {
            mirror.lock().cancel_from(cancel_time);
        }
        Ok(())
    }

    fn cancel_and_hold_at_time(&self, cancel_time: f64) -> Result<(), NativeError> {
        let Some(mirror) = &self.mirror else {
            return self.inner.cancel_and_hold_at_time(cancel_time);
        };

        // Native cancel drops events at `cancel_time` too, so everything the
        // mirror keeps from that instant on is replayed.
        let replay: Vec<AutomationEvent> = {
            let mut timeline = mirror.lock();
            timeline.cancel_and_hold(cancel_time);
            timeline
                .events()
                .iter()
                .filter(|event| event.time() >= cancel_time)
                .copied()
                .collect()
        };

        self.inner.cancel_scheduled_values(cancel_time)?;
        for event in replay {
            self.schedule(event)?;
        }
        Ok(())
    }
}
