//! Automatable param wrapper.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{AudioError, Result};
use crate::graph::{NodeId, ParamId};
use crate::identity::{WeakKey, stores};
use crate::native::NativeParamRef;

/// Shared state behind an [`AudioParam`] handle.
pub struct ParamInner {
    id: ParamId,
    name: &'static str,
    owner: NodeId,
    context: Context,
}

/// Handle to an automatable property of a node.
///
/// Clones share identity. The native param is looked up through the
/// identity stores on every call.
#[derive(Clone)]
pub struct AudioParam {
    inner: Arc<ParamInner>,
}

impl WeakKey for AudioParam {
    type Target = ParamInner;

    fn key_arc(&self) -> &Arc<ParamInner> {
        &self.inner
    }
}

fn check_value(value: f32) -> Result<()> {
    if !value.is_finite() {
        return Err(AudioError::type_error(format!("value {value} is not finite")));
    }
    Ok(())
}

fn check_time(time: f64) -> Result<()> {
    if !time.is_finite() {
        return Err(AudioError::type_error(format!("time {time} is not finite")));
    }
    if time < 0.0 {
        return Err(AudioError::range(format!("time {time} is negative")));
    }
    Ok(())
}

impl AudioParam {
    /// Creates the wrapper for `native` and registers the association.
    pub(crate) fn register(
        context: &Context,
        owner: NodeId,
        name: &'static str,
        native: NativeParamRef,
    ) -> Self {
        let param = Self {
            inner: Arc::new(ParamInner {
                id: ParamId::next(),
                name,
                owner,
                context: context.clone(),
            }),
        };
        stores().param_natives.set(&param, native);
        param
    }

    /// Stable id used by the context's connection graph.
    pub fn id(&self) -> ParamId {
        self.inner.id
    }

    /// Param name, e.g. `"gain"`.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Id of the node this param belongs to.
    pub fn owner(&self) -> NodeId {
        self.inner.owner
    }

    /// The owning context.
    pub fn context(&self) -> Context {
        self.inner.context.clone()
    }

    /// The (possibly adapted) native param.
    pub fn native(&self) -> NativeParamRef {
        stores().param_natives.require(self)
    }

    /// Current value.
    pub fn value(&self) -> f32 {
        self.native().value()
    }

    /// Sets the intrinsic value.
    pub fn set_value(&self, value: f32) -> Result<()> {
        check_value(value)?;
        Ok(self.native().set_value(value)?)
    }

    /// Default value.
    pub fn default_value(&self) -> f32 {
        self.native().default_value()
    }

    /// Smallest allowed value.
    pub fn min_value(&self) -> f32 {
        self.native().min_value()
    }

    /// Largest allowed value.
    pub fn max_value(&self) -> f32 {
        self.native().max_value()
    }

    /// Schedules an instant change to `value` at `start_time`.
    pub fn set_value_at_time(&self, value: f32, start_time: f64) -> Result<&Self> {
        check_value(value)?;
        check_time(start_time)?;
        self.native().set_value_at_time(value, start_time)?;
        Ok(self)
    }

    /// Schedules a linear ramp to `value` ending at `end_time`.
    pub fn linear_ramp_to_value_at_time(&self, value: f32, end_time: f64) -> Result<&Self> {
        check_value(value)?;
        check_time(end_time)?;
        self.native().linear_ramp_to_value_at_time(value, end_time)?;
        Ok(self)
    }

    /// Schedules an exponential ramp to `value` ending at `end_time`.
    ///
    /// A zero target is a `RangeError` on every engine.
    pub fn exponential_ramp_to_value_at_time(&self, value: f32, end_time: f64) -> Result<&Self> {
        check_value(value)?;
        check_time(end_time)?;
        self.native()
            .exponential_ramp_to_value_at_time(value, end_time)?;
        Ok(self)
    }

    /// Schedules an exponential approach to `target`.
    pub fn set_target_at_time(
        &self,
        target: f32,
        start_time: f64,
        time_constant: f64,
    ) -> Result<&Self> {
        check_value(target)?;
        check_time(start_time)?;
        check_time(time_constant)?;
        self.native()
            .set_target_at_time(target, start_time, time_constant)?;
        Ok(self)
    }

    /// Removes events at or after `cancel_time`.
    pub fn cancel_scheduled_values(&self, cancel_time: f64) -> Result<&Self> {
        check_time(cancel_time)?;
        self.native().cancel_scheduled_values(cancel_time)?;
        Ok(self)
    }

    /// Removes events after `cancel_time` and holds the value reached there.
    pub fn cancel_and_hold_at_time(&self, cancel_time: f64) -> Result<&Self> {
        check_time(cancel_time)?;
        self.native().cancel_and_hold_at_time(cancel_time)?;
        Ok(self)
    }
}

impl PartialEq for AudioParam {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for AudioParam {}

impl fmt::Debug for AudioParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioParam")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("owner", &self.inner.owner)
            .finish()
    }
}
