//! Param automation timeline.
//!
//! A sorted list of scheduled events and the curve they describe. The
//! cancel-and-hold adapter mirrors a native param's schedule here so it can
//! compute the held value itself, and engines without their own automation
//! can evaluate params with it.

/// One scheduled automation event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutomationEvent {
    /// Jump to `value` at `time`.
    SetValue {
        /// Target value.
        value: f32,
        /// Start time in seconds.
        time: f64,
    },
    /// Ramp linearly from the previous event to `value` at `end_time`.
    LinearRamp {
        /// Value reached at `end_time`.
        value: f32,
        /// End time in seconds.
        end_time: f64,
    },
    /// Ramp exponentially from the previous event to `value` at `end_time`.
    ExponentialRamp {
        /// Value reached at `end_time`.
        value: f32,
        /// End time in seconds.
        end_time: f64,
    },
    /// Approach `target` exponentially from `start_time`.
    SetTarget {
        /// Asymptote.
        target: f32,
        /// Start time in seconds.
        start_time: f64,
        /// Time constant in seconds.
        time_constant: f64,
    },
}

impl AutomationEvent {
    /// Time at which the event is placed on the timeline.
    pub fn time(&self) -> f64 {
        match *self {
            AutomationEvent::SetValue { time, .. } => time,
            AutomationEvent::LinearRamp { end_time, .. }
            | AutomationEvent::ExponentialRamp { end_time, .. } => end_time,
            AutomationEvent::SetTarget { start_time, .. } => start_time,
        }
    }

    fn is_ramp(&self) -> bool {
        matches!(
            self,
            AutomationEvent::LinearRamp { .. } | AutomationEvent::ExponentialRamp { .. }
        )
    }
}

/// Sorted automation events for one param.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationTimeline {
    intrinsic: f32,
    events: Vec<AutomationEvent>,
}

impl AutomationTimeline {
    /// A timeline holding `intrinsic` until something is scheduled.
    pub fn new(intrinsic: f32) -> Self {
        Self {
            intrinsic,
            events: Vec::new(),
        }
    }

    /// Value before the first event.
    pub fn intrinsic(&self) -> f32 {
        self.intrinsic
    }

    /// Sets the value before the first event.
    pub fn set_intrinsic(&mut self, value: f32) {
        self.intrinsic = value;
    }

    /// Scheduled events in time order.
    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    /// Schedules an event. Events at equal times keep insertion order.
    pub fn insert(&mut self, event: AutomationEvent) {
        let at = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(at, event);
    }

    /// Removes every event at or after `time`.
    pub fn cancel_from(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Removes events after `time` and holds the value reached there.
    ///
    /// A ramp that was in progress at `time` is truncated to end at `time`
    /// with the value it had reached. Returns the held value.
    pub fn cancel_and_hold(&mut self, time: f64) -> f32 {
        let held = self.value_at(time);
        let first_after = self.events.partition_point(|e| e.time() <= time);
        let truncated = match self.events.get(first_after) {
            Some(AutomationEvent::LinearRamp { .. }) => Some(AutomationEvent::LinearRamp {
                value: held,
                end_time: time,
            }),
            Some(AutomationEvent::ExponentialRamp { .. }) => {
                Some(AutomationEvent::ExponentialRamp {
                    value: held,
                    end_time: time,
                })
            }
            _ => None,
        };
        self.events.truncate(first_after);
        self.events.push(truncated.unwrap_or(AutomationEvent::SetValue {
            value: held,
            time,
        }));
        held
    }

    /// Value of the curve at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        let mut value = self.intrinsic;
        let mut from = 0.0_f64;

        for (i, event) in self.events.iter().enumerate() {
            match *event {
                AutomationEvent::SetValue { value: v, time: t } => {
                    if time < t {
                        return value;
                    }
                    value = v;
                    from = t;
                }
                AutomationEvent::LinearRamp { value: v, end_time } => {
                    if time < end_time {
                        let span = end_time - from;
                        if span <= 0.0 {
                            return value;
                        }
                        let progress = ((time - from) / span).clamp(0.0, 1.0) as f32;
                        return value + (v - value) * progress;
                    }
                    value = v;
                    from = end_time;
                }
                AutomationEvent::ExponentialRamp { value: v, end_time } => {
                    if time < end_time {
                        let span = end_time - from;
                        // Zero or sign-crossing endpoints hold the start value.
                        if span <= 0.0 || value * v <= 0.0 {
                            return value;
                        }
                        let progress = ((time - from) / span).clamp(0.0, 1.0) as f32;
                        return value * (v / value).powf(progress);
                    }
                    value = v;
                    from = end_time;
                }
                AutomationEvent::SetTarget {
                    target,
                    start_time,
                    time_constant,
                } => {
                    if time < start_time {
                        return value;
                    }
                    let initial = value;
                    let approach = |at: f64| -> f32 {
                        if time_constant <= 0.0 {
                            return target;
                        }
                        let decay = (-(at - start_time) / time_constant).exp() as f32;
                        target + (initial - target) * decay
                    };
                    match self.events.get(i + 1) {
                        None => return approach(time),
                        Some(next) if next.is_ramp() => {
                            // A following ramp starts where the approach began.
                            from = start_time;
                        }
                        Some(next) => {
                            if time < next.time() {
                                return approach(time);
                            }
                            value = approach(next.time());
                            from = next.time();
                        }
                    }
                }
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn intrinsic_before_events() {
        let mut timeline = AutomationTimeline::new(0.5);
        timeline.insert(AutomationEvent::SetValue { value: 1.0, time: 2.0 });
        assert_eq!(timeline.value_at(1.0), 0.5);
        assert_eq!(timeline.value_at(2.0), 1.0);
    }

    #[test]
    fn linear_ramp_interpolates() {
        let mut timeline = AutomationTimeline::new(0.0);
        timeline.insert(AutomationEvent::SetValue { value: 0.0, time: 0.0 });
        timeline.insert(AutomationEvent::LinearRamp { value: 1.0, end_time: 1.0 });
        assert!(close(timeline.value_at(0.25), 0.25));
        assert!(close(timeline.value_at(0.5), 0.5));
        assert_eq!(timeline.value_at(3.0), 1.0);
    }

    #[test]
    fn exponential_ramp_interpolates_geometrically() {
        let mut timeline = AutomationTimeline::new(1.0);
        timeline.insert(AutomationEvent::ExponentialRamp { value: 4.0, end_time: 2.0 });
        assert!(close(timeline.value_at(1.0), 2.0));
    }

    #[test]
    fn exponential_ramp_to_zero_holds() {
        let mut timeline = AutomationTimeline::new(1.0);
        timeline.insert(AutomationEvent::ExponentialRamp { value: 0.0, end_time: 1.0 });
        assert_eq!(timeline.value_at(0.5), 1.0);
        assert_eq!(timeline.value_at(1.0), 0.0);
    }

    #[test]
    fn set_target_approaches() {
        let mut timeline = AutomationTimeline::new(1.0);
        timeline.insert(AutomationEvent::SetTarget {
            target: 0.0,
            start_time: 0.0,
            time_constant: 1.0,
        });
        assert!(close(timeline.value_at(1.0), (-1.0_f64).exp() as f32));
    }

    #[test]
    fn insert_keeps_time_order() {
        let mut timeline = AutomationTimeline::new(0.0);
        timeline.insert(AutomationEvent::SetValue { value: 2.0, time: 2.0 });
        timeline.insert(AutomationEvent::SetValue { value: 1.0, time: 1.0 });
        timeline.insert(AutomationEvent::SetValue { value: 3.0, time: 2.0 });
        let times: Vec<_> = timeline.events().iter().map(AutomationEvent::time).collect();
        assert_eq!(times, vec![1.0, 2.0, 2.0]);
        assert_eq!(timeline.value_at(2.5), 3.0);
    }

    #[test]
    fn cancel_from_drops_later_events() {
        let mut timeline = AutomationTimeline::new(0.0);
        timeline.insert(AutomationEvent::SetValue { value: 1.0, time: 1.0 });
        timeline.insert(AutomationEvent::SetValue { value: 2.0, time: 2.0 });
        timeline.cancel_from(2.0);
        assert_eq!(timeline.events().len(), 1);
        assert_eq!(timeline.value_at(5.0), 1.0);
    }

    #[test]
    fn cancel_and_hold_truncates_ramp() {
        let mut timeline = AutomationTimeline::new(0.0);
        timeline.insert(AutomationEvent::SetValue { value: 0.0, time: 0.0 });
        timeline.insert(AutomationEvent::LinearRamp { value: 1.0, end_time: 1.0 });

        let held = timeline.cancel_and_hold(0.5);
        assert!(close(held, 0.5));
        assert!(close(timeline.value_at(0.25), 0.25));
        assert!(close(timeline.value_at(10.0), 0.5));
        assert!(matches!(
            timeline.events().last(),
            Some(AutomationEvent::LinearRamp { end_time, .. }) if *end_time == 0.5
        ));
    }

    #[test]
    fn cancel_and_hold_freezes_target_curve() {
        let mut timeline = AutomationTimeline::new(1.0);
        timeline.insert(AutomationEvent::SetTarget {
            target: 0.0,
            start_time: 0.0,
            time_constant: 1.0,
        });
        let held = timeline.cancel_and_hold(1.0);
        assert!(close(timeline.value_at(4.0), held));
    }
}
