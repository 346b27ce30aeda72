//! Per-frame signal evaluation.
//!
//! The simulated engine only tracks one DC value per node per frame. That is
//! enough to tell signal from silence, which is all the shim's behavior can
//! be judged by. Nodes on a cycle output zero, matching how native engines
//! mute cycles that contain no delay.

use std::sync::Arc;

use concord_core::{NodeKind, cycle_members};

use crate::context::{NodeSlot, SimEdge};
use crate::param::SimParam;

/// Start and stop times of a source node.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SourceSchedule {
    pub(crate) start: Option<f64>,
    pub(crate) stop: Option<f64>,
    ended: bool,
}

impl SourceSchedule {
    fn active(&self, time: f64) -> bool {
        self.start.is_some_and(|start| time >= start) && self.stop.is_none_or(|stop| time < stop)
    }

    /// Marks the source ended once `end_time` has passed its stop time.
    /// Returns the stop time the first time that happens.
    pub(crate) fn take_ended(&mut self, end_time: f64) -> Option<f64> {
        match self.stop {
            Some(stop) if !self.ended && self.start.is_some() && stop <= end_time => {
                self.ended = true;
                Some(stop)
            }
            _ => None,
        }
    }
}

struct Step {
    index: usize,
    kind: NodeKind,
    schedule: SourceSchedule,
    params: Vec<Arc<SimParam>>,
    /// Sources feeding the node's inputs.
    inputs: Vec<usize>,
    /// Sources feeding each param.
    param_inputs: Vec<Vec<usize>>,
}

/// Snapshot of a context's graph in evaluation order.
pub(crate) struct Evaluator {
    steps: Vec<Step>,
    node_count: usize,
}

impl Evaluator {
    pub(crate) fn new(slots: &[NodeSlot]) -> Self {
        let node_count = slots.len();
        let dependencies: Vec<(usize, usize)> = slots
            .iter()
            .enumerate()
            .flat_map(|(from, slot)| slot.edges.iter().map(move |edge| (from, edge.target_node())))
            .collect();
        let cyclic = cycle_members(node_count, &dependencies);

        let mut steps: Vec<Option<Step>> = slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                (!cyclic[index]).then(|| Step {
                    index,
                    kind: slot.kind,
                    schedule: slot.schedule,
                    params: slot.params.clone(),
                    inputs: Vec::new(),
                    param_inputs: vec![Vec::new(); slot.params.len()],
                })
            })
            .collect();

        // Edges from muted nodes carry nothing and are left out.
        let mut in_degree = vec![0usize; node_count];
        let mut successors = vec![Vec::new(); node_count];
        for (from, slot) in slots.iter().enumerate() {
            if cyclic[from] {
                continue;
            }
            for edge in &slot.edges {
                let to = edge.target_node();
                let Some(step) = steps.get_mut(to).and_then(Option::as_mut) else {
                    continue;
                };
                match *edge {
                    SimEdge::Node { .. } => step.inputs.push(from),
                    SimEdge::Param { param, .. } => {
                        if let Some(inputs) = step.param_inputs.get_mut(param) {
                            inputs.push(from);
                        }
                    }
                }
                in_degree[to] += 1;
                successors[from].push(to);
            }
        }

        // Kahn order over the acyclic remainder.
        let mut ready: Vec<usize> = (0..node_count)
            .filter(|&i| !cyclic[i] && in_degree[i] == 0)
            .collect();
        let mut ordered = Vec::with_capacity(node_count);
        while let Some(index) = ready.pop() {
            if let Some(step) = steps[index].take() {
                ordered.push(step);
            }
            for &next in &successors[index] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(next);
                }
            }
        }

        let muted = cyclic.iter().filter(|&&c| c).count();
        if muted > 0 {
            tracing::debug!(muted, "sim_cycle_muted");
        }

        Self {
            steps: ordered,
            node_count,
        }
    }

    /// Evaluates one frame and returns the destination's value.
    pub(crate) fn frame(&self, time: f64) -> f32 {
        let mut values = vec![0.0_f32; self.node_count];
        for step in &self.steps {
            let input: f32 = step.inputs.iter().map(|&source| values[source]).sum();
            let param = |i: usize| -> f32 {
                let scheduled = step.params.get(i).map_or(0.0, |p| p.value_at(time));
                let modulation: f32 = step
                    .param_inputs
                    .get(i)
                    .map_or(0.0, |sources| sources.iter().map(|&s| values[s]).sum());
                scheduled + modulation
            };
            let value = match step.kind {
                NodeKind::Gain => input * param(0),
                NodeKind::ConstantSource => {
                    if step.schedule.active(time) {
                        param(0)
                    } else {
                        0.0
                    }
                }
                // The simulated filter is a lowpass, whose DC gain is one.
                NodeKind::BiquadFilter
                | NodeKind::Destination
                | NodeKind::ChannelMerger { .. }
                | NodeKind::Processor { .. } => input,
            };
            values[step.index] = value;
        }
        values.first().copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_activity() {
        let mut schedule = SourceSchedule::default();
        assert!(!schedule.active(0.0));
        schedule.start = Some(0.5);
        assert!(!schedule.active(0.25));
        assert!(schedule.active(0.5));
        schedule.stop = Some(1.0);
        assert!(schedule.active(0.75));
        assert!(!schedule.active(1.0));
    }

    #[test]
    fn ended_fires_once() {
        let mut schedule = SourceSchedule {
            start: Some(0.0),
            stop: Some(1.0),
            ended: false,
        };
        assert_eq!(schedule.take_ended(0.5), None);
        assert_eq!(schedule.take_ended(1.0), Some(1.0));
        assert_eq!(schedule.take_ended(2.0), None);
    }

    #[test]
    fn unstarted_source_never_ends() {
        let mut schedule = SourceSchedule {
            start: None,
            stop: Some(1.0),
            ended: false,
        };
        assert_eq!(schedule.take_ended(5.0), None);
    }
}
