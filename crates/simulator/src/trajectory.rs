//! Simulation output: the value store, its phases, and any reported violations.

use jrsim_graph::{Key, Values, ValuesError};

use crate::collocation::CollocationScheme;
use crate::error::PhysicalConstraintViolation;
use crate::phase::{Phase, Regime, phase_index_at, step_times};

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    /// Every solved variable of steps `0..=num_steps()`, plus the control schedule.
    pub values: Values,
    pub phases: Vec<Phase>,
    pub violations: Vec<PhysicalConstraintViolation>,
    pub scheme: CollocationScheme,
    /// Step at which a run to apex stopped.
    pub apex_step: Option<usize>,
}

impl Trajectory {
    pub fn new(values: Values, scheme: CollocationScheme) -> Self {
        Self {
            values,
            phases: Vec::new(),
            violations: Vec::new(),
            scheme,
            apex_step: None,
        }
    }

    /// Interval count of every phase, in order.
    pub fn phase_steps(&self) -> Vec<usize> {
        self.phases.iter().map(|phase| phase.num_steps).collect()
    }

    /// Total number of intervals.
    pub fn num_steps(&self) -> usize {
        self.phases.iter().map(|phase| phase.num_steps).sum()
    }

    /// Last solved step, if any step was solved.
    pub fn last_step(&self) -> Option<usize> {
        self.values.last_step()
    }

    /// Regime governing step `k`.
    pub fn regime_at(&self, k: usize) -> Option<&Regime> {
        phase_index_at(&self.phases, k).map(|index| &self.phases[index].regime)
    }

    /// Nominal time of every step.
    pub fn times(&self) -> Vec<f64> {
        step_times(&self.phases)
    }

    /// Solved time of step `k`.
    pub fn time(&self, k: usize) -> Result<f64, ValuesError> {
        self.values.scalar(&Key::time(k))
    }

    /// Drop every time-indexed value after `last` and shorten the phases to match.
    ///
    /// Static values such as the control schedule are kept.
    pub fn truncate(&mut self, last: Option<usize>) {
        self.values
            .retain(|key| key.kind.is_static() || last.is_some_and(|last| key.step <= last));
        let Some(last) = last else {
            self.phases.clear();
            self.violations.clear();
            return;
        };
        self.phases.retain(|phase| phase.start_step <= last);
        if let Some(phase) = self.phases.last_mut() {
            phase.num_steps = phase.num_steps.min(last - phase.start_step);
        }
        self.violations.retain(|violation| violation.step <= last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_keeps_controls_and_shortens_phases() {
        let mut values = Values::new();
        for k in 0..=6 {
            values.insert_scalar(Key::time(k), k as f64 * 0.01);
        }
        values.insert_scalar(Key::valve_open_time(0), 0.0);
        let mut trajectory = Trajectory::new(values, CollocationScheme::Euler);
        trajectory.phases = vec![
            Phase {
                regime: Regime::Flight,
                start_step: 0,
                num_steps: 4,
                dt: 0.01,
            },
            Phase {
                regime: Regime::Flight,
                start_step: 4,
                num_steps: 2,
                dt: 0.01,
            },
        ];

        trajectory.truncate(Some(3));
        assert_eq!(trajectory.last_step(), Some(3));
        assert_eq!(trajectory.phase_steps(), vec![3]);
        assert!(trajectory.values.contains(&Key::valve_open_time(0)));

        trajectory.truncate(None);
        assert_eq!(trajectory.last_step(), None);
        assert!(trajectory.phases.is_empty());
        assert_eq!(trajectory.values.len(), 1);
    }
}
