//! Valve schedules and the valve-state predicate.

use crate::ModelError;

/// Discrete valve mode; selects which mass-flow factor a step graph contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveState {
    Open,
    Closed,
}

/// Open/close times of one valve, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValveTiming {
    pub open: f64,
    pub close: f64,
}

impl ValveTiming {
    /// The valve is open on the half-open interval `[open, close)`.
    pub fn state_at(&self, t: f64) -> ValveState {
        if t >= self.open && t < self.close {
            ValveState::Open
        } else {
            ValveState::Closed
        }
    }
}

/// Control schedule: one valve timing per actuator, indexed by actuator id.
#[derive(Debug, Clone, PartialEq)]
pub struct Controls {
    timings: Vec<ValveTiming>,
}

impl Controls {
    pub fn new(open_times: &[f64], close_times: &[f64]) -> Result<Self, ModelError> {
        if open_times.len() != close_times.len() {
            return Err(ModelError::ControlCount {
                expected: open_times.len(),
                actual: close_times.len(),
            });
        }
        let timings = open_times
            .iter()
            .zip(close_times)
            .map(|(&open, &close)| ValveTiming { open, close })
            .collect();
        Self::from_timings(timings)
    }

    pub fn from_timings(timings: Vec<ValveTiming>) -> Result<Self, ModelError> {
        for (actuator, timing) in timings.iter().enumerate() {
            if !(timing.open <= timing.close) {
                return Err(ModelError::InvalidValveTiming {
                    actuator,
                    open: timing.open,
                    close: timing.close,
                });
            }
        }
        Ok(Self { timings })
    }

    /// Every valve stays closed for the whole run.
    pub fn closed(num_actuators: usize) -> Self {
        Self {
            timings: vec![ValveTiming { open: 0.0, close: 0.0 }; num_actuators],
        }
    }

    pub fn len(&self) -> usize {
        self.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    pub fn timing(&self, actuator: usize) -> Option<&ValveTiming> {
        self.timings.get(actuator)
    }

    pub fn timings(&self) -> &[ValveTiming] {
        &self.timings
    }

    /// Valve state of `actuator` at time `t`; actuators without a timing stay closed.
    pub fn valve_state(&self, actuator: usize, t: f64) -> ValveState {
        self.timing(actuator)
            .map(|timing| timing.state_at(t))
            .unwrap_or(ValveState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_half_open() {
        let timing = ValveTiming {
            open: 0.01,
            close: 0.02,
        };
        assert_eq!(timing.state_at(0.005), ValveState::Closed);
        assert_eq!(timing.state_at(0.01), ValveState::Open);
        assert_eq!(timing.state_at(0.0199), ValveState::Open);
        assert_eq!(timing.state_at(0.02), ValveState::Closed);
    }

    #[test]
    fn open_after_close_is_rejected() {
        let err = Controls::new(&[0.0, 0.3], &[1.0, 0.2]).expect_err("invalid");
        assert!(matches!(err, ModelError::InvalidValveTiming { actuator: 1, .. }));
    }

    #[test]
    fn equal_open_and_close_never_opens() {
        let controls = Controls::closed(2);
        assert_eq!(controls.valve_state(0, 0.0), ValveState::Closed);
        assert_eq!(controls.valve_state(5, 0.0), ValveState::Closed);
    }
}
