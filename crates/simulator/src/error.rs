//! Errors raised by per-step solves and whole simulation runs.

use jrsim_graph::{ConfigurationError, Key, ValuesError};
use jrsim_model::ModelError;
use jrsim_solver::{SolveDivergence, SolveError};
use thiserror::Error;

use crate::trajectory::Trajectory;

/// Failure of a single per-step solve.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error(transparent)]
    Values(#[from] ValuesError),
    #[error("ill-posed step graph: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Divergence(#[from] SolveDivergence),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<SolveError> for StepError {
    fn from(err: SolveError) -> Self {
        match err {
            SolveError::Values(err) => StepError::Values(err),
            SolveError::Divergence(err) => StepError::Divergence(err),
        }
    }
}

/// A solved pressure, volume, or gas mass outside its physical range.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{key} = {value:.6e} outside [{lower:.6e}, {upper:.6e}] at step {step}")]
pub struct PhysicalConstraintViolation {
    pub step: usize,
    pub key: Key,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// What a run does when a solved step violates a physical bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolationPolicy {
    /// Record the violation on the trajectory and continue.
    #[default]
    Report,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("{stage} failed at step {step}: {source}")]
    Step {
        step: usize,
        stage: &'static str,
        source: StepError,
    },
    #[error(transparent)]
    Violation(#[from] PhysicalConstraintViolation),
}

impl SimulationError {
    /// The solver divergence behind this error, if any.
    pub fn divergence(&self) -> Option<&SolveDivergence> {
        match self {
            SimulationError::Step {
                source: StepError::Divergence(divergence),
                ..
            } => Some(divergence),
            _ => None,
        }
    }
}

/// An aborted run: the step it stopped at, why, and everything solved before it.
#[derive(Debug, Clone, Error)]
#[error("simulation aborted at step {step}: {error}")]
pub struct SimulationFailure {
    pub step: usize,
    #[source]
    pub error: SimulationError,
    pub partial: Trajectory,
}
