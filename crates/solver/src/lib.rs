//! Nonlinear least-squares solvers consumed as "graph + initial values → converged values or failure".

use jrsim_graph::{FactorGraph, Values, ValuesError};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

pub mod gauss_newton;
pub mod levenberg;

pub use gauss_newton::GaussNewton;
pub use levenberg::LevenbergMarquardt;

/// Iteration and tolerance budget shared by the solvers.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
    pub max_iterations: usize,
    /// Stop once the graph error drops below this value.
    pub absolute_error_tol: f64,
    /// Stop once an accepted step reduces the error by less than this fraction.
    pub relative_error_tol: f64,
    /// A finished solve counts as converged only at or below this error.
    pub convergence_error_tol: f64,
    pub initial_lambda: f64,
    pub lambda_factor: f64,
    pub min_lambda: f64,
    pub max_lambda: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            absolute_error_tol: 1e-24,
            relative_error_tol: 1e-12,
            convergence_error_tol: 1e-10,
            initial_lambda: 1e-6,
            lambda_factor: 10.0,
            min_lambda: 1e-12,
            max_lambda: 1e10,
        }
    }
}

/// Outcome of a converged solve.
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Values of every key referenced by the graph.
    pub values: Values,
    pub iterations: usize,
    pub initial_error: f64,
    pub final_error: f64,
}

/// The solver stopped without reaching its convergence tolerance.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("solver did not converge after {iterations} iterations: error {error:.3e} (initial {initial_error:.3e})")]
pub struct SolveDivergence {
    pub iterations: usize,
    /// Graph error at the last iterate.
    pub error: f64,
    pub initial_error: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error(transparent)]
    Values(#[from] ValuesError),
    #[error(transparent)]
    Divergence(#[from] SolveDivergence),
}

/// A nonlinear least-squares capability over factor graphs.
pub trait NonlinearSolver: Send + Sync {
    /// Minimise the graph error starting from `initial`, which must hold a value for every key.
    fn optimize(&self, graph: &FactorGraph, initial: &Values) -> Result<SolveReport, SolveError>;

    fn params(&self) -> &SolverParams;
}

/// Solver selection for configuration files and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    #[default]
    LevenbergMarquardt,
    GaussNewton,
}

/// Build a boxed solver of the requested kind.
pub fn build_solver(kind: SolverKind, params: SolverParams) -> Box<dyn NonlinearSolver> {
    match kind {
        SolverKind::LevenbergMarquardt => Box::new(LevenbergMarquardt::new(params)),
        SolverKind::GaussNewton => Box::new(GaussNewton::new(params)),
    }
}

/// Scale Jacobian columns to unit norm; returns the scaled matrix and the column norms.
pub(crate) fn equilibrate(jacobian: &DMatrix<f64>) -> (DMatrix<f64>, DVector<f64>) {
    let mut scaled = jacobian.clone();
    let mut norms = DVector::from_element(jacobian.ncols(), 1.0);
    for (j, mut column) in scaled.column_iter_mut().enumerate() {
        let norm = column.norm();
        if norm > f64::MIN_POSITIVE {
            column /= norm;
            norms[j] = norm;
        }
    }
    (scaled, norms)
}

/// Solve `(JᵀJ + λI) δ = −Jᵀr` in equilibrated columns and map δ back.
pub(crate) fn damped_step(
    scaled: &DMatrix<f64>,
    residual: &DVector<f64>,
    norms: &DVector<f64>,
    lambda: f64,
) -> Option<DVector<f64>> {
    let mut normal = scaled.transpose() * scaled;
    let gradient = scaled.transpose() * residual;
    for i in 0..normal.nrows() {
        normal[(i, i)] += lambda;
    }
    let scaled_step = match normal.clone().cholesky() {
        Some(chol) => chol.solve(&gradient),
        None => normal.lu().solve(&gradient)?,
    };
    let step = -scaled_step.component_div(norms);
    step.iter().all(|v| v.is_finite()).then_some(step)
}

pub(crate) fn finish(
    params: &SolverParams,
    values: Values,
    iterations: usize,
    initial_error: f64,
    error: f64,
) -> Result<SolveReport, SolveError> {
    if !error.is_finite() || error > params.convergence_error_tol {
        return Err(SolveDivergence {
            iterations,
            error,
            initial_error,
        }
        .into());
    }
    Ok(SolveReport {
        values,
        iterations,
        initial_error,
        final_error: error,
    })
}
