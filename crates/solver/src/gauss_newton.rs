//! Undamped Gauss–Newton iteration.

use jrsim_graph::{FactorGraph, Ordering, Values};
use tracing::{debug, trace};

use crate::{NonlinearSolver, SolveError, SolveReport, SolverParams, damped_step, equilibrate, finish};

#[derive(Debug, Clone, Default)]
pub struct GaussNewton {
    params: SolverParams,
}

impl GaussNewton {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }
}

impl NonlinearSolver for GaussNewton {
    fn optimize(&self, graph: &FactorGraph, initial: &Values) -> Result<SolveReport, SolveError> {
        let p = &self.params;
        let ordering = Ordering::new(graph.keys());
        let mut values = initial.extract(ordering.keys())?;
        let mut error = graph.error(&values)?;
        let initial_error = error;
        let mut iterations = 0;

        while iterations < p.max_iterations && error.is_finite() && error > p.absolute_error_tol {
            iterations += 1;
            let lin = graph.linearize(&values, &ordering)?;
            let (scaled, norms) = equilibrate(&lin.jacobian);
            let Some(delta) = damped_step(&scaled, &lin.residual, &norms, 0.0) else {
                trace!(iterations, "singular normal equations");
                break;
            };
            let next = values.retract(&ordering, &delta);
            let next_error = graph.error(&next)?;
            trace!(iterations, error = next_error, "gauss-newton step");
            let relative = (error - next_error).abs() / error;
            values = next;
            error = next_error;
            if relative < p.relative_error_tol {
                break;
            }
        }

        debug!(iterations, initial_error, final_error = error, "gauss-newton finished");
        finish(p, values, iterations, initial_error, error)
    }

    fn params(&self) -> &SolverParams {
        &self.params
    }
}
