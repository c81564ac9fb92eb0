//! Levenberg–Marquardt with column equilibration and multiplicative damping updates.

use jrsim_graph::{FactorGraph, Ordering, Values};
use tracing::{debug, trace};

use crate::{NonlinearSolver, SolveError, SolveReport, SolverParams, damped_step, equilibrate, finish};

/// Default solver for the per-step simulation graphs.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    params: SolverParams,
}

impl LevenbergMarquardt {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }
}

impl NonlinearSolver for LevenbergMarquardt {
    fn optimize(&self, graph: &FactorGraph, initial: &Values) -> Result<SolveReport, SolveError> {
        let p = &self.params;
        let ordering = Ordering::new(graph.keys());
        let mut values = initial.extract(ordering.keys())?;
        let mut error = graph.error(&values)?;
        let initial_error = error;
        let mut lambda = p.initial_lambda;
        let mut iterations = 0;

        while iterations < p.max_iterations && error.is_finite() && error > p.absolute_error_tol {
            iterations += 1;
            let lin = graph.linearize(&values, &ordering)?;
            let (scaled, norms) = equilibrate(&lin.jacobian);

            let mut accepted = None;
            while lambda <= p.max_lambda {
                if let Some(delta) = damped_step(&scaled, &lin.residual, &norms, lambda) {
                    let candidate = values.retract(&ordering, &delta);
                    let candidate_error = graph.error(&candidate)?;
                    if candidate_error.is_finite() && candidate_error < error {
                        lambda = (lambda / p.lambda_factor).max(p.min_lambda);
                        accepted = Some((candidate, candidate_error));
                        break;
                    }
                }
                lambda *= p.lambda_factor;
            }

            let Some((candidate, candidate_error)) = accepted else {
                trace!(iterations, error, lambda, "no descent step found");
                break;
            };
            let relative = (error - candidate_error) / error;
            trace!(iterations, error = candidate_error, lambda, "accepted step");
            values = candidate;
            error = candidate_error;
            if relative < p.relative_error_tol {
                break;
            }
        }

        debug!(
            iterations,
            initial_error,
            final_error = error,
            unknowns = ordering.dim(),
            "levenberg-marquardt finished"
        );
        finish(p, values, iterations, initial_error, error)
    }

    fn params(&self) -> &SolverParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{circle_graph, conflicting_graph};
    use approx::assert_relative_eq;
    use jrsim_graph::Key;

    #[test]
    fn converges_to_circle_line_intersection() {
        let (graph, initial) = circle_graph();
        let report = LevenbergMarquardt::default()
            .optimize(&graph, &initial)
            .expect("converges");
        let root = std::f64::consts::FRAC_1_SQRT_2;
        let a = report.values.scalar(&Key::joint_angle(0, 0)).expect("a");
        let b = report.values.scalar(&Key::joint_angle(1, 0)).expect("b");
        assert_relative_eq!(a, root, epsilon = 1e-9);
        assert_relative_eq!(b, root, epsilon = 1e-9);
        assert!(report.final_error < 1e-20);
    }

    #[test]
    fn inconsistent_priors_diverge_with_residual() {
        let (graph, initial) = conflicting_graph();
        let err = LevenbergMarquardt::default()
            .optimize(&graph, &initial)
            .expect_err("cannot satisfy both priors");
        match err {
            SolveError::Divergence(divergence) => {
                assert_relative_eq!(divergence.error, 0.25, epsilon = 1e-9);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_budget_reports_initial_error() {
        let (graph, initial) = circle_graph();
        let solver = LevenbergMarquardt::new(SolverParams {
            max_iterations: 0,
            ..SolverParams::default()
        });
        let err = solver.optimize(&graph, &initial).expect_err("no iterations");
        let SolveError::Divergence(divergence) = err else {
            panic!("expected divergence");
        };
        assert_eq!(divergence.iterations, 0);
        assert_eq!(divergence.error, divergence.initial_error);
    }
}
