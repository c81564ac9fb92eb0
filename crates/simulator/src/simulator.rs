//! The stepping state machine that turns per-step graphs into a trajectory.

use jrsim_config::{CollocationConfig, JumpingRobotConfig, SolverKindConfig, ViolationPolicyConfig};
use jrsim_graph::{FactorGraph, Key, Values, ValuesError};
use jrsim_model::{Controls, JumpingRobot, ModelError, SOURCE_ID};
use jrsim_solver::{NonlinearSolver, SolverKind, SolverParams, build_solver};
use tracing::{debug, info, trace, warn};

use crate::collocation::{CollocationScheme, StepDuration};
use crate::error::{PhysicalConstraintViolation, SimulationError, SimulationFailure, StepError, ViolationPolicy};
use crate::graph_builder::JRGraphBuilder;
use crate::jr_values::{control_values, init_config_values, initial_guess};
use crate::phase::{Phase, Regime, initial_regime, is_apex, next_regime};
use crate::trajectory::Trajectory;

fn at(step: usize, stage: &'static str) -> impl FnOnce(StepError) -> SimulationError {
    move |source| SimulationError::Step { step, stage, source }
}

fn values_at(step: usize, stage: &'static str) -> impl FnOnce(ValuesError) -> SimulationError {
    move |err| SimulationError::Step {
        step,
        stage,
        source: err.into(),
    }
}

/// Solves a jumping robot forward in time, one graph per step.
///
/// The simulator owns the robot, the graph builder, and the solver. The value
/// store of a run is created by [`JRSimulator::simulate`] and returned inside
/// the [`Trajectory`]; past steps are never rewritten.
pub struct JRSimulator {
    jr: JumpingRobot,
    builder: JRGraphBuilder,
    solver: Box<dyn NonlinearSolver>,
    scheme: CollocationScheme,
    policy: ViolationPolicy,
}

impl JRSimulator {
    /// Euler collocation, Levenberg–Marquardt, and reported violations.
    pub fn new(jr: JumpingRobot) -> Self {
        let builder = JRGraphBuilder::for_robot(&jr);
        Self {
            jr,
            builder,
            solver: build_solver(SolverKind::default(), SolverParams::default()),
            scheme: CollocationScheme::default(),
            policy: ViolationPolicy::default(),
        }
    }

    /// Robot, solver budget, collocation scheme, and violation policy from one description.
    pub fn from_config(config: &JumpingRobotConfig) -> Result<Self, ModelError> {
        let jr = JumpingRobot::from_config(config)?;
        let solver = &config.solver;
        let kind = match solver.kind {
            SolverKindConfig::LevenbergMarquardt => SolverKind::LevenbergMarquardt,
            SolverKindConfig::GaussNewton => SolverKind::GaussNewton,
        };
        let params = SolverParams {
            max_iterations: solver.max_iterations,
            convergence_error_tol: solver.convergence_error_tol,
            relative_error_tol: solver.relative_error_tol,
            ..SolverParams::default()
        };
        let scheme = match config.simulation.collocation {
            CollocationConfig::Euler => CollocationScheme::Euler,
            CollocationConfig::Trapezoidal => CollocationScheme::Trapezoidal,
        };
        let policy = match config.simulation.violation_policy {
            ViolationPolicyConfig::Report => ViolationPolicy::Report,
            ViolationPolicyConfig::Abort => ViolationPolicy::Abort,
        };
        Ok(Self::new(jr)
            .with_solver(build_solver(kind, params))
            .with_scheme(scheme)
            .with_violation_policy(policy))
    }

    pub fn with_solver(mut self, solver: Box<dyn NonlinearSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_scheme(mut self, scheme: CollocationScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_graph_builder(mut self, builder: JRGraphBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn robot(&self) -> &JumpingRobot {
        &self.jr
    }

    pub fn graph_builder(&self) -> &JRGraphBuilder {
        &self.builder
    }

    pub fn scheme(&self) -> CollocationScheme {
        self.scheme
    }

    /// Check, seed, and solve `graph`, returning the values of its keys.
    fn solve(&self, graph: &FactorGraph, values: &Values) -> Result<Values, StepError> {
        graph.check_structure()?;
        let guess = initial_guess(graph, values);
        let report = self.solver.optimize(graph, &guess)?;
        trace!(
            factors = graph.len(),
            iterations = report.iterations,
            initial_error = report.initial_error,
            final_error = report.final_error,
            "step graph solved"
        );
        Ok(report.values)
    }

    /// Link poses and twists at `k` from the base state and joint coordinates.
    pub fn step_robot_kinematics(&self, k: usize, values: &mut Values) -> Result<(), StepError> {
        let robot = &self.jr.robot;
        let builder = self.builder.robot_graph_builder();
        let mut graph = builder.kinematics_graph(robot, k);
        graph.append(builder.prior_graph(robot, values, k)?);
        let solved = self.solve(&graph, values)?;
        values.merge_step(&solved, k);
        Ok(())
    }

    /// Forward dynamics at `k`: accelerations, wrenches, and contact forces from known torques.
    pub fn step_robot_dynamics(&self, k: usize, regime: &Regime, values: &mut Values) -> Result<(), StepError> {
        let robot = &self.jr.robot;
        let builder = self.builder.robot_graph_builder();
        self.drop_released_contacts(k, regime, values);
        let mut graph = builder.dynamics_graph(robot, regime.contacts(), k);
        graph.append(builder.prior_graph(robot, values, k)?);
        graph.append(builder.torque_priors(robot, values, k)?);
        let solved = self.solve(&graph, values)?;
        values.merge_step(&solved, k);
        Ok(())
    }

    /// Inverse dynamics at `k`: torques, wrenches, and contact forces from known joint accelerations.
    pub fn step_robot_inverse_dynamics(&self, k: usize, regime: &Regime, values: &mut Values) -> Result<(), StepError> {
        let robot = &self.jr.robot;
        let builder = self.builder.robot_graph_builder();
        self.drop_released_contacts(k, regime, values);
        let mut graph = builder.dynamics_graph(robot, regime.contacts(), k);
        graph.append(builder.prior_graph(robot, values, k)?);
        graph.append(builder.acceleration_priors(robot, values, k)?);
        let solved = self.solve(&graph, values)?;
        values.merge_step(&solved, k);
        Ok(())
    }

    /// Chamber and source state, flows, and actuator torques at `k` and nominal time `t`.
    pub fn step_actuation_dynamics(&self, k: usize, controls: &Controls, t: f64, values: &mut Values) -> Result<(), StepError> {
        let builder = self.builder.actuation_graph_builder();
        let valves = JRGraphBuilder::valve_states(&self.jr, controls, t);
        let mut graph = builder.dynamics_graph(&self.jr, &valves, k)?;
        graph.append(builder.prior_graph(&self.jr, values, k)?);
        graph.append(self.builder.passive_torque_priors(&self.jr, k));
        let solved = self.solve(&graph, values)?;
        values.merge_step(&solved, k);
        Ok(())
    }

    /// Advance the collocated state from `k` to `k+1`.
    ///
    /// Euler solves only the interval with step `k` pinned. Trapezoidal solves
    /// the interval together with the full step graph of `k+1` in `regime`.
    #[allow(clippy::too_many_arguments)]
    pub fn step_integration(
        &self,
        k: usize,
        dt: f64,
        scheme: CollocationScheme,
        regime: &Regime,
        controls: &Controls,
        t_next: f64,
        values: &mut Values,
    ) -> Result<(), StepError> {
        let mut graph = self
            .builder
            .collocation_graph(&self.jr, k, StepDuration::Fixed(dt), scheme);
        let pinned: Vec<Key> = graph.keys().into_iter().filter(|key| key.step == k).collect();
        graph.append(self.builder.state_priors(values, &pinned)?);
        if scheme == CollocationScheme::Trapezoidal {
            graph.append(self.builder.step_graph(&self.jr, controls, regime, k + 1, t_next)?);
        }
        let solved = self.solve(&graph, values)?;
        values.merge_step(&solved, k + 1);
        Ok(())
    }

    /// Contact forces at `k` of contacts the regime no longer holds.
    fn drop_released_contacts(&self, k: usize, regime: &Regime, values: &mut Values) {
        for contact in self.jr.robot.contacts() {
            if !regime.contacts().iter().any(|active| active.contact == contact.id) {
                values.remove(&Key::contact_force(contact.id, k));
            }
        }
    }

    /// Solve everything at `k+1` in `regime`.
    fn advance(&self, k: usize, dt: f64, regime: &Regime, controls: &Controls, t_next: f64, values: &mut Values) -> Result<(), SimulationError> {
        let next = k + 1;
        self.step_integration(k, dt, CollocationScheme::Euler, regime, controls, t_next, values)
            .map_err(at(next, "integration"))?;
        self.step_robot_kinematics(next, values)
            .map_err(at(next, "kinematics"))?;
        self.step_actuation_dynamics(next, controls, t_next, values)
            .map_err(at(next, "actuation"))?;
        self.step_robot_dynamics(next, regime, values)
            .map_err(at(next, "dynamics"))?;
        if self.scheme == CollocationScheme::Trapezoidal {
            // The Euler chain above seeds the simultaneous solve.
            self.step_integration(k, dt, CollocationScheme::Trapezoidal, regime, controls, t_next, values)
                .map_err(at(next, "integration"))?;
        }
        Ok(())
    }

    /// Run `num_steps` intervals of length `dt` under `controls`.
    pub fn simulate(&self, num_steps: usize, dt: f64, controls: &Controls) -> Result<Trajectory, Box<SimulationFailure>> {
        self.run(num_steps, dt, controls, false)
    }

    /// Run until the base reaches its apex in flight, or `max_steps` intervals.
    pub fn simulate_to_apex(&self, max_steps: usize, dt: f64, controls: &Controls) -> Result<Trajectory, Box<SimulationFailure>> {
        self.run(max_steps, dt, controls, true)
    }

    fn run(&self, num_steps: usize, dt: f64, controls: &Controls, to_apex: bool) -> Result<Trajectory, Box<SimulationFailure>> {
        let mut trajectory = Trajectory::new(control_values(controls), self.scheme);
        let mut last_complete = None;
        info!(num_steps, dt, scheme = self.scheme.label(), to_apex, "starting simulation");

        let outcome = self
            .jr
            .check_controls(controls)
            .map_err(SimulationError::from)
            .and_then(|()| self.run_steps(&mut trajectory, &mut last_complete, num_steps, dt, controls, to_apex));

        match outcome {
            Ok(()) => {
                info!(
                    steps = trajectory.num_steps(),
                    phases = trajectory.phases.len(),
                    violations = trajectory.violations.len(),
                    apex_step = ?trajectory.apex_step,
                    "simulation finished"
                );
                Ok(trajectory)
            }
            Err(error) => {
                let step = match &error {
                    SimulationError::Step { step, .. } => *step,
                    SimulationError::Violation(violation) => violation.step,
                    SimulationError::Model(_) => 0,
                };
                warn!(step, %error, "simulation aborted");
                trajectory.truncate(last_complete);
                Err(Box::new(SimulationFailure {
                    step,
                    error,
                    partial: trajectory,
                }))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_steps(
        &self,
        trajectory: &mut Trajectory,
        last_complete: &mut Option<usize>,
        num_steps: usize,
        dt: f64,
        controls: &Controls,
        to_apex: bool,
    ) -> Result<(), SimulationError> {
        let jr = &self.jr;
        trajectory.values.merge(&init_config_values(jr));

        let values = &mut trajectory.values;
        self.step_robot_kinematics(0, values).map_err(at(0, "kinematics"))?;
        self.step_actuation_dynamics(0, controls, 0.0, values)
            .map_err(at(0, "actuation"))?;
        let mut regime = initial_regime(jr, values, 0).map_err(values_at(0, "phase detection"))?;
        self.step_robot_dynamics(0, &regime, values).map_err(at(0, "dynamics"))?;
        info!(regime = regime.label(), "initial regime");
        trajectory.phases.push(Phase {
            regime: regime.clone(),
            start_step: 0,
            num_steps: 0,
            dt,
        });
        *last_complete = Some(0);
        self.check_step(trajectory, 0)?;

        let mut t = 0.0;
        for k in 0..num_steps {
            let next = k + 1;
            let t_next = t + dt;
            let values = &mut trajectory.values;
            self.advance(k, dt, &regime, controls, t_next, values)?;

            if next < num_steps {
                let detected = next_regime(jr, &regime, values, next).map_err(values_at(next, "phase detection"))?;
                if let Some(new_regime) = detected {
                    info!(step = next, from = regime.label(), to = new_regime.label(), "phase transition");
                    self.step_robot_dynamics(next, &new_regime, values)
                        .map_err(at(next, "dynamics"))?;
                    if self.scheme == CollocationScheme::Trapezoidal {
                        self.step_integration(k, dt, self.scheme, &new_regime, controls, t_next, values)
                            .map_err(at(next, "integration"))?;
                    }
                    if let Some(phase) = trajectory.phases.last_mut() {
                        phase.num_steps = next - phase.start_step;
                    }
                    trajectory.phases.push(Phase {
                        regime: new_regime.clone(),
                        start_step: next,
                        num_steps: 0,
                        dt,
                    });
                    regime = new_regime;
                }
            }

            if let Some(phase) = trajectory.phases.last_mut() {
                phase.num_steps = next - phase.start_step;
            }
            *last_complete = Some(next);
            t = t_next;
            debug!(step = next, t, regime = regime.label(), "step solved");
            self.check_step(trajectory, next)?;

            if to_apex && is_apex(jr, &regime, &trajectory.values, next).map_err(values_at(next, "apex detection"))? {
                info!(step = next, t, "apex reached");
                trajectory.apex_step = Some(next);
                break;
            }
        }
        Ok(())
    }

    /// Record or raise physical violations at `k` and warn about joint-limit excursions.
    fn check_step(&self, trajectory: &mut Trajectory, k: usize) -> Result<(), SimulationError> {
        let values = &trajectory.values;
        for joint in self.jr.robot.joints() {
            let Some(limits) = joint.limits else { continue };
            let q = values
                .scalar(&Key::joint_angle(joint.id, k))
                .map_err(values_at(k, "limit check"))?;
            if !limits.contains(q) {
                warn!(step = k, joint = %joint.name, q, lower = limits.lower, upper = limits.upper, "joint outside its limits");
            }
        }

        let violations = physical_violations(&self.jr, values, k).map_err(values_at(k, "bound check"))?;
        for violation in violations {
            warn!(%violation, "physical constraint violated");
            trajectory.violations.push(violation.clone());
            if self.policy == ViolationPolicy::Abort {
                return Err(violation.into());
            }
        }
        Ok(())
    }
}

fn bound(step: usize, key: Key, value: f64, lower: f64, upper: f64) -> Option<PhysicalConstraintViolation> {
    (value < lower || value > upper).then_some(PhysicalConstraintViolation {
        step,
        key,
        value,
        lower,
        upper,
    })
}

/// Pressures, volumes, and gas masses at `k` outside their physical ranges.
///
/// Chamber pressure lies in `[0, P_source]`, source pressure and gas masses are
/// non-negative, and volumes are strictly positive.
pub fn physical_violations(jr: &JumpingRobot, values: &Values, k: usize) -> Result<Vec<PhysicalConstraintViolation>, ValuesError> {
    let positive = f64::MIN_POSITIVE;
    let mut violations = Vec::new();
    let mut check = |key: Key, lower: f64, upper: f64| -> Result<(), ValuesError> {
        violations.extend(bound(k, key, values.scalar(&key)?, lower, upper));
        Ok(())
    };

    let source_pressure = values.scalar(&Key::source_pressure(SOURCE_ID, k))?;
    check(Key::source_pressure(SOURCE_ID, k), 0.0, f64::INFINITY)?;
    check(Key::source_volume(SOURCE_ID, k), positive, f64::INFINITY)?;
    check(Key::source_mass(SOURCE_ID, k), 0.0, f64::INFINITY)?;
    for actuator in &jr.actuators {
        check(Key::actuator_pressure(actuator.id, k), 0.0, source_pressure.max(0.0))?;
        check(Key::actuator_volume(actuator.id, k), positive, f64::INFINITY)?;
        check(Key::actuator_mass(actuator.id, k), 0.0, f64::INFINITY)?;
    }
    Ok(violations)
}
