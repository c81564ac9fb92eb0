use std::sync::atomic::{AtomicUsize, Ordering};

use jrsim::config::JumpingRobotConfig;
use jrsim::graph::{FactorGraph, Key, Values, VarKind};
use jrsim::model::Controls;
use jrsim::simulator::{JRSimulator, Regime, SimulationError, ViolationPolicy};
use jrsim::solver::{
    LevenbergMarquardt, NonlinearSolver, SolveDivergence, SolveError, SolveReport, SolverParams,
};

fn airborne(height: f64, vertical_speed: f64) -> JumpingRobotConfig {
    let mut config = JumpingRobotConfig::default();
    config.initial.torso_pose[2] = height;
    config.initial.torso_twist = [0.0, 0.0, vertical_speed];
    config
}

/// Levenberg–Marquardt that gives up after a fixed number of solves.
struct LimitedSolver {
    inner: LevenbergMarquardt,
    remaining: AtomicUsize,
}

impl NonlinearSolver for LimitedSolver {
    fn optimize(&self, graph: &FactorGraph, initial: &Values) -> Result<SolveReport, SolveError> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            let error = graph.error(initial)?;
            return Err(SolveDivergence {
                iterations: 0,
                error,
                initial_error: error,
            }
            .into());
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        self.inner.optimize(graph, initial)
    }

    fn params(&self) -> &SolverParams {
        self.inner.params()
    }
}

#[test]
fn phase_steps_sum_to_the_requested_count() {
    let sim = JRSimulator::from_config(&JumpingRobotConfig::default()).expect("simulator");
    let controls = Controls::new(&[0.0; 4], &[0.1; 4]).expect("controls");
    let trajectory = sim.simulate(8, 0.002, &controls).expect("simulate");
    assert_eq!(trajectory.phase_steps().iter().sum::<usize>(), 8);
    assert_eq!(trajectory.last_step(), Some(8));
    assert_eq!(trajectory.phases[0].regime.label(), "ground");
    assert!(trajectory.violations.is_empty(), "{:?}", trajectory.violations);
}

#[test]
fn ballistic_start_stops_at_the_apex() {
    let sim = JRSimulator::from_config(&airborne(1.0, 1.0)).expect("simulator");
    let trajectory = sim
        .simulate_to_apex(100, 0.005, &Controls::closed(4))
        .expect("simulate");

    assert_eq!(trajectory.phases.len(), 1);
    assert!(trajectory.phases[0].regime.is_flight());
    // vy_k = 1 - g dt k first drops to zero or below at k = 21.
    let apex = trajectory.apex_step.expect("apex reached");
    assert!((20..=22).contains(&apex), "apex at step {apex}");
    assert_eq!(trajectory.num_steps(), apex);

    let base = sim.robot().robot.base();
    let vy = |k| trajectory.values.vector3(&Key::twist(base, k)).expect("twist")[2];
    assert!(vy(apex - 1) > 0.0);
    assert!(vy(apex) <= 0.0);
}

#[test]
fn falling_robot_touches_down() {
    let sim = JRSimulator::from_config(&airborne(0.6, -1.0)).expect("simulator");
    let trajectory = sim.simulate(12, 0.005, &Controls::closed(4)).expect("simulate");

    let labels: Vec<&str> = trajectory.phases.iter().map(|phase| phase.regime.label()).collect();
    assert_eq!(&labels[..2], ["flight", "ground"]);
    // The feet start 5 cm up and cross the ground during the ninth interval.
    assert_eq!(trajectory.phases[0].num_steps, 9);
    assert_eq!(trajectory.phase_steps().iter().sum::<usize>(), 12);

    let touchdown = trajectory.phases[1].start_step;
    assert!(matches!(trajectory.regime_at(touchdown), Some(Regime::GroundContact(_))));
    for contact in trajectory.phases[1].regime.contacts() {
        assert_eq!(contact.anchor.y, 0.0);
        assert!(trajectory.values.contains(&Key::contact_force(contact.contact, touchdown)));
        assert!(!trajectory.values.contains(&Key::contact_force(contact.contact, touchdown - 1)));
    }
}

#[test]
fn exhausted_solver_returns_the_partial_trajectory() {
    // Step 0 takes three solves and each later step four.
    let solver = LimitedSolver {
        inner: LevenbergMarquardt::new(SolverParams::default()),
        remaining: AtomicUsize::new(3 + 4 + 4),
    };
    let sim = JRSimulator::from_config(&JumpingRobotConfig::default())
        .expect("simulator")
        .with_solver(Box::new(solver));
    let failure = sim
        .simulate(10, 0.002, &Controls::closed(4))
        .expect_err("solver budget runs out");

    assert_eq!(failure.step, 3);
    assert!(failure.error.divergence().is_some());
    assert!(matches!(failure.error, SimulationError::Step { stage: "integration", .. }));
    assert_eq!(failure.partial.last_step(), Some(2));
    assert_eq!(failure.partial.num_steps(), 2);
    assert!(failure.to_string().starts_with("simulation aborted at step 3"));
}

#[test]
fn under_pressured_source_is_reported() {
    let mut config = JumpingRobotConfig::default();
    config.source.initial_pressure_psi = 5.0;
    let sim = JRSimulator::from_config(&config).expect("simulator");
    let controls = Controls::new(&[0.0; 4], &[0.1; 4]).expect("controls");

    let trajectory = sim.simulate(2, 0.002, &controls).expect("report policy keeps going");
    let first = trajectory.violations.first().expect("violation");
    assert_eq!(first.step, 0);
    assert_eq!(first.key.kind, VarKind::ActuatorPressure);
    assert!(first.value > first.upper);
    assert_eq!(trajectory.last_step(), Some(2));
}

#[test]
fn abort_policy_stops_at_the_first_violation() {
    let mut config = JumpingRobotConfig::default();
    config.source.initial_pressure_psi = 5.0;
    let sim = JRSimulator::from_config(&config)
        .expect("simulator")
        .with_violation_policy(ViolationPolicy::Abort);
    let controls = Controls::new(&[0.0; 4], &[0.1; 4]).expect("controls");

    let failure = sim.simulate(5, 0.002, &controls).expect_err("abort");
    assert_eq!(failure.step, 0);
    assert!(matches!(failure.error, SimulationError::Violation(_)));
    assert_eq!(failure.partial.last_step(), Some(0));
    assert_eq!(failure.partial.violations.len(), 1);
}
