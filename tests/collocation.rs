use jrsim::config::JumpingRobotConfig;
use jrsim::graph::Key;
use jrsim::model::Controls;
use jrsim::simulator::{CollocationScheme, JRSimulator, Trajectory, phase_duration_values};

fn jump_controls() -> Controls {
    Controls::new(&[0.0; 4], &[0.1; 4]).expect("controls")
}

/// Largest factor residual of the full trajectory graph at the simulated values.
fn max_trajectory_residual(sim: &JRSimulator, trajectory: &Trajectory, controls: &Controls) -> f64 {
    let jr = sim.robot();
    let builder = sim.graph_builder();
    let mut graph = builder
        .trajectory_graph(jr, &trajectory.phases, controls, trajectory.scheme, false)
        .expect("controls");
    graph.append(builder.control_priors(jr, controls));
    graph.append(builder.time_prior());
    graph.append(
        builder
            .initial_state_priors(jr, &trajectory.values)
            .expect("initial priors"),
    );
    graph.max_residual(&trajectory.values).expect("all keys simulated")
}

/// Jump from the default crouch to the apex, checking the phase sequence.
fn jump_to_apex(scheme: CollocationScheme) -> (JRSimulator, Trajectory, Controls) {
    let sim = JRSimulator::from_config(&JumpingRobotConfig::default())
        .expect("simulator")
        .with_scheme(scheme);
    let controls = Controls::new(&[0.0; 4], &[1.0; 4]).expect("controls");
    let trajectory = sim.simulate_to_apex(400, 0.002, &controls).expect("simulate");

    let labels: Vec<&str> = trajectory.phases.iter().map(|phase| phase.regime.label()).collect();
    assert_eq!(labels, ["ground", "flight"], "{:?}", trajectory.phase_steps());
    let lift_off = trajectory.phases[1].start_step;
    assert_eq!(trajectory.phases[0].num_steps, lift_off);
    let apex = trajectory.apex_step.expect("apex reached");
    assert!(apex > lift_off);
    assert_eq!(trajectory.last_step(), Some(apex));
    (sim, trajectory, controls)
}

fn residual_of_simulated_trajectory(scheme: CollocationScheme) -> f64 {
    let sim = JRSimulator::from_config(&JumpingRobotConfig::default())
        .expect("simulator")
        .with_scheme(scheme);
    let trajectory = sim.simulate(6, 0.002, &jump_controls()).expect("simulate");
    assert_eq!(trajectory.scheme, scheme);
    max_trajectory_residual(&sim, &trajectory, &jump_controls())
}

#[test]
fn euler_trajectory_graph_is_satisfied_by_its_simulation() {
    let max = residual_of_simulated_trajectory(CollocationScheme::Euler);
    assert!(max < 1e-6, "largest residual {max:e}");
}

#[test]
fn trapezoidal_trajectory_graph_is_satisfied_by_its_simulation() {
    let max = residual_of_simulated_trajectory(CollocationScheme::Trapezoidal);
    assert!(max < 1e-6, "largest residual {max:e}");
}

#[test]
fn solved_phase_durations_reproduce_the_nominal_step() {
    let sim = JRSimulator::from_config(&JumpingRobotConfig::default()).expect("simulator");
    let jr = sim.robot();
    let controls = jump_controls();
    let trajectory = sim.simulate(4, 0.002, &controls).expect("simulate");

    let builder = sim.graph_builder();
    let mut values = trajectory.values.clone();
    values.merge(&phase_duration_values(&trajectory.phases));
    let graph = builder
        .trajectory_graph(jr, &trajectory.phases, &controls, CollocationScheme::Euler, true)
        .expect("controls");
    assert!(graph.keys().contains(&Key::phase_duration(0)));
    let error = graph.error(&values).expect("all keys simulated");
    assert!(error < 1e-6, "trajectory error {error:e}");
}

#[test]
fn simulated_clock_advances_by_the_step_length() {
    let sim = JRSimulator::from_config(&JumpingRobotConfig::default()).expect("simulator");
    let trajectory = sim.simulate(5, 0.002, &jump_controls()).expect("simulate");
    let times = trajectory.times();
    assert_eq!(times.len(), 6);
    for (k, nominal) in times.iter().enumerate() {
        let solved = trajectory.time(k).expect("time");
        assert!((solved - nominal).abs() < 1e-9, "step {k}: {solved} vs {nominal}");
    }
}

#[test]
fn euler_jump_lifts_off_once_and_stays_consistent_across_the_boundary() {
    let (sim, trajectory, controls) = jump_to_apex(CollocationScheme::Euler);
    let max = max_trajectory_residual(&sim, &trajectory, &controls);
    assert!(max < 1e-9, "largest residual {max:e}");
}

#[test]
fn trapezoidal_jump_lifts_off_once_and_stays_consistent_across_the_boundary() {
    let (sim, trajectory, controls) = jump_to_apex(CollocationScheme::Trapezoidal);
    let max = max_trajectory_residual(&sim, &trajectory, &controls);
    assert!(max < 1e-9, "largest residual {max:e}");
}
