use std::io::Write;

use jrsim::config::{CollocationConfig, SolverKindConfig, ViolationPolicyConfig, load_robot_config};
use jrsim::model::{JumpingRobot, ModelError};
use jrsim::simulator::{CollocationScheme, JRSimulator};

const ROBOT_TOML: &str = r#"
[morphology]
leg_length_m = 0.55
torso_width_m = 0.3
link_radius_m = 0.02
shank_mass_kg = 0.3
thigh_mass_kg = 0.3
torso_mass_kg = 1.2

[[actuators]]
name = "knee_r"
joint = "knee_r"
piston_diameter_m = 0.025
dead_volume_m3 = 5.0e-6
mount_parent_m = 0.05
mount_child_m = 0.05

[[actuators]]
name = "hip_r"
joint = "hip_r"
piston_diameter_m = 0.025
dead_volume_m3 = 5.0e-6
mount_parent_m = 0.05
mount_child_m = 0.05

[source]
volume_m3 = 1.0e-3
initial_pressure_psi = 65.0

[initial]
torso_pose = [0.0, 0.0, 0.55]

[initial.joint_angles_rad]
knee_r = 2.0943951023931953
hip_r = -1.0471975511965976
hip_l = -1.0471975511965976
knee_l = 2.0943951023931953

[solver]
kind = "gauss_newton"
max_iterations = 25

[simulation]
collocation = "trapezoidal"
violation_policy = "abort"
"#;

#[test]
fn reference_yaml_builds_the_four_actuator_robot() {
    let config = load_robot_config("configs/jumping_robot.yaml").expect("load yaml");
    assert_eq!(config.simulation.collocation, CollocationConfig::Euler);
    assert_eq!(config.simulation.valve_schedule.len(), 4);

    let jr = JumpingRobot::from_config(&config).expect("robot");
    assert_eq!(jr.robot.links().len(), 5);
    assert_eq!(jr.robot.joints().len(), 4);
    assert_eq!(jr.robot.contacts().len(), 2);
    assert_eq!(jr.actuators.len(), 4);
    // 65 psi
    assert!((jr.source.initial_pressure - 448_159.0).abs() < 1.0);

    let controls = jr
        .controls_from_schedule(&config.simulation.valve_schedule)
        .expect("controls");
    assert_eq!(controls.len(), 4);
    assert!(controls.timings().iter().all(|timing| timing.open == 0.0 && timing.close == 1.0));
}

#[test]
fn toml_description_loads_with_defaults() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    file.write_all(ROBOT_TOML.as_bytes()).expect("write toml");

    let config = load_robot_config(file.path()).expect("load toml");
    assert_eq!(config.solver.kind, SolverKindConfig::GaussNewton);
    assert_eq!(config.solver.max_iterations, 25);
    assert_eq!(config.simulation.violation_policy, ViolationPolicyConfig::Abort);
    assert_eq!(config.environment.gravity_m_s2, 9.8);

    let sim = JRSimulator::from_config(&config).expect("simulator");
    assert_eq!(sim.scheme(), CollocationScheme::Trapezoidal);
    assert_eq!(sim.robot().actuators.len(), 2);
    assert!(sim.robot().actuator_for_joint(2).is_none());
}

#[test]
fn unknown_actuator_joint_is_rejected() {
    let mut config = load_robot_config("configs/jumping_robot.yaml").expect("load yaml");
    config.actuators[0].joint = "ankle".to_string();
    let err = JumpingRobot::from_config(&config).expect_err("unknown joint");
    assert!(matches!(err, ModelError::UnknownJoint { .. }), "{err}");
}
