use approx::assert_relative_eq;
use jrsim::config::JumpingRobotConfig;
use jrsim::graph::{Key, Values, VarKind};
use jrsim::model::{Controls, JumpingRobot, SOURCE_ID};
use jrsim::simulator::{JRSimulator, init_config_values};

fn simulator() -> JRSimulator {
    JRSimulator::from_config(&JumpingRobotConfig::default()).expect("simulator")
}

fn actuated_step(sim: &JRSimulator, controls: &Controls, t: f64) -> Values {
    let mut values = init_config_values(sim.robot());
    sim.step_robot_kinematics(0, &mut values).expect("kinematics");
    sim.step_actuation_dynamics(0, controls, t, &mut values)
        .expect("actuation");
    values
}

#[test]
fn atmospheric_chambers_produce_no_torque() {
    let sim = simulator();
    let jr = sim.robot();
    let values = actuated_step(&sim, &Controls::closed(4), 0.0);
    for actuator in &jr.actuators {
        let q = jr.initial.joint_angles[actuator.joint];
        assert_eq!(actuator.torque(jr.gas.atmospheric_pressure, jr.gas.atmospheric_pressure, q), 0.0);
        let torque = values.scalar(&Key::torque(actuator.joint, 0)).expect("torque");
        assert!(torque.abs() < 1e-9, "{}: {torque}", actuator.name);
    }
}

#[test]
fn valve_flow_is_zero_outside_the_window_and_follows_the_tube_law_inside() {
    let sim = simulator();
    let jr: &JumpingRobot = sim.robot();
    let controls = Controls::new(&[0.01; 4], &[0.02; 4]).expect("controls");

    for t in [0.0, 0.005, 0.02, 0.03] {
        let values = actuated_step(&sim, &controls, t);
        for actuator in &jr.actuators {
            let flow = values.scalar(&Key::mass_flow(actuator.id, 0)).expect("flow");
            assert!(flow.abs() < 1e-12, "t = {t}: flow {flow}");
        }
    }

    for t in [0.01, 0.015] {
        let values = actuated_step(&sim, &controls, t);
        let ps = values.scalar(&Key::source_pressure(SOURCE_ID, 0)).expect("ps");
        for actuator in &jr.actuators {
            let pa = values.scalar(&Key::actuator_pressure(actuator.id, 0)).expect("pa");
            let flow = values.scalar(&Key::mass_flow(actuator.id, 0)).expect("flow");
            assert!(flow > 0.0);
            assert_relative_eq!(flow, jr.tube.mass_flow(&jr.gas, ps, pa), max_relative = 1e-6);
        }
    }
}

#[test]
fn chamber_gas_obeys_the_gas_law() {
    let sim = simulator();
    let jr = sim.robot();
    let values = actuated_step(&sim, &Controls::closed(4), 0.0);
    for actuator in &jr.actuators {
        let p = values.scalar(&Key::actuator_pressure(actuator.id, 0)).expect("p");
        let v = values.scalar(&Key::actuator_volume(actuator.id, 0)).expect("v");
        let m = values.scalar(&Key::actuator_mass(actuator.id, 0)).expect("m");
        assert_relative_eq!(p * v, m * jr.gas.rt(), max_relative = 1e-6);
        assert_relative_eq!(v, actuator.volume(jr.initial.joint_angles[actuator.joint]), max_relative = 1e-6);
    }
    let ps = values.scalar(&Key::source_pressure(SOURCE_ID, 0)).expect("ps");
    assert_relative_eq!(ps, jr.source.initial_pressure, max_relative = 1e-6);
}

#[test]
fn chamber_overpressure_during_a_jump_is_reported_unclamped() {
    let sim = simulator();
    let controls = Controls::new(&[0.0; 4], &[1.0; 4]).expect("controls");
    let trajectory = sim.simulate_to_apex(400, 0.002, &controls).expect("report policy keeps going");

    // Compressed chambers push gas back towards the source and exceed its pressure.
    let over: Vec<_> = trajectory
        .violations
        .iter()
        .filter(|violation| violation.key.kind == VarKind::ActuatorPressure && violation.value > violation.upper)
        .collect();
    assert!(!over.is_empty());
    for violation in over {
        let stored = trajectory.values.scalar(&violation.key).expect("pressure");
        assert_eq!(stored, violation.value);
        let ps = trajectory
            .values
            .scalar(&Key::source_pressure(SOURCE_ID, violation.step))
            .expect("source pressure");
        assert!(stored > ps);
    }
}
