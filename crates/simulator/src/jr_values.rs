//! Typed value sets consumed and produced by the jumping-robot graphs.

use std::collections::BTreeMap;

use jrsim_graph::{FactorGraph, Key, Values, ValuesError};
use jrsim_model::{Controls, JumpingRobot, SOURCE_ID};
use nalgebra::DVector;

use crate::phase::Phase;

/// Complete state of step 0 from the robot's initial configuration.
///
/// Link poses and twists follow from forward kinematics. Chambers start at
/// atmospheric pressure and the source at its charge pressure. Accelerations,
/// torques, wrenches, and flows are zero guesses for the first solve.
pub fn init_config_values(jr: &JumpingRobot) -> Values {
    let init = &jr.initial;
    let robot = &jr.robot;
    let mut values = Values::new();
    let (poses, twists) = robot.forward_kinematics(
        init.base_pose,
        init.base_twist,
        &init.joint_angles,
        &init.joint_velocities,
    );
    for link in robot.links() {
        values.insert_pose(Key::pose(link.id, 0), poses[link.id]);
        values.insert_vector3(Key::twist(link.id, 0), twists[link.id]);
        values.insert(Key::twist_accel(link.id, 0), DVector::zeros(3));
    }
    for joint in robot.joints() {
        values.insert_scalar(Key::joint_angle(joint.id, 0), init.joint_angles[joint.id]);
        values.insert_scalar(Key::joint_vel(joint.id, 0), init.joint_velocities[joint.id]);
        values.insert_scalar(Key::joint_accel(joint.id, 0), 0.0);
        values.insert_scalar(Key::torque(joint.id, 0), 0.0);
        values.insert(Key::wrench(joint.id, 0), DVector::zeros(3));
    }

    let atm = jr.gas.atmospheric_pressure;
    for actuator in &jr.actuators {
        let volume = actuator.volume(init.joint_angles[actuator.joint]);
        values.insert_scalar(Key::actuator_pressure(actuator.id, 0), atm);
        values.insert_scalar(Key::actuator_volume(actuator.id, 0), volume);
        values.insert_scalar(Key::actuator_mass(actuator.id, 0), jr.gas.mass(atm, volume));
        values.insert_scalar(Key::mass_flow(actuator.id, 0), 0.0);
    }
    let (ps, vs) = (jr.source.initial_pressure, jr.source.volume);
    values.insert_scalar(Key::source_pressure(SOURCE_ID, 0), ps);
    values.insert_scalar(Key::source_volume(SOURCE_ID, 0), vs);
    values.insert_scalar(Key::source_mass(SOURCE_ID, 0), jr.gas.mass(ps, vs));
    values.insert_scalar(Key::time(0), 0.0);
    values
}

/// Valve open and close times keyed by actuator.
pub fn control_values(controls: &Controls) -> Values {
    let mut values = Values::new();
    for (actuator, timing) in controls.timings().iter().enumerate() {
        values.insert_scalar(Key::valve_open_time(actuator), timing.open);
        values.insert_scalar(Key::valve_close_time(actuator), timing.close);
    }
    values
}

/// Step length of every phase keyed by phase index.
pub fn phase_duration_values(phases: &[Phase]) -> Values {
    let mut values = Values::new();
    for (index, phase) in phases.iter().enumerate() {
        values.insert_scalar(Key::phase_duration(index), phase.dt);
    }
    values
}

fn joint_map(jr: &JumpingRobot, values: &Values, key: fn(usize, usize) -> Key, k: usize) -> Result<BTreeMap<String, f64>, ValuesError> {
    jr.robot
        .joints()
        .iter()
        .map(|joint| values.scalar(&key(joint.id, k)).map(|value| (joint.name.clone(), value)))
        .collect()
}

/// Joint accelerations at `k` by joint name.
pub fn joint_accels_map(jr: &JumpingRobot, values: &Values, k: usize) -> Result<BTreeMap<String, f64>, ValuesError> {
    joint_map(jr, values, Key::joint_accel, k)
}

/// Joint angles at `k` by joint name.
pub fn joint_angles_map(jr: &JumpingRobot, values: &Values, k: usize) -> Result<BTreeMap<String, f64>, ValuesError> {
    joint_map(jr, values, Key::joint_angle, k)
}

/// Joint torques at `k` by joint name.
pub fn joint_torques_map(jr: &JumpingRobot, values: &Values, k: usize) -> Result<BTreeMap<String, f64>, ValuesError> {
    joint_map(jr, values, Key::torque, k)
}

/// Starting point for solving `graph`.
///
/// Each key takes its known value, else the value of the same variable one
/// step earlier, else zeros.
pub fn initial_guess(graph: &FactorGraph, values: &Values) -> Values {
    let mut guess = Values::new();
    for key in graph.keys() {
        let previous = (key.step > 0 && !key.kind.is_static()).then(|| Key {
            step: key.step - 1,
            ..key
        });
        let value = values
            .get(&key)
            .or_else(|| previous.and_then(|previous| values.get(&previous)))
            .cloned()
            .unwrap_or_else(|| DVector::zeros(key.dim()));
        guess.insert(key, value);
    }
    guess
}
