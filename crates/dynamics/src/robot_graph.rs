//! Per-step mechanical graphs: forward kinematics and rigid-body dynamics.

use jrsim_core::planar::Vector2;
use jrsim_graph::{FactorGraph, Key, Values, ValuesError};
use jrsim_model::{ContactModel, RobotModel};

use crate::robot_factors::{
    ContactFactor, NewtonEulerFactor, PoseFactor, TorqueFactor, TwistAccelFactor, TwistFactor,
    WrenchTerm,
};

/// A contact point pinned to the ground during a ground-contact phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundContact {
    pub contact: usize,
    pub anchor: Vector2<f64>,
}

/// Noise scales of the mechanical factors.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotGraphParams {
    pub kinematics_sigma: f64,
    pub dynamics_sigma: f64,
    pub contact_sigma: f64,
    pub prior_sigma: f64,
    pub contact_frequency: f64,
    pub contact_damping_ratio: f64,
}

impl Default for RobotGraphParams {
    fn default() -> Self {
        Self {
            kinematics_sigma: 1e-4,
            dynamics_sigma: 1e-3,
            contact_sigma: 1e-3,
            prior_sigma: 1e-4,
            contact_frequency: 40.0,
            contact_damping_ratio: 1.0,
        }
    }
}

/// Builds the mechanical constraint graph of one time step.
#[derive(Debug, Clone, Default)]
pub struct RobotGraphBuilder {
    params: RobotGraphParams,
}

impl RobotGraphBuilder {
    pub fn new(params: RobotGraphParams) -> Self {
        Self { params }
    }

    /// Builder whose contact stabilization follows the robot's contact model.
    pub fn for_contact_model(contact: &ContactModel) -> Self {
        Self::new(RobotGraphParams {
            contact_frequency: contact.stabilization_frequency,
            contact_damping_ratio: contact.damping_ratio,
            ..RobotGraphParams::default()
        })
    }

    pub fn params(&self) -> &RobotGraphParams {
        &self.params
    }

    /// Pose and twist propagation through every joint at step `k`.
    pub fn kinematics_graph(&self, robot: &RobotModel, k: usize) -> FactorGraph {
        let sigma = self.params.kinematics_sigma;
        let mut graph = FactorGraph::new();
        for joint in robot.joints() {
            graph.add(PoseFactor::new(joint, k, sigma));
            graph.add(TwistFactor::new(joint, k, sigma));
        }
        graph
    }

    /// Accelerations, Newton–Euler balances, torques, and contacts at step `k`.
    ///
    /// Contacts whose id is not on the robot are skipped.
    pub fn acceleration_graph(&self, robot: &RobotModel, contacts: &[GroundContact], k: usize) -> FactorGraph {
        let p = &self.params;
        let mut graph = FactorGraph::new();
        for joint in robot.joints() {
            graph.add(TwistAccelFactor::new(joint, k, p.kinematics_sigma));
            graph.add(TorqueFactor::new(joint.id, k, p.dynamics_sigma));
        }

        for link in robot.links() {
            let wrenches: Vec<(Key, WrenchTerm)> = robot
                .joints_of(link.id)
                .filter_map(|joint| {
                    let sign = joint.wrench_sign(link.id)?;
                    let point = joint.point_on(link.id)?;
                    Some((Key::wrench(joint.id, k), WrenchTerm { sign, point }))
                })
                .collect();
            let link_contacts: Vec<(Key, Vector2<f64>)> = contacts
                .iter()
                .filter_map(|active| robot.contact(active.contact))
                .filter(|contact| contact.link == link.id)
                .map(|contact| (Key::contact_force(contact.id, k), contact.point))
                .collect();
            graph.add(NewtonEulerFactor::new(
                link.id,
                link.mass,
                link.inertia,
                robot.gravity_vector(),
                &wrenches,
                &link_contacts,
                k,
                p.dynamics_sigma,
            ));
        }

        for active in contacts {
            let Some(contact) = robot.contact(active.contact) else {
                continue;
            };
            graph.add(ContactFactor::new(
                contact.link,
                contact.point,
                active.anchor,
                p.contact_frequency,
                p.contact_damping_ratio,
                k,
                p.contact_sigma,
            ));
        }
        graph
    }

    /// Full mechanical graph of step `k` for the given active contacts.
    pub fn dynamics_graph(&self, robot: &RobotModel, contacts: &[GroundContact], k: usize) -> FactorGraph {
        let mut graph = self.kinematics_graph(robot, k);
        graph.append(self.acceleration_graph(robot, contacts, k));
        graph
    }

    /// Pins the base pose and twist and every joint angle and velocity at `k`.
    pub fn prior_graph(&self, robot: &RobotModel, values: &Values, k: usize) -> Result<FactorGraph, ValuesError> {
        let base = robot.base();
        let mut keys = vec![Key::pose(base, k), Key::twist(base, k)];
        for joint in robot.joints() {
            keys.push(Key::joint_angle(joint.id, k));
            keys.push(Key::joint_vel(joint.id, k));
        }
        FactorGraph::priors_from(values, &keys, self.params.prior_sigma)
    }

    /// Pins every joint torque at `k`.
    pub fn torque_priors(&self, robot: &RobotModel, values: &Values, k: usize) -> Result<FactorGraph, ValuesError> {
        let keys: Vec<Key> = robot.joints().iter().map(|joint| Key::torque(joint.id, k)).collect();
        FactorGraph::priors_from(values, &keys, self.params.prior_sigma)
    }

    /// Pins every joint acceleration at `k`.
    pub fn acceleration_priors(&self, robot: &RobotModel, values: &Values, k: usize) -> Result<FactorGraph, ValuesError> {
        let keys: Vec<Key> = robot
            .joints()
            .iter()
            .map(|joint| Key::joint_accel(joint.id, k))
            .collect();
        FactorGraph::priors_from(values, &keys, self.params.prior_sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jrsim_config::JumpingRobotConfig;
    use jrsim_graph::{ConfigurationError, VarKind};
    use jrsim_model::JumpingRobot;

    fn robot() -> JumpingRobot {
        JumpingRobot::from_config(&JumpingRobotConfig::default()).expect("robot")
    }

    fn standing_values(jr: &JumpingRobot) -> Values {
        let init = &jr.initial;
        let (poses, twists) = jr.robot.forward_kinematics(
            init.base_pose,
            init.base_twist,
            &init.joint_angles,
            &init.joint_velocities,
        );
        let mut values = Values::new();
        for link in jr.robot.links() {
            values.insert_pose(Key::pose(link.id, 0), poses[link.id]);
            values.insert_vector3(Key::twist(link.id, 0), twists[link.id]);
        }
        for joint in jr.robot.joints() {
            values.insert_scalar(Key::joint_angle(joint.id, 0), init.joint_angles[joint.id]);
            values.insert_scalar(Key::joint_vel(joint.id, 0), 0.0);
            values.insert_scalar(Key::torque(joint.id, 0), 0.0);
        }
        values
    }

    fn both_feet(jr: &JumpingRobot) -> Vec<GroundContact> {
        jr.robot
            .contacts()
            .iter()
            .map(|contact| GroundContact {
                contact: contact.id,
                anchor: Vector2::zeros(),
            })
            .collect()
    }

    #[test]
    fn ground_step_graph_is_square_with_state_and_torque_priors() {
        let jr = robot();
        let builder = RobotGraphBuilder::default();
        let values = standing_values(&jr);
        let mut graph = builder.dynamics_graph(&jr.robot, &both_feet(&jr), 0);
        graph.append(builder.prior_graph(&jr.robot, &values, 0).expect("priors"));
        graph.append(builder.torque_priors(&jr.robot, &values, 0).expect("torques"));
        let report = graph.check_structure().expect("square");
        assert_eq!(report.redundancy(), 0);
    }

    #[test]
    fn missing_torque_priors_leave_graph_under_constrained() {
        let jr = robot();
        let builder = RobotGraphBuilder::default();
        let values = standing_values(&jr);
        let mut graph = builder.dynamics_graph(&jr.robot, &[], 0);
        graph.append(builder.prior_graph(&jr.robot, &values, 0).expect("priors"));
        match graph.check_structure() {
            Err(ConfigurationError::UnderConstrained { unknowns, matched, .. }) => {
                assert_eq!(unknowns - matched, jr.robot.joints().len());
            }
            other => panic!("expected under-constrained graph, got {other:?}"),
        }
    }

    #[test]
    fn contact_forces_enter_only_ground_graphs() {
        let jr = robot();
        let builder = RobotGraphBuilder::default();
        let flight = builder.dynamics_graph(&jr.robot, &[], 3);
        let ground = builder.dynamics_graph(&jr.robot, &both_feet(&jr), 3);
        let count = |graph: &FactorGraph| {
            graph
                .keys()
                .iter()
                .filter(|key| key.kind == VarKind::ContactForce)
                .count()
        };
        assert_eq!(count(&flight), 0);
        assert_eq!(count(&ground), 2);
        assert!(ground.keys().iter().all(|key| key.step == 3));
    }
}
