//! Kinematic and Newton–Euler factors of the planar rigid-body tree.

use jrsim_core::planar::{Pose2, Vector2, Vector3, cross, perp, point_acceleration, point_velocity};
use jrsim_graph::{Factor, Key};
use jrsim_model::Joint;
use nalgebra::DVector;

fn pose(x: &DVector<f64>) -> Pose2 {
    Pose2::from_slice(x.as_slice())
}

fn vec3(x: &DVector<f64>) -> Vector3<f64> {
    Vector3::new(x[0], x[1], x[2])
}

fn vec2(x: &DVector<f64>) -> Vector2<f64> {
    Vector2::new(x[0], x[1])
}

fn stack3(angular: f64, linear: Vector2<f64>) -> DVector<f64> {
    DVector::from_vec(vec![angular, linear.x, linear.y])
}

/// Child pose follows from the parent pose and the joint angle.
#[derive(Debug, Clone)]
pub struct PoseFactor {
    keys: [Key; 3],
    joint: Joint,
    sigma: f64,
}

impl PoseFactor {
    pub fn new(joint: &Joint, k: usize, sigma: f64) -> Self {
        Self {
            keys: [
                Key::pose(joint.parent, k),
                Key::pose(joint.child, k),
                Key::joint_angle(joint.id, k),
            ],
            joint: joint.clone(),
            sigma,
        }
    }
}

impl Factor for PoseFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        3
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        let expected = self.joint.child_pose(&pose(x[0]), x[2][0]);
        x[1] - DVector::from_column_slice(expected.to_vector().as_slice())
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

/// Child twist follows from the parent twist and the joint velocity.
#[derive(Debug, Clone)]
pub struct TwistFactor {
    keys: [Key; 5],
    joint: Joint,
    sigma: f64,
}

impl TwistFactor {
    pub fn new(joint: &Joint, k: usize, sigma: f64) -> Self {
        Self {
            keys: [
                Key::pose(joint.parent, k),
                Key::pose(joint.child, k),
                Key::twist(joint.parent, k),
                Key::twist(joint.child, k),
                Key::joint_vel(joint.id, k),
            ],
            joint: joint.clone(),
            sigma,
        }
    }
}

impl Factor for TwistFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        3
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        let expected = self
            .joint
            .child_twist(&pose(x[0]), &vec3(x[2]), &pose(x[1]), x[4][0]);
        x[3] - DVector::from_column_slice(expected.as_slice())
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

/// Child twist acceleration follows from the parent motion and the joint acceleration.
#[derive(Debug, Clone)]
pub struct TwistAccelFactor {
    keys: [Key; 7],
    joint: Joint,
    sigma: f64,
}

impl TwistAccelFactor {
    pub fn new(joint: &Joint, k: usize, sigma: f64) -> Self {
        Self {
            keys: [
                Key::pose(joint.parent, k),
                Key::pose(joint.child, k),
                Key::twist(joint.parent, k),
                Key::twist(joint.child, k),
                Key::twist_accel(joint.parent, k),
                Key::twist_accel(joint.child, k),
                Key::joint_accel(joint.id, k),
            ],
            joint: joint.clone(),
            sigma,
        }
    }
}

impl Factor for TwistAccelFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        3
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        let (parent_pose, child_pose) = (pose(x[0]), pose(x[1]));
        let (parent_twist, child_twist) = (vec3(x[2]), vec3(x[3]));
        let (parent_accel, child_accel) = (vec3(x[4]), vec3(x[5]));
        let alpha = parent_accel[0] + x[6][0];

        let r_parent = parent_pose.rotate(&self.joint.parent_point);
        let r_child = child_pose.rotate(&self.joint.child_point);
        let joint_accel = point_acceleration(&parent_accel, &parent_twist, &r_parent);
        let omega_c = child_twist[0];
        let linear = joint_accel - perp(&r_child) * alpha + r_child * (omega_c * omega_c);

        let actual_linear = Vector2::new(child_accel[1], child_accel[2]);
        stack3(child_accel[0] - alpha, actual_linear - linear)
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

/// A joint wrench acting on a link, with the joint point in the link frame.
#[derive(Debug, Clone, Copy)]
pub struct WrenchTerm {
    /// +1 when the link is the joint child, -1 when it is the parent.
    pub sign: f64,
    pub point: Vector2<f64>,
}

/// Newton–Euler balance of one link about its centre of mass.
///
/// Keys: link pose, link twist acceleration, then the wrench of every attached
/// joint, then the force of every active contact on the link.
#[derive(Debug, Clone)]
pub struct NewtonEulerFactor {
    keys: Vec<Key>,
    mass: f64,
    inertia: f64,
    gravity: Vector2<f64>,
    wrenches: Vec<WrenchTerm>,
    contact_points: Vec<Vector2<f64>>,
    sigma: f64,
}

impl NewtonEulerFactor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        link: usize,
        mass: f64,
        inertia: f64,
        gravity: Vector2<f64>,
        wrenches: &[(Key, WrenchTerm)],
        contacts: &[(Key, Vector2<f64>)],
        k: usize,
        sigma: f64,
    ) -> Self {
        let mut keys = vec![Key::pose(link, k), Key::twist_accel(link, k)];
        keys.extend(wrenches.iter().map(|(key, _)| *key));
        keys.extend(contacts.iter().map(|(key, _)| *key));
        Self {
            keys,
            mass,
            inertia,
            gravity,
            wrenches: wrenches.iter().map(|(_, term)| *term).collect(),
            contact_points: contacts.iter().map(|(_, point)| *point).collect(),
            sigma,
        }
    }
}

impl Factor for NewtonEulerFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        3
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        let link_pose = pose(x[0]);
        let accel = vec3(x[1]);
        let mut moment = 0.0;
        let mut force = self.gravity * self.mass;

        for (term, wrench) in self.wrenches.iter().zip(&x[2..2 + self.wrenches.len()]) {
            let f = Vector2::new(wrench[1], wrench[2]);
            let r = link_pose.rotate(&term.point);
            moment += term.sign * (wrench[0] + cross(&r, &f));
            force += f * term.sign;
        }
        for (point, contact) in self.contact_points.iter().zip(&x[2 + self.wrenches.len()..]) {
            let f = vec2(contact);
            moment += cross(&link_pose.rotate(point), &f);
            force += f;
        }

        let linear = Vector2::new(accel[1], accel[2]) * self.mass - force;
        stack3(self.inertia * accel[0] - moment, linear)
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

/// The moment a joint transmits equals the joint torque.
#[derive(Debug, Clone)]
pub struct TorqueFactor {
    keys: [Key; 2],
    sigma: f64,
}

impl TorqueFactor {
    pub fn new(joint: usize, k: usize, sigma: f64) -> Self {
        Self {
            keys: [Key::wrench(joint, k), Key::torque(joint, k)],
            sigma,
        }
    }
}

impl Factor for TorqueFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        1
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        DVector::from_element(1, x[0][0] - x[1][0])
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

/// Point contact pinned to a ground anchor with critically damped drift correction:
/// `a_c + 2ζω·v_c + ω²·(p_c − anchor) = 0`.
#[derive(Debug, Clone)]
pub struct ContactFactor {
    keys: [Key; 3],
    point: Vector2<f64>,
    anchor: Vector2<f64>,
    frequency: f64,
    damping_ratio: f64,
    sigma: f64,
}

impl ContactFactor {
    pub fn new(
        link: usize,
        point: Vector2<f64>,
        anchor: Vector2<f64>,
        frequency: f64,
        damping_ratio: f64,
        k: usize,
        sigma: f64,
    ) -> Self {
        Self {
            keys: [Key::pose(link, k), Key::twist(link, k), Key::twist_accel(link, k)],
            point,
            anchor,
            frequency,
            damping_ratio,
            sigma,
        }
    }
}

impl Factor for ContactFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        2
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        let link_pose = pose(x[0]);
        let twist = vec3(x[1]);
        let accel = vec3(x[2]);
        let r = link_pose.rotate(&self.point);
        let position = link_pose.translation() + r;
        let velocity = point_velocity(&twist, &r);
        let acceleration = point_acceleration(&accel, &twist, &r);
        let w = self.frequency;
        let e = acceleration + velocity * (2.0 * self.damping_ratio * w) + (position - self.anchor) * (w * w);
        DVector::from_column_slice(e.as_slice())
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}
