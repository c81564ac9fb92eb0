//! Planar rigid-body tree: links, revolute joints, and ground contact points.

use jrsim_core::planar::{Pose2, Vector2, Vector3, perp, point_velocity, rotate};

use crate::ModelError;

#[derive(Debug, Clone)]
pub struct Link {
    pub id: usize,
    pub name: String,
    pub mass: f64,
    /// Moment of inertia about the centre of mass (kg·m²).
    pub inertia: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    pub lower: f64,
    pub upper: f64,
}

impl JointLimits {
    pub fn contains(&self, q: f64) -> bool {
        (self.lower..=self.upper).contains(&q)
    }
}

/// Planar revolute joint. The child orientation is the parent orientation plus the joint angle.
#[derive(Debug, Clone)]
pub struct Joint {
    pub id: usize,
    pub name: String,
    pub parent: usize,
    pub child: usize,
    /// Joint point in the parent link frame, relative to its centre of mass.
    pub parent_point: Vector2<f64>,
    /// Joint point in the child link frame, relative to its centre of mass.
    pub child_point: Vector2<f64>,
    pub limits: Option<JointLimits>,
}

impl Joint {
    /// Child pose implied by the parent pose and joint angle.
    pub fn child_pose(&self, parent: &Pose2, q: f64) -> Pose2 {
        let theta = parent.theta + q;
        let p = parent.transform_point(&self.parent_point) - rotate(theta, &self.child_point);
        Pose2::new(theta, p.x, p.y)
    }

    /// Parent pose implied by the child pose and joint angle.
    pub fn parent_pose(&self, child: &Pose2, q: f64) -> Pose2 {
        let theta = child.theta - q;
        let p = child.transform_point(&self.child_point) - rotate(theta, &self.parent_point);
        Pose2::new(theta, p.x, p.y)
    }

    /// Child twist implied by the parent motion and joint velocity.
    pub fn child_twist(
        &self,
        parent_pose: &Pose2,
        parent_twist: &Vector3<f64>,
        child_pose: &Pose2,
        v: f64,
    ) -> Vector3<f64> {
        let omega = parent_twist[0] + v;
        let joint_velocity = point_velocity(parent_twist, &parent_pose.rotate(&self.parent_point));
        let lin = joint_velocity - perp(&child_pose.rotate(&self.child_point)) * omega;
        Vector3::new(omega, lin.x, lin.y)
    }

    /// Parent twist implied by the child motion and joint velocity.
    pub fn parent_twist(
        &self,
        child_pose: &Pose2,
        child_twist: &Vector3<f64>,
        parent_pose: &Pose2,
        v: f64,
    ) -> Vector3<f64> {
        let omega = child_twist[0] - v;
        let joint_velocity = point_velocity(child_twist, &child_pose.rotate(&self.child_point));
        let lin = joint_velocity - perp(&parent_pose.rotate(&self.parent_point)) * omega;
        Vector3::new(omega, lin.x, lin.y)
    }

    /// Sign of the joint wrench acting on `link`: +1 on the child, -1 on the parent.
    pub fn wrench_sign(&self, link: usize) -> Option<f64> {
        if link == self.child {
            Some(1.0)
        } else if link == self.parent {
            Some(-1.0)
        } else {
            None
        }
    }

    /// Joint point on `link`, in that link's frame.
    pub fn point_on(&self, link: usize) -> Option<Vector2<f64>> {
        if link == self.child {
            Some(self.child_point)
        } else if link == self.parent {
            Some(self.parent_point)
        } else {
            None
        }
    }
}

/// A named point on a link that can touch the ground.
#[derive(Debug, Clone)]
pub struct ContactPoint {
    pub id: usize,
    pub name: String,
    pub link: usize,
    pub point: Vector2<f64>,
}

impl ContactPoint {
    pub fn position(&self, pose: &Pose2) -> Vector2<f64> {
        pose.transform_point(&self.point)
    }

    pub fn velocity(&self, pose: &Pose2, twist: &Vector3<f64>) -> Vector2<f64> {
        point_velocity(twist, &pose.rotate(&self.point))
    }
}

#[derive(Debug, Clone, Copy)]
enum Propagation {
    ParentToChild,
    ChildToParent,
}

/// Kinematic tree with a floating base link.
#[derive(Debug, Clone)]
pub struct RobotModel {
    links: Vec<Link>,
    joints: Vec<Joint>,
    contacts: Vec<ContactPoint>,
    base: usize,
    gravity: f64,
    traversal: Vec<(usize, Propagation)>,
}

impl RobotModel {
    /// Validate ids and tree structure, then fix the base-outward traversal order.
    pub fn new(
        links: Vec<Link>,
        joints: Vec<Joint>,
        contacts: Vec<ContactPoint>,
        base: usize,
        gravity: f64,
    ) -> Result<Self, ModelError> {
        for (index, link) in links.iter().enumerate() {
            if link.id != index {
                return Err(ModelError::InvalidId {
                    entity: format!("link {}", link.name),
                    id: link.id,
                    expected: index,
                });
            }
            if link.mass <= 0.0 || link.inertia <= 0.0 {
                return Err(ModelError::NonPositive {
                    name: format!("mass/inertia of link {}", link.name),
                    value: link.mass.min(link.inertia),
                });
            }
        }
        for (index, joint) in joints.iter().enumerate() {
            if joint.id != index {
                return Err(ModelError::InvalidId {
                    entity: format!("joint {}", joint.name),
                    id: joint.id,
                    expected: index,
                });
            }
            for link in [joint.parent, joint.child] {
                if link >= links.len() {
                    return Err(ModelError::UnknownLink {
                        owner: joint.name.clone(),
                        link,
                    });
                }
            }
        }
        for contact in &contacts {
            if contact.link >= links.len() {
                return Err(ModelError::UnknownLink {
                    owner: contact.name.clone(),
                    link: contact.link,
                });
            }
        }
        if base >= links.len() {
            return Err(ModelError::NotATree {
                detail: format!("base link {base} does not exist"),
            });
        }
        if joints.len() + 1 != links.len() {
            return Err(ModelError::NotATree {
                detail: format!("{} links need {} joints, found {}", links.len(), links.len() - 1, joints.len()),
            });
        }

        let mut known = vec![false; links.len()];
        known[base] = true;
        let mut traversal = Vec::with_capacity(joints.len());
        while traversal.len() < joints.len() {
            let before = traversal.len();
            for joint in &joints {
                match (known[joint.parent], known[joint.child]) {
                    (true, false) => {
                        known[joint.child] = true;
                        traversal.push((joint.id, Propagation::ParentToChild));
                    }
                    (false, true) => {
                        known[joint.parent] = true;
                        traversal.push((joint.id, Propagation::ChildToParent));
                    }
                    _ => {}
                }
            }
            if traversal.len() == before {
                return Err(ModelError::NotATree {
                    detail: "links are not all connected to the base".to_string(),
                });
            }
        }

        Ok(Self {
            links,
            joints,
            contacts,
            base,
            gravity,
            traversal,
        })
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn contacts(&self) -> &[ContactPoint] {
        &self.contacts
    }

    pub fn link(&self, id: usize) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn joint(&self, id: usize) -> Option<&Joint> {
        self.joints.get(id)
    }

    pub fn contact(&self, id: usize) -> Option<&ContactPoint> {
        self.contacts.get(id)
    }

    pub fn link_by_name(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.name == name)
    }

    pub fn joint_by_name(&self, name: &str) -> Option<&Joint> {
        self.joints.iter().find(|joint| joint.name == name)
    }

    pub fn contact_by_name(&self, name: &str) -> Option<&ContactPoint> {
        self.contacts.iter().find(|contact| contact.name == name)
    }

    /// Id of the floating base link.
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn gravity(&self) -> f64 {
        self.gravity
    }

    pub fn gravity_vector(&self) -> Vector2<f64> {
        Vector2::new(0.0, -self.gravity)
    }

    /// Joints that have `link` as parent or child.
    pub fn joints_of(&self, link: usize) -> impl Iterator<Item = &Joint> {
        self.joints
            .iter()
            .filter(move |joint| joint.parent == link || joint.child == link)
    }

    pub fn contacts_on(&self, link: usize) -> impl Iterator<Item = &ContactPoint> {
        self.contacts.iter().filter(move |contact| contact.link == link)
    }

    pub fn total_mass(&self) -> f64 {
        self.links.iter().map(|link| link.mass).sum()
    }

    /// Link poses and twists from the base state and joint coordinates, indexed by link id.
    pub fn forward_kinematics(
        &self,
        base_pose: Pose2,
        base_twist: Vector3<f64>,
        q: &[f64],
        v: &[f64],
    ) -> (Vec<Pose2>, Vec<Vector3<f64>>) {
        let mut poses = vec![Pose2::identity(); self.links.len()];
        let mut twists = vec![Vector3::zeros(); self.links.len()];
        poses[self.base] = base_pose;
        twists[self.base] = base_twist;
        for &(joint_id, direction) in &self.traversal {
            let joint = &self.joints[joint_id];
            let (qj, vj) = (q[joint_id], v[joint_id]);
            match direction {
                Propagation::ParentToChild => {
                    let pose = joint.child_pose(&poses[joint.parent], qj);
                    twists[joint.child] =
                        joint.child_twist(&poses[joint.parent], &twists[joint.parent], &pose, vj);
                    poses[joint.child] = pose;
                }
                Propagation::ChildToParent => {
                    let pose = joint.parent_pose(&poses[joint.child], qj);
                    twists[joint.parent] =
                        joint.parent_twist(&poses[joint.child], &twists[joint.child], &pose, vj);
                    poses[joint.parent] = pose;
                }
            }
        }
        (poses, twists)
    }
}
