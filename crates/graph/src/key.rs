//! Variable keys: (kind, entity id, step index).

use std::fmt;

/// Kind of physical quantity a variable represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VarKind {
    Pose,
    Twist,
    TwistAccel,
    Wrench,
    ContactForce,
    JointAngle,
    JointVel,
    JointAccel,
    Torque,
    ActuatorPressure,
    ActuatorVolume,
    ActuatorMass,
    MassFlow,
    SourcePressure,
    SourceVolume,
    SourceMass,
    Time,
    PhaseDuration,
    ValveOpenTime,
    ValveCloseTime,
}

impl VarKind {
    /// Number of scalar components of a variable of this kind.
    pub const fn dim(self) -> usize {
        match self {
            VarKind::Pose | VarKind::Twist | VarKind::TwistAccel | VarKind::Wrench => 3,
            VarKind::ContactForce => 2,
            _ => 1,
        }
    }

    /// Short label used in key display and exported column names.
    pub const fn label(self) -> &'static str {
        match self {
            VarKind::Pose => "pose",
            VarKind::Twist => "twist",
            VarKind::TwistAccel => "twist_accel",
            VarKind::Wrench => "wrench",
            VarKind::ContactForce => "contact_force",
            VarKind::JointAngle => "q",
            VarKind::JointVel => "v",
            VarKind::JointAccel => "a",
            VarKind::Torque => "torque",
            VarKind::ActuatorPressure => "p_a",
            VarKind::ActuatorVolume => "v_a",
            VarKind::ActuatorMass => "m_a",
            VarKind::MassFlow => "mdot",
            VarKind::SourcePressure => "p_s",
            VarKind::SourceVolume => "v_s",
            VarKind::SourceMass => "m_s",
            VarKind::Time => "t",
            VarKind::PhaseDuration => "dt",
            VarKind::ValveOpenTime => "t_open",
            VarKind::ValveCloseTime => "t_close",
        }
    }

    /// Variables not indexed by time step; they always carry step 0.
    pub const fn is_static(self) -> bool {
        matches!(
            self,
            VarKind::PhaseDuration | VarKind::ValveOpenTime | VarKind::ValveCloseTime
        )
    }
}

/// Identifier of one variable in a factor graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub kind: VarKind,
    pub id: usize,
    pub step: usize,
}

impl Key {
    pub const fn new(kind: VarKind, id: usize, step: usize) -> Self {
        Self { kind, id, step }
    }

    pub const fn dim(&self) -> usize {
        self.kind.dim()
    }

    pub const fn pose(link: usize, step: usize) -> Self {
        Self::new(VarKind::Pose, link, step)
    }

    pub const fn twist(link: usize, step: usize) -> Self {
        Self::new(VarKind::Twist, link, step)
    }

    pub const fn twist_accel(link: usize, step: usize) -> Self {
        Self::new(VarKind::TwistAccel, link, step)
    }

    pub const fn wrench(joint: usize, step: usize) -> Self {
        Self::new(VarKind::Wrench, joint, step)
    }

    pub const fn contact_force(contact: usize, step: usize) -> Self {
        Self::new(VarKind::ContactForce, contact, step)
    }

    pub const fn joint_angle(joint: usize, step: usize) -> Self {
        Self::new(VarKind::JointAngle, joint, step)
    }

    pub const fn joint_vel(joint: usize, step: usize) -> Self {
        Self::new(VarKind::JointVel, joint, step)
    }

    pub const fn joint_accel(joint: usize, step: usize) -> Self {
        Self::new(VarKind::JointAccel, joint, step)
    }

    pub const fn torque(joint: usize, step: usize) -> Self {
        Self::new(VarKind::Torque, joint, step)
    }

    pub const fn actuator_pressure(actuator: usize, step: usize) -> Self {
        Self::new(VarKind::ActuatorPressure, actuator, step)
    }

    pub const fn actuator_volume(actuator: usize, step: usize) -> Self {
        Self::new(VarKind::ActuatorVolume, actuator, step)
    }

    pub const fn actuator_mass(actuator: usize, step: usize) -> Self {
        Self::new(VarKind::ActuatorMass, actuator, step)
    }

    pub const fn mass_flow(actuator: usize, step: usize) -> Self {
        Self::new(VarKind::MassFlow, actuator, step)
    }

    pub const fn source_pressure(source: usize, step: usize) -> Self {
        Self::new(VarKind::SourcePressure, source, step)
    }

    pub const fn source_volume(source: usize, step: usize) -> Self {
        Self::new(VarKind::SourceVolume, source, step)
    }

    pub const fn source_mass(source: usize, step: usize) -> Self {
        Self::new(VarKind::SourceMass, source, step)
    }

    pub const fn time(step: usize) -> Self {
        Self::new(VarKind::Time, 0, step)
    }

    pub const fn phase_duration(phase: usize) -> Self {
        Self::new(VarKind::PhaseDuration, phase, 0)
    }

    pub const fn valve_open_time(actuator: usize) -> Self {
        Self::new(VarKind::ValveOpenTime, actuator, 0)
    }

    pub const fn valve_close_time(actuator: usize) -> Self {
        Self::new(VarKind::ValveCloseTime, actuator, 0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_static() {
            write!(f, "{}[{}]", self.kind.label(), self.id)
        } else {
            write!(f, "{}[{}]@{}", self.kind.label(), self.id, self.step)
        }
    }
}
