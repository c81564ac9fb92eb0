//! Robot, actuator, source, and control data for the jumping-robot simulator.

use thiserror::Error;

pub mod controls;
pub mod jumping_robot;
pub mod pneumatics;
pub mod robot;

pub use controls::{Controls, ValveState, ValveTiming};
pub use jumping_robot::{ContactModel, InitialState, JumpingRobot, Morphology};
pub use pneumatics::{Actuator, GasProperties, SOURCE_ID, Source, Tube};
pub use robot::{ContactPoint, Joint, JointLimits, Link, RobotModel};

/// Errors raised while assembling robot models and control schedules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("{entity} has id {id}, expected {expected}")]
    InvalidId {
        entity: String,
        id: usize,
        expected: usize,
    },
    #[error("{owner} references unknown link {link}")]
    UnknownLink { owner: String, link: usize },
    #[error("{owner} references unknown joint {joint}")]
    UnknownJoint { owner: String, joint: String },
    #[error("links do not form a tree: {detail}")]
    NotATree { detail: String },
    #[error("joint {0} has more than one actuator")]
    DuplicateActuator(String),
    #[error("no initial angle given for joint {0}")]
    MissingInitialAngle(String),
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: String, value: f64 },
    #[error("valve of actuator {actuator} opens at {open} s, after it closes at {close} s")]
    InvalidValveTiming { actuator: usize, open: f64, close: f64 },
    #[error("expected {expected} valve timings, got {actual}")]
    ControlCount { expected: usize, actual: usize },
    #[error("valve schedule names unknown actuator {0}")]
    UnknownActuator(String),
}
