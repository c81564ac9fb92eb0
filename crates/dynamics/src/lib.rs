//! Factor-graph builders for the mechanical and pneumatic halves of one simulation step.
//!
//! Builders are stateless: every graph is a pure function of the robot, the
//! step index, and (for priors) the already known values.

pub mod actuation_graph;
pub mod pneumatic_factors;
pub mod robot_factors;
pub mod robot_graph;

pub use actuation_graph::{ActuationGraphBuilder, ActuationGraphParams};
pub use pneumatic_factors::{ActuatorTorqueFactor, ChamberVolumeFactor, GasLawFactor, MassFlowFactor};
pub use robot_factors::{
    ContactFactor, NewtonEulerFactor, PoseFactor, TorqueFactor, TwistAccelFactor, TwistFactor, WrenchTerm,
};
pub use robot_graph::{GroundContact, RobotGraphBuilder, RobotGraphParams};
