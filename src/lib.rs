//! Factor-graph simulation of a planar pneumatic jumping robot.
//!
//! The workspace crates are re-exported here so front-ends and integration
//! tests can depend on a single package.

pub use jrsim_config as config;
pub use jrsim_core::{constants, planar, units};
pub use jrsim_dynamics as dynamics;
pub use jrsim_export as export;
pub use jrsim_graph as graph;
pub use jrsim_model as model;
pub use jrsim_simulator as simulator;
pub use jrsim_solver as solver;
