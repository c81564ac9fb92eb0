//! Hybrid time stepping for the pneumatic jumping robot.
//!
//! Each step solves kinematics, actuation, and dynamics graphs, integrates the
//! collocated state to the next step, and switches between ground-contact and
//! flight regimes as contacts release or touch down.

pub mod collocation;
pub mod error;
pub mod graph_builder;
pub mod jr_values;
pub mod phase;
pub mod simulator;
pub mod trajectory;

pub use collocation::{CollocationFactor, CollocationScheme, DerivativeTerm, StepDuration};
pub use error::{PhysicalConstraintViolation, SimulationError, SimulationFailure, StepError, ViolationPolicy};
pub use graph_builder::{CollocationParams, JRGraphBuilder};
pub use jr_values::{
    control_values, init_config_values, initial_guess, joint_accels_map, joint_angles_map, joint_torques_map,
    phase_duration_values,
};
pub use phase::{Phase, Regime, initial_regime, is_apex, next_regime, phase_index_at, step_times};
pub use simulator::{JRSimulator, physical_violations};
pub use trajectory::Trajectory;
