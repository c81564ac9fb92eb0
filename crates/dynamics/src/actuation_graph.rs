//! Per-step pneumatic graphs: chambers, the shared source, and valve-gated flow.

use jrsim_graph::{FactorGraph, Key, PriorFactor, Values, ValuesError};
use jrsim_model::{Actuator, JumpingRobot, ModelError, SOURCE_ID, ValveState};

use crate::pneumatic_factors::{ActuatorTorqueFactor, ChamberVolumeFactor, GasLawFactor, MassFlowFactor};

/// Noise scales of the pneumatic factors and priors.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuationGraphParams {
    pub volume_sigma: f64,
    pub gas_law_sigma: f64,
    pub flow_sigma: f64,
    pub torque_sigma: f64,
    pub mass_prior_sigma: f64,
    pub joint_prior_sigma: f64,
}

impl Default for ActuationGraphParams {
    fn default() -> Self {
        Self {
            volume_sigma: 1e-6,
            gas_law_sigma: 1e-3,
            flow_sigma: 1e-5,
            torque_sigma: 1e-3,
            mass_prior_sigma: 1e-7,
            joint_prior_sigma: 1e-4,
        }
    }
}

/// Builds the actuation graph of one time step.
///
/// Every actuator contributes its chamber volume, gas law, torque, and one
/// flow relation chosen by its valve state. The source contributes its own gas
/// law and rigid volume once, keyed by [`SOURCE_ID`].
#[derive(Debug, Clone, Default)]
pub struct ActuationGraphBuilder {
    params: ActuationGraphParams,
}

impl ActuationGraphBuilder {
    pub fn new(params: ActuationGraphParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ActuationGraphParams {
        &self.params
    }

    /// Joint angle to chamber volume, gas state to pressure, pressure to torque.
    pub fn actuator_dynamics_graph(&self, jr: &JumpingRobot, actuator: &Actuator, k: usize) -> FactorGraph {
        let p = &self.params;
        let mut graph = FactorGraph::new();
        graph.add(ChamberVolumeFactor::new(actuator, k, p.volume_sigma));
        graph.add(GasLawFactor::actuator(actuator.id, k, jr.gas.rt(), p.gas_law_sigma));
        graph.add(ActuatorTorqueFactor::new(
            actuator,
            jr.gas.atmospheric_pressure,
            k,
            p.torque_sigma,
        ));
        graph
    }

    /// Gas law of the shared source, with its volume pinned to the tank volume.
    pub fn source_dynamics_graph(&self, jr: &JumpingRobot, k: usize) -> FactorGraph {
        let p = &self.params;
        let mut graph = FactorGraph::new();
        graph.add(GasLawFactor::source(SOURCE_ID, k, jr.gas.rt(), p.gas_law_sigma));
        graph.add(PriorFactor::scalar(
            Key::source_volume(SOURCE_ID, k),
            jr.source.volume,
            p.volume_sigma,
        ));
        graph
    }

    /// Flow into `actuator`: the tube law while open, exactly zero while closed.
    pub fn mass_flow_graph(&self, jr: &JumpingRobot, actuator: &Actuator, valve: ValveState, k: usize) -> FactorGraph {
        let p = &self.params;
        let mut graph = FactorGraph::new();
        match valve {
            ValveState::Open => graph.add(MassFlowFactor::new(
                actuator.id,
                SOURCE_ID,
                jr.tube.flow_coefficient(&jr.gas),
                k,
                p.flow_sigma,
            )),
            ValveState::Closed => graph.add(PriorFactor::scalar(Key::mass_flow(actuator.id, k), 0.0, p.flow_sigma)),
        }
        graph
    }

    /// All actuators and the source at step `k`; `valves` is indexed by actuator id.
    ///
    /// Fails with [`ModelError::ControlCount`] unless there is one valve state per actuator.
    pub fn dynamics_graph(&self, jr: &JumpingRobot, valves: &[ValveState], k: usize) -> Result<FactorGraph, ModelError> {
        let expected = jr.actuators.len();
        let count_error = || ModelError::ControlCount {
            expected,
            actual: valves.len(),
        };
        if valves.len() != expected {
            return Err(count_error());
        }
        let mut graph = self.source_dynamics_graph(jr, k);
        for actuator in &jr.actuators {
            let valve = *valves.get(actuator.id).ok_or_else(&count_error)?;
            graph.append(self.actuator_dynamics_graph(jr, actuator, k));
            graph.append(self.mass_flow_graph(jr, actuator, valve, k));
        }
        Ok(graph)
    }

    /// Pins the chamber gas mass of `actuator` at `k`.
    pub fn prior_graph_actuator(&self, actuator: &Actuator, values: &Values, k: usize) -> Result<FactorGraph, ValuesError> {
        let key = Key::actuator_mass(actuator.id, k);
        FactorGraph::priors_from(values, &[key], self.params.mass_prior_sigma)
    }

    /// Pins the source gas mass at `k`.
    pub fn prior_graph_source(&self, values: &Values, k: usize) -> Result<FactorGraph, ValuesError> {
        let key = Key::source_mass(SOURCE_ID, k);
        FactorGraph::priors_from(values, &[key], self.params.mass_prior_sigma)
    }

    /// Pins the angle of the joint `actuator` drives at `k`.
    pub fn prior_graph_joint(&self, actuator: &Actuator, values: &Values, k: usize) -> Result<FactorGraph, ValuesError> {
        let key = Key::joint_angle(actuator.joint, k);
        FactorGraph::priors_from(values, &[key], self.params.joint_prior_sigma)
    }

    /// Known initial condition of the whole subsystem at `k`.
    pub fn prior_graph(&self, jr: &JumpingRobot, values: &Values, k: usize) -> Result<FactorGraph, ValuesError> {
        let mut graph = self.prior_graph_source(values, k)?;
        for actuator in &jr.actuators {
            graph.append(self.prior_graph_actuator(actuator, values, k)?);
            graph.append(self.prior_graph_joint(actuator, values, k)?);
        }
        Ok(graph)
    }
}
