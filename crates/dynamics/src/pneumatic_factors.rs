//! Factors of the pneumatic subsystem: chamber geometry, the gas law, piston torque and tube flow.

use jrsim_graph::{Factor, Key};
use jrsim_model::Actuator;
use nalgebra::DVector;

fn scalar(value: f64) -> DVector<f64> {
    DVector::from_element(1, value)
}

/// Chamber volume follows the joint angle through the cylinder geometry.
#[derive(Debug, Clone)]
pub struct ChamberVolumeFactor {
    keys: [Key; 2],
    actuator: Actuator,
    sigma: f64,
}

impl ChamberVolumeFactor {
    pub fn new(actuator: &Actuator, k: usize, sigma: f64) -> Self {
        Self {
            keys: [
                Key::joint_angle(actuator.joint, k),
                Key::actuator_volume(actuator.id, k),
            ],
            actuator: actuator.clone(),
            sigma,
        }
    }
}

impl Factor for ChamberVolumeFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        1
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        scalar(x[1][0] - self.actuator.volume(x[0][0]))
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

/// Isothermal ideal gas: `P·V − m·R·T = 0`. Keys are pressure, volume, mass.
#[derive(Debug, Clone)]
pub struct GasLawFactor {
    keys: [Key; 3],
    rt: f64,
    sigma: f64,
}

impl GasLawFactor {
    pub fn new(pressure: Key, volume: Key, mass: Key, rt: f64, sigma: f64) -> Self {
        Self {
            keys: [pressure, volume, mass],
            rt,
            sigma,
        }
    }

    pub fn actuator(actuator: usize, k: usize, rt: f64, sigma: f64) -> Self {
        Self::new(
            Key::actuator_pressure(actuator, k),
            Key::actuator_volume(actuator, k),
            Key::actuator_mass(actuator, k),
            rt,
            sigma,
        )
    }

    pub fn source(source: usize, k: usize, rt: f64, sigma: f64) -> Self {
        Self::new(
            Key::source_pressure(source, k),
            Key::source_volume(source, k),
            Key::source_mass(source, k),
            rt,
            sigma,
        )
    }
}

impl Factor for GasLawFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        1
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        scalar(x[0][0] * x[1][0] - x[2][0] * self.rt)
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

/// Joint torque produced by the gauge pressure on the piston.
#[derive(Debug, Clone)]
pub struct ActuatorTorqueFactor {
    keys: [Key; 3],
    actuator: Actuator,
    atmospheric_pressure: f64,
    sigma: f64,
}

impl ActuatorTorqueFactor {
    pub fn new(actuator: &Actuator, atmospheric_pressure: f64, k: usize, sigma: f64) -> Self {
        Self {
            keys: [
                Key::actuator_pressure(actuator.id, k),
                Key::joint_angle(actuator.joint, k),
                Key::torque(actuator.joint, k),
            ],
            actuator: actuator.clone(),
            atmospheric_pressure,
            sigma,
        }
    }
}

impl Factor for ActuatorTorqueFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        1
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        let torque = self.actuator.torque(x[0][0], self.atmospheric_pressure, x[1][0]);
        scalar(x[2][0] - torque)
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}

/// Laminar flow through an open valve: `ṁ = k·(P_s² − P_a²)`.
#[derive(Debug, Clone)]
pub struct MassFlowFactor {
    keys: [Key; 3],
    coefficient: f64,
    sigma: f64,
}

impl MassFlowFactor {
    pub fn new(actuator: usize, source: usize, coefficient: f64, k: usize, sigma: f64) -> Self {
        Self {
            keys: [
                Key::source_pressure(source, k),
                Key::actuator_pressure(actuator, k),
                Key::mass_flow(actuator, k),
            ],
            coefficient,
            sigma,
        }
    }
}

impl Factor for MassFlowFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        1
    }

    fn residual(&self, x: &[&DVector<f64>]) -> DVector<f64> {
        let (ps, pa) = (x[0][0], x[1][0]);
        scalar(x[2][0] - self.coefficient * (ps * ps - pa * pa))
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }
}
