//! Pneumatic cylinder geometry, the shared source tank, and laminar tube flow.

use std::f64::consts::PI;

/// Identifier of the single shared source in graph keys.
pub const SOURCE_ID: usize = 0;

/// Isothermal ideal-gas properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasProperties {
    pub specific_gas_constant: f64,
    pub temperature: f64,
    pub viscosity: f64,
    pub atmospheric_pressure: f64,
}

impl GasProperties {
    /// `R·T`, the product relating `P·V` to gas mass.
    pub fn rt(&self) -> f64 {
        self.specific_gas_constant * self.temperature
    }

    /// Gas mass held in `volume` at `pressure`.
    pub fn mass(&self, pressure: f64, volume: f64) -> f64 {
        pressure * volume / self.rt()
    }

    /// Pressure of `mass` of gas in `volume`.
    pub fn pressure(&self, mass: f64, volume: f64) -> f64 {
        mass * self.rt() / volume
    }
}

/// Tube between the source and an actuator valve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tube {
    pub diameter: f64,
    pub length: f64,
}

impl Tube {
    /// Hagen–Poiseuille coefficient `k` in `ṁ = k·(P_s² − P_a²)` for isothermal compressible flow.
    pub fn flow_coefficient(&self, gas: &GasProperties) -> f64 {
        PI * self.diameter.powi(4) / (256.0 * gas.viscosity * self.length * gas.rt())
    }

    pub fn mass_flow(&self, gas: &GasProperties, source_pressure: f64, actuator_pressure: f64) -> f64 {
        self.flow_coefficient(gas) * (source_pressure.powi(2) - actuator_pressure.powi(2))
    }
}

/// Rigid pressurized reservoir shared by every actuator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Source {
    pub volume: f64,
    pub initial_pressure: f64,
}

/// Single-acting pneumatic cylinder spanning a joint.
///
/// The cylinder mounts at distance `mount_parent` from the joint axis on the
/// parent link and `mount_child` on the child link, so its length follows the
/// law of cosines in the joint angle.
#[derive(Debug, Clone)]
pub struct Actuator {
    pub id: usize,
    pub name: String,
    pub joint: usize,
    pub piston_area: f64,
    pub dead_volume: f64,
    pub mount_parent: f64,
    pub mount_child: f64,
}

impl Actuator {
    pub fn length(&self, q: f64) -> f64 {
        let (a, b) = (self.mount_parent, self.mount_child);
        (a * a + b * b + 2.0 * a * b * q.cos()).sqrt()
    }

    /// Shortest cylinder length, reached when the joint folds completely.
    pub fn min_length(&self) -> f64 {
        (self.mount_parent - self.mount_child).abs()
    }

    /// `dL/dq`, the moment arm mapping piston force to joint torque.
    pub fn moment_arm(&self, q: f64) -> f64 {
        -self.mount_parent * self.mount_child * q.sin() / self.length(q)
    }

    /// Chamber volume at joint angle `q`.
    pub fn volume(&self, q: f64) -> f64 {
        self.dead_volume + self.piston_area * (self.length(q) - self.min_length())
    }

    /// Joint torque from chamber pressure acting against the atmosphere.
    pub fn torque(&self, pressure: f64, atmospheric_pressure: f64, q: f64) -> f64 {
        (pressure - atmospheric_pressure) * self.piston_area * self.moment_arm(q)
    }
}
