//! Configuration models and loaders for jumping-robot descriptions.

use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_3;
use std::fs::File;
use std::path::Path;

use jrsim_core::constants::{
    AIR_GAS_CONSTANT, AIR_VISCOSITY, ATMOSPHERIC_PRESSURE, GRAVITY, ROOM_TEMPERATURE,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Complete description of a pneumatic jumping robot and its default run settings.
#[derive(Debug, Deserialize, Clone)]
pub struct JumpingRobotConfig {
    pub morphology: MorphologyConfig,
    pub actuators: Vec<ActuatorConfig>,
    pub source: SourceConfig,
    #[serde(default)]
    pub tube: TubeConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub contact: ContactConfig,
    pub initial: InitialConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Two-legged planar body: torso plus thigh and shank on each side.
#[derive(Debug, Deserialize, Clone)]
pub struct MorphologyConfig {
    /// Length of every thigh and shank link.
    pub leg_length_m: f64,
    pub torso_width_m: f64,
    /// Radius of the cylindrical leg links (used for inertia).
    pub link_radius_m: f64,
    pub shank_mass_kg: f64,
    pub thigh_mass_kg: f64,
    pub torso_mass_kg: f64,
    /// Optional `[lower, upper]` limits keyed by joint name.
    #[serde(default)]
    pub joint_limits_rad: BTreeMap<String, [f64; 2]>,
}

/// Pneumatic cylinder spanning one joint.
#[derive(Debug, Deserialize, Clone)]
pub struct ActuatorConfig {
    pub name: String,
    pub joint: String,
    pub piston_diameter_m: f64,
    pub dead_volume_m3: f64,
    /// Distance from the joint axis to the mount on the parent link.
    pub mount_parent_m: f64,
    /// Distance from the joint axis to the mount on the child link.
    pub mount_child_m: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub volume_m3: f64,
    pub initial_pressure_psi: f64,
}

/// Tube between the source and each actuator valve.
#[derive(Debug, Deserialize, Clone)]
pub struct TubeConfig {
    #[serde(default = "default_tube_diameter")]
    pub diameter_m: f64,
    #[serde(default = "default_tube_length")]
    pub length_m: f64,
}

impl Default for TubeConfig {
    fn default() -> Self {
        Self {
            diameter_m: default_tube_diameter(),
            length_m: default_tube_length(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GasConfig {
    #[serde(default = "default_gas_constant")]
    pub specific_gas_constant_j_kg_k: f64,
    #[serde(default = "default_temperature")]
    pub temperature_k: f64,
    #[serde(default = "default_viscosity")]
    pub viscosity_pa_s: f64,
    #[serde(default = "default_atmospheric_pressure")]
    pub atmospheric_pressure_pa: f64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            specific_gas_constant_j_kg_k: default_gas_constant(),
            temperature_k: default_temperature(),
            viscosity_pa_s: default_viscosity(),
            atmospheric_pressure_pa: default_atmospheric_pressure(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnvironmentConfig {
    #[serde(default = "default_gravity")]
    pub gravity_m_s2: f64,
    #[serde(default)]
    pub ground_height_m: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            gravity_m_s2: default_gravity(),
            ground_height_m: 0.0,
        }
    }
}

/// Stabilized point-contact parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct ContactConfig {
    #[serde(default = "default_stabilization_frequency")]
    pub stabilization_frequency_rad_s: f64,
    #[serde(default = "default_damping_ratio")]
    pub damping_ratio: f64,
    /// Height band above the ground treated as touching.
    #[serde(default = "default_contact_tolerance")]
    pub tolerance_m: f64,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            stabilization_frequency_rad_s: default_stabilization_frequency(),
            damping_ratio: default_damping_ratio(),
            tolerance_m: default_contact_tolerance(),
        }
    }
}

/// Configuration at t = 0.
#[derive(Debug, Deserialize, Clone)]
pub struct InitialConfig {
    /// Torso `[theta, x, y]`.
    pub torso_pose: [f64; 3],
    /// Torso `[omega, vx, vy]`.
    #[serde(default)]
    pub torso_twist: [f64; 3],
    pub joint_angles_rad: BTreeMap<String, f64>,
    #[serde(default)]
    pub joint_velocities_rad_s: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SolverKindConfig {
    #[default]
    LevenbergMarquardt,
    GaussNewton,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SolverConfig {
    #[serde(default)]
    pub kind: SolverKindConfig,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_convergence_error_tol")]
    pub convergence_error_tol: f64,
    #[serde(default = "default_relative_error_tol")]
    pub relative_error_tol: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKindConfig::default(),
            max_iterations: default_max_iterations(),
            convergence_error_tol: default_convergence_error_tol(),
            relative_error_tol: default_relative_error_tol(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollocationConfig {
    #[default]
    Euler,
    Trapezoidal,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicyConfig {
    #[default]
    Report,
    Abort,
}

/// Valve schedule entry for one actuator, in seconds.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ValveScheduleConfig {
    pub actuator: String,
    pub open_s: f64,
    pub close_s: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimulationConfig {
    #[serde(default = "default_dt")]
    pub dt_s: f64,
    #[serde(default = "default_num_steps")]
    pub num_steps: usize,
    #[serde(default)]
    pub collocation: CollocationConfig,
    #[serde(default)]
    pub violation_policy: ViolationPolicyConfig,
    #[serde(default)]
    pub valve_schedule: Vec<ValveScheduleConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt_s: default_dt(),
            num_steps: default_num_steps(),
            collocation: CollocationConfig::default(),
            violation_policy: ViolationPolicyConfig::default(),
            valve_schedule: Vec::new(),
        }
    }
}

impl Default for JumpingRobotConfig {
    /// The reference robot crouched at 60° with both feet on the ground.
    fn default() -> Self {
        let leg = 0.55;
        let bend = FRAC_PI_3;
        let actuator = |name: &str| ActuatorConfig {
            name: name.to_string(),
            joint: name.to_string(),
            piston_diameter_m: 0.025,
            dead_volume_m3: 5.0e-6,
            mount_parent_m: 0.05,
            mount_child_m: 0.05,
        };
        let joint_angles_rad = [
            ("knee_r", 2.0 * bend),
            ("hip_r", -bend),
            ("hip_l", -bend),
            ("knee_l", 2.0 * bend),
        ]
        .into_iter()
        .map(|(name, q)| (name.to_string(), q))
        .collect();
        Self {
            morphology: MorphologyConfig {
                leg_length_m: leg,
                torso_width_m: 0.3,
                link_radius_m: 0.02,
                shank_mass_kg: 0.3,
                thigh_mass_kg: 0.3,
                torso_mass_kg: 1.2,
                joint_limits_rad: BTreeMap::new(),
            },
            actuators: ["knee_r", "hip_r", "hip_l", "knee_l"]
                .into_iter()
                .map(actuator)
                .collect(),
            source: SourceConfig {
                volume_m3: 1.0e-3,
                initial_pressure_psi: 65.0,
            },
            tube: TubeConfig::default(),
            gas: GasConfig::default(),
            environment: EnvironmentConfig::default(),
            contact: ContactConfig::default(),
            initial: InitialConfig {
                torso_pose: [0.0, 0.0, 2.0 * leg * bend.cos()],
                torso_twist: [0.0; 3],
                joint_angles_rad,
                joint_velocities_rad_s: BTreeMap::new(),
            },
            solver: SolverConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Errors that can occur while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Load a robot description from a YAML file, or TOML when the extension is `.toml`.
pub fn load_robot_config<P: AsRef<Path>>(path: P) -> Result<JumpingRobotConfig, ConfigError> {
    let path = path.as_ref();
    let config = load_record(path)?;
    debug!(path = %path.display(), "loaded robot configuration");
    Ok(config)
}

fn load_record<T, P>(path: P) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if path.extension().map(|ext| ext == "toml").unwrap_or(false) {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    } else {
        let reader = File::open(path)?;
        Ok(serde_yaml::from_reader(reader)?)
    }
}

fn default_tube_diameter() -> f64 {
    0.001
}

fn default_tube_length() -> f64 {
    0.5
}

fn default_gas_constant() -> f64 {
    AIR_GAS_CONSTANT
}

fn default_temperature() -> f64 {
    ROOM_TEMPERATURE
}

fn default_viscosity() -> f64 {
    AIR_VISCOSITY
}

fn default_atmospheric_pressure() -> f64 {
    ATMOSPHERIC_PRESSURE
}

fn default_gravity() -> f64 {
    GRAVITY
}

fn default_stabilization_frequency() -> f64 {
    40.0
}

fn default_damping_ratio() -> f64 {
    1.0
}

fn default_contact_tolerance() -> f64 {
    1e-6
}

fn default_max_iterations() -> usize {
    100
}

fn default_convergence_error_tol() -> f64 {
    1e-10
}

fn default_relative_error_tol() -> f64 {
    1e-12
}

fn default_dt() -> f64 {
    0.005
}

fn default_num_steps() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
actuators = []

[morphology]
leg_length_m = 0.5
torso_width_m = 0.2
link_radius_m = 0.01
shank_mass_kg = 0.2
thigh_mass_kg = 0.2
torso_mass_kg = 1.0

[source]
volume_m3 = 0.002
initial_pressure_psi = 40.0

[initial]
torso_pose = [0.0, 0.0, 1.0]

[initial.joint_angles_rad]
knee_r = 0.5

[simulation]
collocation = "trapezoidal"
"#;

    #[test]
    fn toml_sections_fall_back_to_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        file.write_all(MINIMAL_TOML.as_bytes()).expect("write");
        let config = load_robot_config(file.path()).expect("parse toml");
        assert_eq!(config.simulation.collocation, CollocationConfig::Trapezoidal);
        assert_eq!(config.simulation.dt_s, 0.005);
        assert_eq!(config.gas.atmospheric_pressure_pa, ATMOSPHERIC_PRESSURE);
        assert_eq!(config.tube.diameter_m, 0.001);
        assert_eq!(config.initial.joint_angles_rad["knee_r"], 0.5);
        assert_eq!(config.solver.kind, SolverKindConfig::LevenbergMarquardt);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_robot_config("does/not/exist.yaml").expect_err("missing");
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn default_robot_stands_on_its_feet() {
        let config = JumpingRobotConfig::default();
        let leg = config.morphology.leg_length_m;
        let bend = config.initial.joint_angles_rad["knee_r"] / 2.0;
        let foot_height = config.initial.torso_pose[2] - 2.0 * leg * bend.cos();
        assert!(foot_height.abs() < 1e-12);
    }
}
