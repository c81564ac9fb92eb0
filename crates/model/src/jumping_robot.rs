//! The two-legged pneumatic jumping robot assembled from configuration.

use jrsim_config::{JumpingRobotConfig, ValveScheduleConfig};
use jrsim_core::planar::{Pose2, Vector2, Vector3};
use jrsim_core::units::psi_to_pa;
use tracing::{debug, warn};

use crate::controls::{Controls, ValveTiming};
use crate::pneumatics::{Actuator, GasProperties, Source, Tube};
use crate::robot::{ContactPoint, Joint, JointLimits, Link, RobotModel};
use crate::ModelError;

pub const TORSO: &str = "torso";
pub const THIGH_R: &str = "thigh_r";
pub const SHANK_R: &str = "shank_r";
pub const THIGH_L: &str = "thigh_l";
pub const SHANK_L: &str = "shank_l";

pub const KNEE_R: &str = "knee_r";
pub const HIP_R: &str = "hip_r";
pub const HIP_L: &str = "hip_l";
pub const KNEE_L: &str = "knee_l";

pub const FOOT_R: &str = "foot_r";
pub const FOOT_L: &str = "foot_l";

/// Geometric parameters the link layout was generated from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Morphology {
    pub leg_length: f64,
    pub torso_width: f64,
    pub link_radius: f64,
}

/// Stabilized point-contact model against flat ground.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactModel {
    pub stabilization_frequency: f64,
    pub damping_ratio: f64,
    pub tolerance: f64,
    pub ground_height: f64,
}

/// Base state and joint coordinates at t = 0, indexed by joint id.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialState {
    pub base_pose: Pose2,
    pub base_twist: Vector3<f64>,
    pub joint_angles: Vec<f64>,
    pub joint_velocities: Vec<f64>,
}

/// Robot model together with its actuation hardware and starting configuration.
#[derive(Debug, Clone)]
pub struct JumpingRobot {
    pub robot: RobotModel,
    pub actuators: Vec<Actuator>,
    pub source: Source,
    pub gas: GasProperties,
    pub tube: Tube,
    pub morphology: Morphology,
    pub contact: ContactModel,
    pub initial: InitialState,
}

impl JumpingRobot {
    pub fn from_config(config: &JumpingRobotConfig) -> Result<Self, ModelError> {
        let m = &config.morphology;
        positive("leg_length_m", m.leg_length_m)?;
        positive("torso_width_m", m.torso_width_m)?;
        positive("link_radius_m", m.link_radius_m)?;
        let morphology = Morphology {
            leg_length: m.leg_length_m,
            torso_width: m.torso_width_m,
            link_radius: m.link_radius_m,
        };

        let robot = build_robot(config, &morphology)?;
        let actuators = build_actuators(config, &robot)?;

        positive("source.volume_m3", config.source.volume_m3)?;
        let source = Source {
            volume: config.source.volume_m3,
            initial_pressure: psi_to_pa(config.source.initial_pressure_psi),
        };
        positive("tube.diameter_m", config.tube.diameter_m)?;
        positive("tube.length_m", config.tube.length_m)?;
        positive("gas.temperature_k", config.gas.temperature_k)?;
        positive("gas.viscosity_pa_s", config.gas.viscosity_pa_s)?;

        if source.initial_pressure < config.gas.atmospheric_pressure_pa {
            warn!(
                pressure_pa = source.initial_pressure,
                "source starts below atmospheric pressure"
            );
        }

        let initial = build_initial_state(config, &robot)?;
        debug!(
            links = robot.links().len(),
            actuators = actuators.len(),
            mass_kg = robot.total_mass(),
            "assembled jumping robot"
        );

        Ok(Self {
            robot,
            actuators,
            source,
            gas: GasProperties {
                specific_gas_constant: config.gas.specific_gas_constant_j_kg_k,
                temperature: config.gas.temperature_k,
                viscosity: config.gas.viscosity_pa_s,
                atmospheric_pressure: config.gas.atmospheric_pressure_pa,
            },
            tube: Tube {
                diameter: config.tube.diameter_m,
                length: config.tube.length_m,
            },
            morphology,
            contact: ContactModel {
                stabilization_frequency: config.contact.stabilization_frequency_rad_s,
                damping_ratio: config.contact.damping_ratio,
                tolerance: config.contact.tolerance_m,
                ground_height: config.environment.ground_height_m,
            },
            initial,
        })
    }

    /// Actuator driving `joint`, if any.
    pub fn actuator_for_joint(&self, joint: usize) -> Option<&Actuator> {
        self.actuators.iter().find(|actuator| actuator.joint == joint)
    }

    pub fn actuator_by_name(&self, name: &str) -> Option<&Actuator> {
        self.actuators.iter().find(|actuator| actuator.name == name)
    }

    /// Controls built from named schedule entries; unnamed actuators stay closed.
    pub fn controls_from_schedule(&self, schedule: &[ValveScheduleConfig]) -> Result<Controls, ModelError> {
        let mut timings = vec![ValveTiming { open: 0.0, close: 0.0 }; self.actuators.len()];
        for entry in schedule {
            let actuator = self
                .actuator_by_name(&entry.actuator)
                .ok_or_else(|| ModelError::UnknownActuator(entry.actuator.clone()))?;
            timings[actuator.id] = ValveTiming {
                open: entry.open_s,
                close: entry.close_s,
            };
        }
        Controls::from_timings(timings)
    }

    /// Controls must provide exactly one timing per actuator.
    pub fn check_controls(&self, controls: &Controls) -> Result<(), ModelError> {
        if controls.len() != self.actuators.len() {
            return Err(ModelError::ControlCount {
                expected: self.actuators.len(),
                actual: controls.len(),
            });
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<(), ModelError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ModelError::NonPositive {
            name: name.to_string(),
            value,
        })
    }
}

fn rod_inertia(mass: f64, length: f64, radius: f64) -> f64 {
    mass * (length * length + 3.0 * radius * radius) / 12.0
}

fn build_robot(config: &JumpingRobotConfig, morphology: &Morphology) -> Result<RobotModel, ModelError> {
    let m = &config.morphology;
    let (l, w, r) = (morphology.leg_length, morphology.torso_width, morphology.link_radius);

    let link = |id: usize, name: &str, mass: f64, length: f64| Link {
        id,
        name: name.to_string(),
        mass,
        inertia: rod_inertia(mass, length, r),
    };
    let links = vec![
        link(0, TORSO, m.torso_mass_kg, w),
        link(1, THIGH_R, m.thigh_mass_kg, l),
        link(2, SHANK_R, m.shank_mass_kg, l),
        link(3, THIGH_L, m.thigh_mass_kg, l),
        link(4, SHANK_L, m.shank_mass_kg, l),
    ];

    let top = Vector2::new(0.0, l / 2.0);
    let bottom = Vector2::new(0.0, -l / 2.0);
    let joint = |id: usize, name: &str, parent: usize, child: usize, pp: Vector2<f64>, cp: Vector2<f64>| Joint {
        id,
        name: name.to_string(),
        parent,
        child,
        parent_point: pp,
        child_point: cp,
        limits: None,
    };
    let mut joints = vec![
        joint(0, KNEE_R, 2, 1, top, bottom),
        joint(1, HIP_R, 1, 0, top, Vector2::new(w / 2.0, 0.0)),
        joint(2, HIP_L, 0, 3, Vector2::new(-w / 2.0, 0.0), top),
        joint(3, KNEE_L, 3, 4, bottom, top),
    ];
    for (name, [lower, upper]) in &m.joint_limits_rad {
        let joint = joints
            .iter_mut()
            .find(|joint| &joint.name == name)
            .ok_or_else(|| ModelError::UnknownJoint {
                owner: "joint_limits_rad".to_string(),
                joint: name.clone(),
            })?;
        joint.limits = Some(JointLimits {
            lower: *lower,
            upper: *upper,
        });
    }

    let contacts = vec![
        ContactPoint {
            id: 0,
            name: FOOT_R.to_string(),
            link: 2,
            point: bottom,
        },
        ContactPoint {
            id: 1,
            name: FOOT_L.to_string(),
            link: 4,
            point: bottom,
        },
    ];

    RobotModel::new(links, joints, contacts, 0, config.environment.gravity_m_s2)
}

fn build_actuators(config: &JumpingRobotConfig, robot: &RobotModel) -> Result<Vec<Actuator>, ModelError> {
    let mut actuators: Vec<Actuator> = Vec::with_capacity(config.actuators.len());
    for (id, cfg) in config.actuators.iter().enumerate() {
        let joint = robot
            .joint_by_name(&cfg.joint)
            .ok_or_else(|| ModelError::UnknownJoint {
                owner: cfg.name.clone(),
                joint: cfg.joint.clone(),
            })?;
        if actuators.iter().any(|existing| existing.joint == joint.id) {
            return Err(ModelError::DuplicateActuator(cfg.joint.clone()));
        }
        positive("piston_diameter_m", cfg.piston_diameter_m)?;
        positive("dead_volume_m3", cfg.dead_volume_m3)?;
        positive("mount_parent_m", cfg.mount_parent_m)?;
        positive("mount_child_m", cfg.mount_child_m)?;
        actuators.push(Actuator {
            id,
            name: cfg.name.clone(),
            joint: joint.id,
            piston_area: std::f64::consts::PI * cfg.piston_diameter_m.powi(2) / 4.0,
            dead_volume: cfg.dead_volume_m3,
            mount_parent: cfg.mount_parent_m,
            mount_child: cfg.mount_child_m,
        });
    }
    Ok(actuators)
}

fn build_initial_state(config: &JumpingRobotConfig, robot: &RobotModel) -> Result<InitialState, ModelError> {
    let init = &config.initial;
    let lookup = |owner: &str, name: &String| {
        robot
            .joint_by_name(name)
            .map(|joint| joint.id)
            .ok_or_else(|| ModelError::UnknownJoint {
                owner: owner.to_string(),
                joint: name.clone(),
            })
    };

    let mut joint_angles = vec![None; robot.joints().len()];
    for (name, q) in &init.joint_angles_rad {
        joint_angles[lookup("initial.joint_angles_rad", name)?] = Some(*q);
    }
    let joint_angles = joint_angles
        .into_iter()
        .zip(robot.joints())
        .map(|(q, joint)| q.ok_or_else(|| ModelError::MissingInitialAngle(joint.name.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    let mut joint_velocities = vec![0.0; robot.joints().len()];
    for (name, v) in &init.joint_velocities_rad_s {
        joint_velocities[lookup("initial.joint_velocities_rad_s", name)?] = *v;
    }

    let [theta, x, y] = init.torso_pose;
    let [omega, vx, vy] = init.torso_twist;
    Ok(InitialState {
        base_pose: Pose2::new(theta, x, y),
        base_twist: Vector3::new(omega, vx, vy),
        joint_angles,
        joint_velocities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn crouched_feet_sit_under_the_hips() {
        let jr = JumpingRobot::from_config(&JumpingRobotConfig::default()).expect("robot");
        let init = &jr.initial;
        let (poses, _) = jr.robot.forward_kinematics(
            init.base_pose,
            init.base_twist,
            &init.joint_angles,
            &init.joint_velocities,
        );
        let half_width = jr.morphology.torso_width / 2.0;
        let foot_r = jr.robot.contact(0).expect("foot_r");
        let foot_l = jr.robot.contact(1).expect("foot_l");
        let pr = foot_r.position(&poses[foot_r.link]);
        let pl = foot_l.position(&poses[foot_l.link]);
        assert_relative_eq!(pr.x, half_width, epsilon = 1e-12);
        assert_relative_eq!(pl.x, -half_width, epsilon = 1e-12);
        assert_relative_eq!(pr.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pl.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn shank_orientations_mirror_each_other() {
        let jr = JumpingRobot::from_config(&JumpingRobotConfig::default()).expect("robot");
        let init = &jr.initial;
        let (poses, _) = jr.robot.forward_kinematics(
            init.base_pose,
            init.base_twist,
            &init.joint_angles,
            &init.joint_velocities,
        );
        let bend = std::f64::consts::FRAC_PI_3;
        let shank_r = jr.robot.link_by_name(SHANK_R).expect("shank_r").id;
        let thigh_l = jr.robot.link_by_name(THIGH_L).expect("thigh_l").id;
        assert_relative_eq!(poses[shank_r].theta, -bend, epsilon = 1e-12);
        assert_relative_eq!(poses[thigh_l].theta, -bend, epsilon = 1e-12);
    }

    #[test]
    fn lookups_by_id_return_none_past_the_last_entity() {
        let jr = JumpingRobot::from_config(&JumpingRobotConfig::default()).expect("robot");
        assert_eq!(jr.robot.link(0).map(|link| link.name.as_str()), Some(TORSO));
        assert_eq!(jr.robot.joint(3).map(|joint| joint.name.as_str()), Some(KNEE_L));
        assert_eq!(jr.robot.contact(1).map(|contact| contact.name.as_str()), Some(FOOT_L));
        assert!(jr.robot.link(5).is_none());
        assert!(jr.robot.joint(4).is_none());
        assert!(jr.robot.contact(2).is_none());
    }

    #[test]
    fn actuator_for_unknown_joint_is_rejected() {
        let mut config = JumpingRobotConfig::default();
        config.actuators[0].joint = "ankle".to_string();
        let err = JumpingRobot::from_config(&config).expect_err("unknown joint");
        assert!(matches!(err, ModelError::UnknownJoint { .. }));
    }

    #[test]
    fn schedule_entries_map_to_actuator_ids() {
        let jr = JumpingRobot::from_config(&JumpingRobotConfig::default()).expect("robot");
        let schedule = vec![ValveScheduleConfig {
            actuator: HIP_L.to_string(),
            open_s: 0.1,
            close_s: 0.2,
        }];
        let controls = jr.controls_from_schedule(&schedule).expect("controls");
        let hip_l = jr.actuator_by_name(HIP_L).expect("hip_l").id;
        assert_eq!(controls.timing(hip_l).map(|t| t.open), Some(0.1));
        assert_eq!(controls.timing(0).map(|t| t.close), Some(0.0));
    }
}
