//! Export helpers for CSV and JSON artifacts.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use jrsim_graph::ValuesError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Values(#[from] ValuesError),
}

/// Create a writer for the target path, handling stdout (`-`) by convention.
pub fn writer_for_path(path: &Path) -> io::Result<Box<dyn Write>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    Ok(Box::new(BufWriter::new(file)))
}

pub mod table {
    //! One CSV row per solved step.

    use std::io::Write;

    use jrsim_graph::{Key, Values};
    use jrsim_model::{JumpingRobot, SOURCE_ID};
    use jrsim_simulator::Trajectory;

    use crate::ExportError;

    /// Column names for `jr`, in row order.
    pub fn header(jr: &JumpingRobot) -> Vec<String> {
        let mut columns: Vec<String> = ["step", "time_s", "phase", "theta_rad", "x_m", "y_m", "omega_rad_s", "vx_m_s", "vy_m_s"]
            .iter()
            .map(|column| column.to_string())
            .collect();
        for joint in jr.robot.joints() {
            for quantity in ["q", "v", "a", "torque"] {
                columns.push(format!("{quantity}_{}", joint.name));
            }
        }
        for actuator in &jr.actuators {
            columns.push(format!("p_{}_pa", actuator.name));
            columns.push(format!("mdot_{}_kg_s", actuator.name));
        }
        columns.push("p_source_pa".to_string());
        columns.push("m_source_kg".to_string());
        for contact in jr.robot.contacts() {
            columns.push(format!("fx_{}_n", contact.name));
            columns.push(format!("fy_{}_n", contact.name));
        }
        columns
    }

    fn row(jr: &JumpingRobot, trajectory: &Trajectory, k: usize) -> Result<Vec<String>, ExportError> {
        let values: &Values = &trajectory.values;
        let base = jr.robot.base();
        let pose = values.pose(&Key::pose(base, k))?;
        let twist = values.vector3(&Key::twist(base, k))?;
        let phase = trajectory.regime_at(k).map_or("", |regime| regime.label());

        let mut fields = vec![k.to_string(), trajectory.time(k)?.to_string(), phase.to_string()];
        fields.extend([pose.theta, pose.x, pose.y, twist[0], twist[1], twist[2]].map(|v| v.to_string()));
        for joint in jr.robot.joints() {
            for key in [Key::joint_angle, Key::joint_vel, Key::joint_accel, Key::torque] {
                fields.push(values.scalar(&key(joint.id, k))?.to_string());
            }
        }
        for actuator in &jr.actuators {
            fields.push(values.scalar(&Key::actuator_pressure(actuator.id, k))?.to_string());
            fields.push(values.scalar(&Key::mass_flow(actuator.id, k))?.to_string());
        }
        fields.push(values.scalar(&Key::source_pressure(SOURCE_ID, k))?.to_string());
        fields.push(values.scalar(&Key::source_mass(SOURCE_ID, k))?.to_string());
        // Contacts without a force at this step are not touching the ground.
        for contact in jr.robot.contacts() {
            let (fx, fy) = values
                .vector2(&Key::contact_force(contact.id, k))
                .map_or((0.0, 0.0), |force| (force.x, force.y));
            fields.push(fx.to_string());
            fields.push(fy.to_string());
        }
        Ok(fields)
    }

    /// Write the header and every solved step of `trajectory`.
    pub fn write_trajectory<W: Write>(writer: W, jr: &JumpingRobot, trajectory: &Trajectory) -> Result<(), ExportError> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(header(jr))?;
        if let Some(last) = trajectory.last_step() {
            for k in 0..=last {
                csv.write_record(row(jr, trajectory, k)?)?;
            }
        }
        csv.flush()?;
        Ok(())
    }
}

pub mod summary {
    //! Compact JSON description of a finished or aborted run.

    use std::collections::BTreeMap;
    use std::io::Write;

    use jrsim_graph::Key;
    use jrsim_model::{JumpingRobot, SOURCE_ID};
    use jrsim_simulator::Trajectory;
    use serde::Serialize;
    use serde_json::to_writer_pretty;

    use crate::ExportError;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct PhaseSummary {
        pub regime: String,
        pub start_step: usize,
        pub num_steps: usize,
        pub start_time_s: f64,
        pub duration_s: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct ViolationSummary {
        pub step: usize,
        pub variable: String,
        pub value: f64,
        pub lower: f64,
        pub upper: f64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct RunSummary {
        pub collocation: String,
        pub num_steps: usize,
        pub final_time_s: f64,
        pub phases: Vec<PhaseSummary>,
        /// Step at which a run to apex stopped.
        pub apex_step: Option<usize>,
        /// Highest torso height over the run, with the step it occurred at.
        pub apex_height_m: f64,
        pub apex_height_step: usize,
        /// Peak pressure per actuator name, plus `source`.
        pub peak_pressures_pa: BTreeMap<String, f64>,
        pub violations: Vec<ViolationSummary>,
    }

    impl RunSummary {
        pub fn from_trajectory(jr: &JumpingRobot, trajectory: &Trajectory) -> Result<Self, ExportError> {
            let values = &trajectory.values;
            let times = trajectory.times();

            let phases = trajectory
                .phases
                .iter()
                .map(|phase| PhaseSummary {
                    regime: phase.regime.label().to_string(),
                    start_step: phase.start_step,
                    num_steps: phase.num_steps,
                    start_time_s: times.get(phase.start_step).copied().unwrap_or_default(),
                    duration_s: phase.duration(),
                })
                .collect();

            let mut apex_height_m = 0.0;
            let mut apex_height_step = 0;
            let mut peak_pressures_pa = BTreeMap::new();
            if let Some(last) = trajectory.last_step() {
                apex_height_m = f64::NEG_INFINITY;
                for k in 0..=last {
                    let y = values.pose(&Key::pose(jr.robot.base(), k))?.y;
                    if y > apex_height_m {
                        apex_height_m = y;
                        apex_height_step = k;
                    }
                    for actuator in &jr.actuators {
                        let p = values.scalar(&Key::actuator_pressure(actuator.id, k))?;
                        peak(&mut peak_pressures_pa, &actuator.name, p);
                    }
                    peak(&mut peak_pressures_pa, "source", values.scalar(&Key::source_pressure(SOURCE_ID, k))?);
                }
            }

            let violations = trajectory
                .violations
                .iter()
                .map(|violation| ViolationSummary {
                    step: violation.step,
                    variable: violation.key.to_string(),
                    value: violation.value,
                    lower: violation.lower,
                    upper: violation.upper,
                })
                .collect();

            Ok(Self {
                collocation: trajectory.scheme.label().to_string(),
                num_steps: trajectory.num_steps(),
                final_time_s: times.last().copied().unwrap_or_default(),
                phases,
                apex_step: trajectory.apex_step,
                apex_height_m,
                apex_height_step,
                peak_pressures_pa,
                violations,
            })
        }
    }

    fn peak(peaks: &mut BTreeMap<String, f64>, name: &str, value: f64) {
        let entry = peaks.entry(name.to_string()).or_insert(value);
        *entry = entry.max(value);
    }

    pub fn write_summary<W: Write>(writer: W, summary: &RunSummary) -> Result<(), ExportError> {
        to_writer_pretty(writer, summary)?;
        Ok(())
    }
}
