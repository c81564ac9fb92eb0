//! Whole-robot graphs: one step, one collocation interval, or a full trajectory.

use jrsim_dynamics::{ActuationGraphBuilder, RobotGraphBuilder};
use jrsim_graph::{FactorGraph, Key, PriorFactor, Values, ValuesError, VarKind};
use jrsim_model::{Controls, JumpingRobot, ModelError, SOURCE_ID, ValveState};

use crate::collocation::{CollocationFactor, CollocationScheme, DerivativeTerm, StepDuration};
use crate::phase::{Phase, Regime, phase_index_at, step_times};

/// Noise scales of collocation factors and of the priors that pin collocated state.
#[derive(Debug, Clone, PartialEq)]
pub struct CollocationParams {
    pub state_sigma: f64,
    pub mass_sigma: f64,
    pub time_sigma: f64,
}

impl Default for CollocationParams {
    fn default() -> Self {
        Self {
            state_sigma: 1e-4,
            mass_sigma: 1e-7,
            time_sigma: 1e-6,
        }
    }
}

/// Composes the mechanical and pneumatic graphs of the jumping robot.
///
/// The two halves meet at the joint torque keys: actuation produces them and
/// the Newton–Euler factors consume them.
#[derive(Debug, Clone, Default)]
pub struct JRGraphBuilder {
    robot: RobotGraphBuilder,
    actuation: ActuationGraphBuilder,
    collocation: CollocationParams,
}

impl JRGraphBuilder {
    pub fn new(robot: RobotGraphBuilder, actuation: ActuationGraphBuilder, collocation: CollocationParams) -> Self {
        Self {
            robot,
            actuation,
            collocation,
        }
    }

    /// Default noise scales with the contact stabilization of `jr`.
    pub fn for_robot(jr: &JumpingRobot) -> Self {
        Self {
            robot: RobotGraphBuilder::for_contact_model(&jr.contact),
            ..Self::default()
        }
    }

    pub fn robot_graph_builder(&self) -> &RobotGraphBuilder {
        &self.robot
    }

    pub fn actuation_graph_builder(&self) -> &ActuationGraphBuilder {
        &self.actuation
    }

    pub fn collocation_params(&self) -> &CollocationParams {
        &self.collocation
    }

    /// Valve state of every actuator at time `t`, indexed by actuator id.
    pub fn valve_states(jr: &JumpingRobot, controls: &Controls, t: f64) -> Vec<ValveState> {
        jr.actuators
            .iter()
            .map(|actuator| controls.valve_state(actuator.id, t))
            .collect()
    }

    /// Mechanics and actuation of step `k` at nominal time `t`, sharing torque keys.
    ///
    /// Joints without an actuator carry a zero-torque prior.
    pub fn step_graph(
        &self,
        jr: &JumpingRobot,
        controls: &Controls,
        regime: &Regime,
        k: usize,
        t: f64,
    ) -> Result<FactorGraph, ModelError> {
        let valves = Self::valve_states(jr, controls, t);
        let mut graph = self.robot.dynamics_graph(&jr.robot, regime.contacts(), k);
        graph.append(self.actuation.dynamics_graph(jr, &valves, k)?);
        graph.append(self.passive_torque_priors(jr, k));
        Ok(graph)
    }

    pub fn passive_torque_priors(&self, jr: &JumpingRobot, k: usize) -> FactorGraph {
        let sigma = self.robot.params().prior_sigma;
        let mut graph = FactorGraph::new();
        for joint in jr.robot.joints() {
            if jr.actuator_for_joint(joint.id).is_none() {
                graph.add(PriorFactor::scalar(Key::torque(joint.id, k), 0.0, sigma));
            }
        }
        graph
    }

    /// Collocation factors of the interval `k → k+1`.
    pub fn collocation_graph(&self, jr: &JumpingRobot, k: usize, duration: StepDuration, scheme: CollocationScheme) -> FactorGraph {
        let p = &self.collocation;
        let next = k + 1;
        let mut graph = FactorGraph::new();
        let mut add = |start: Key, end: Key, terms: &[DerivativeTerm], sigma: f64| {
            graph.add(CollocationFactor::new(start, end, terms, scheme, duration, sigma));
        };

        let base = jr.robot.base();
        add(
            Key::pose(base, k),
            Key::pose(base, next),
            &[DerivativeTerm::new(Key::twist(base, k), Key::twist(base, next))],
            p.state_sigma,
        );
        add(
            Key::twist(base, k),
            Key::twist(base, next),
            &[DerivativeTerm::new(Key::twist_accel(base, k), Key::twist_accel(base, next))],
            p.state_sigma,
        );
        for joint in jr.robot.joints() {
            let j = joint.id;
            add(
                Key::joint_angle(j, k),
                Key::joint_angle(j, next),
                &[DerivativeTerm::new(Key::joint_vel(j, k), Key::joint_vel(j, next))],
                p.state_sigma,
            );
            add(
                Key::joint_vel(j, k),
                Key::joint_vel(j, next),
                &[DerivativeTerm::new(Key::joint_accel(j, k), Key::joint_accel(j, next))],
                p.state_sigma,
            );
        }

        let mut drains = Vec::with_capacity(jr.actuators.len());
        for actuator in &jr.actuators {
            let a = actuator.id;
            let flow = DerivativeTerm::new(Key::mass_flow(a, k), Key::mass_flow(a, next));
            add(
                Key::actuator_mass(a, k),
                Key::actuator_mass(a, next),
                &[flow],
                p.mass_sigma,
            );
            drains.push(DerivativeTerm::weighted(flow.start, flow.end, -1.0));
        }
        add(
            Key::source_mass(SOURCE_ID, k),
            Key::source_mass(SOURCE_ID, next),
            &drains,
            p.mass_sigma,
        );

        graph.add(CollocationFactor::time(k, scheme, duration, p.time_sigma));
        graph
    }

    /// Every step graph of the phases plus the collocation intervals inside each phase.
    ///
    /// With `solve_durations`, intervals of phase `p` share the unknown
    /// `Key::phase_duration(p)` instead of the phase's fixed `dt`.
    pub fn trajectory_graph(
        &self,
        jr: &JumpingRobot,
        phases: &[Phase],
        controls: &Controls,
        scheme: CollocationScheme,
        solve_durations: bool,
    ) -> Result<FactorGraph, ModelError> {
        jr.check_controls(controls)?;
        let times = step_times(phases);
        let mut graph = FactorGraph::new();
        for (k, t) in times.iter().enumerate() {
            if let Some(index) = phase_index_at(phases, k) {
                graph.append(self.step_graph(jr, controls, &phases[index].regime, k, *t)?);
            }
        }
        for (index, phase) in phases.iter().enumerate() {
            let duration = if solve_durations {
                StepDuration::Variable(Key::phase_duration(index))
            } else {
                StepDuration::Fixed(phase.dt)
            };
            for k in phase.start_step..phase.end_step() {
                graph.append(self.collocation_graph(jr, k, duration, scheme));
            }
        }
        Ok(graph)
    }

    /// Pins every valve's open and close time.
    pub fn control_priors(&self, jr: &JumpingRobot, controls: &Controls) -> FactorGraph {
        let mut graph = FactorGraph::new();
        for actuator in &jr.actuators {
            graph.append(self.control_priors_actuator(actuator.id, controls));
        }
        graph
    }

    /// Pins the open and close time of one valve; an actuator without a timing stays closed.
    pub fn control_priors_actuator(&self, actuator: usize, controls: &Controls) -> FactorGraph {
        let (open, close) = controls
            .timing(actuator)
            .map(|timing| (timing.open, timing.close))
            .unwrap_or((0.0, 0.0));
        let sigma = self.collocation.time_sigma;
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::scalar(Key::valve_open_time(actuator), open, sigma));
        graph.add(PriorFactor::scalar(Key::valve_close_time(actuator), close, sigma));
        graph
    }

    /// Pins `t₀ = 0`.
    pub fn time_prior(&self) -> FactorGraph {
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::scalar(Key::time(0), 0.0, self.collocation.time_sigma));
        graph
    }

    /// Pins the step length of every phase to its nominal value.
    pub fn phase_duration_priors(&self, phases: &[Phase]) -> FactorGraph {
        let mut graph = FactorGraph::new();
        for (index, phase) in phases.iter().enumerate() {
            graph.add(PriorFactor::scalar(
                Key::phase_duration(index),
                phase.dt,
                self.collocation.time_sigma,
            ));
        }
        graph
    }

    /// Collocated state of step `k`: the keys an interval starting at `k` carries forward.
    pub fn collocated_state_keys(&self, jr: &JumpingRobot, k: usize) -> Vec<Key> {
        let base = jr.robot.base();
        let mut keys = vec![Key::pose(base, k), Key::twist(base, k)];
        for joint in jr.robot.joints() {
            keys.push(Key::joint_angle(joint.id, k));
            keys.push(Key::joint_vel(joint.id, k));
        }
        keys.extend(jr.actuators.iter().map(|actuator| Key::actuator_mass(actuator.id, k)));
        keys.push(Key::source_mass(SOURCE_ID, k));
        keys
    }

    /// Priors on `keys` at their stored values, scaled by variable kind.
    pub fn state_priors<'a>(&self, values: &Values, keys: impl IntoIterator<Item = &'a Key>) -> Result<FactorGraph, ValuesError> {
        let mut graph = FactorGraph::new();
        for key in keys {
            let value = values.try_get(key)?.clone();
            graph.add(PriorFactor::new(*key, value, self.prior_sigma(key.kind)));
        }
        Ok(graph)
    }

    /// Pins the step-0 state: base pose and twist, joint angles and velocities, and gas masses.
    pub fn initial_state_priors(&self, jr: &JumpingRobot, values: &Values) -> Result<FactorGraph, ValuesError> {
        self.state_priors(values, &self.collocated_state_keys(jr, 0))
    }

    fn prior_sigma(&self, kind: VarKind) -> f64 {
        match kind {
            VarKind::ActuatorMass | VarKind::SourceMass => self.collocation.mass_sigma,
            VarKind::Time | VarKind::PhaseDuration | VarKind::ValveOpenTime | VarKind::ValveCloseTime => {
                self.collocation.time_sigma
            }
            _ => self.collocation.state_sigma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jrsim_config::JumpingRobotConfig;

    fn robot() -> JumpingRobot {
        JumpingRobot::from_config(&JumpingRobotConfig::default()).expect("robot")
    }

    fn ground(jr: &JumpingRobot) -> Regime {
        Regime::from_contacts(
            jr.robot
                .contacts()
                .iter()
                .map(|contact| jrsim_dynamics::GroundContact {
                    contact: contact.id,
                    anchor: nalgebra::Vector2::zeros(),
                })
                .collect(),
        )
    }

    #[test]
    fn step_graph_flow_factor_follows_the_valve_window() {
        let jr = robot();
        let builder = JRGraphBuilder::for_robot(&jr);
        let controls = Controls::new(&[0.01; 4], &[0.02; 4]).expect("controls");
        let flow_priors = |t: f64| {
            builder
                .step_graph(&jr, &controls, &Regime::Flight, 0, t)
                .expect("one valve per actuator")
                .iter()
                .filter(|factor| factor.prior().is_some_and(|(key, _)| key.kind == VarKind::MassFlow))
                .count()
        };
        assert_eq!(flow_priors(0.005), 4);
        assert_eq!(flow_priors(0.015), 0);
        assert_eq!(flow_priors(0.02), 4);
    }

    #[test]
    fn collocation_never_mixes_steps_beyond_the_interval() {
        let jr = robot();
        let builder = JRGraphBuilder::default();
        let graph = builder.collocation_graph(&jr, 3, StepDuration::Fixed(0.01), CollocationScheme::Trapezoidal);
        assert!(graph.keys().iter().all(|key| key.step == 3 || key.step == 4));
        // base pose, base twist, two per joint, one per chamber, source, clock
        assert_eq!(graph.len(), 2 + 2 * 4 + 4 + 1 + 1);
    }

    #[test]
    fn trajectory_graph_with_initial_and_control_priors_is_square() {
        let jr = robot();
        let builder = JRGraphBuilder::for_robot(&jr);
        let controls = Controls::new(&[0.0; 4], &[0.02; 4]).expect("controls");
        let phases = vec![
            Phase {
                regime: ground(&jr),
                start_step: 0,
                num_steps: 3,
                dt: 0.01,
            },
            Phase {
                regime: Regime::Flight,
                start_step: 3,
                num_steps: 2,
                dt: 0.01,
            },
        ];
        let values = crate::jr_values::init_config_values(&jr);
        for scheme in [CollocationScheme::Euler, CollocationScheme::Trapezoidal] {
            let mut graph = builder
                .trajectory_graph(&jr, &phases, &controls, scheme, false)
                .expect("controls");
            graph.append(builder.initial_state_priors(&jr, &values).expect("initial"));
            graph.append(builder.time_prior());
            graph.append(builder.control_priors(&jr, &controls));
            let report = graph.check_structure().expect("square");
            assert_eq!(report.redundancy(), 0);
        }
    }

    #[test]
    fn solved_durations_add_one_unknown_per_phase() {
        let jr = robot();
        let builder = JRGraphBuilder::default();
        let controls = Controls::closed(4);
        let phases = vec![Phase {
            regime: Regime::Flight,
            start_step: 0,
            num_steps: 2,
            dt: 0.01,
        }];
        let graph = builder
            .trajectory_graph(&jr, &phases, &controls, CollocationScheme::Euler, true)
            .expect("controls");
        assert!(graph.keys().contains(&Key::phase_duration(0)));
        assert!(!graph.keys().contains(&Key::phase_duration(1)));
    }

    #[test]
    fn trajectory_graph_rejects_a_short_schedule() {
        let jr = robot();
        let builder = JRGraphBuilder::default();
        let phases = vec![Phase {
            regime: Regime::Flight,
            start_step: 0,
            num_steps: 1,
            dt: 0.01,
        }];
        let err = builder
            .trajectory_graph(&jr, &phases, &Controls::closed(2), CollocationScheme::Euler, false)
            .expect_err("two timings for four actuators");
        assert_eq!(err, ModelError::ControlCount { expected: 4, actual: 2 });
    }
}
