//! Contact regimes, phases, and the transition predicates evaluated on solved steps.

use jrsim_core::planar::Vector2;
use jrsim_dynamics::GroundContact;
use jrsim_graph::{Key, Values, ValuesError};
use jrsim_model::{ContactPoint, JumpingRobot};

/// Dynamics regime of a phase.
#[derive(Debug, Clone, PartialEq)]
pub enum Regime {
    /// Feet pinned to their ground anchors.
    GroundContact(Vec<GroundContact>),
    Flight,
}

impl Regime {
    /// Ground contact with the given contacts, or flight when there are none.
    pub fn from_contacts(contacts: Vec<GroundContact>) -> Self {
        if contacts.is_empty() {
            Regime::Flight
        } else {
            Regime::GroundContact(contacts)
        }
    }

    pub fn contacts(&self) -> &[GroundContact] {
        match self {
            Regime::GroundContact(contacts) => contacts,
            Regime::Flight => &[],
        }
    }

    pub fn is_flight(&self) -> bool {
        matches!(self, Regime::Flight)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Regime::GroundContact(_) => "ground",
            Regime::Flight => "flight",
        }
    }
}

/// A maximal run of intervals sharing one regime.
///
/// The phase covers steps `start_step..=start_step + num_steps`; its last step
/// is the first step of the next phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub regime: Regime,
    pub start_step: usize,
    /// Number of collocation intervals.
    pub num_steps: usize,
    pub dt: f64,
}

impl Phase {
    pub fn end_step(&self) -> usize {
        self.start_step + self.num_steps
    }

    pub fn duration(&self) -> f64 {
        self.num_steps as f64 * self.dt
    }

    /// Whether the interval starting at `k` belongs to this phase.
    pub fn owns_interval(&self, k: usize) -> bool {
        k >= self.start_step && k < self.end_step()
    }
}

/// Index of the phase whose regime governs step `k`.
///
/// A shared boundary step belongs to the later phase; the final step belongs to the last.
pub fn phase_index_at(phases: &[Phase], k: usize) -> Option<usize> {
    phases.iter().rposition(|phase| phase.start_step <= k && k <= phase.end_step())
}

/// Nominal time of every step, accumulated interval by interval.
pub fn step_times(phases: &[Phase]) -> Vec<f64> {
    let mut times = vec![0.0];
    let mut t = 0.0;
    for phase in phases {
        for _ in 0..phase.num_steps {
            t += phase.dt;
            times.push(t);
        }
    }
    times
}

fn contact_state(point: &ContactPoint, values: &Values, k: usize) -> Result<(Vector2<f64>, Vector2<f64>), ValuesError> {
    let pose = values.pose(&Key::pose(point.link, k))?;
    let twist = values.vector3(&Key::twist(point.link, k))?;
    Ok((point.position(&pose), point.velocity(&pose, &twist)))
}

fn ground_anchor(jr: &JumpingRobot, position: Vector2<f64>) -> Vector2<f64> {
    Vector2::new(position.x, jr.contact.ground_height)
}

/// Regime at the start of a run: contacts within tolerance of the ground are pinned.
pub fn initial_regime(jr: &JumpingRobot, values: &Values, k: usize) -> Result<Regime, ValuesError> {
    let mut contacts = Vec::new();
    for point in jr.robot.contacts() {
        let (position, _) = contact_state(point, values, k)?;
        if position.y - jr.contact.ground_height <= jr.contact.tolerance {
            contacts.push(GroundContact {
                contact: point.id,
                anchor: ground_anchor(jr, position),
            });
        }
    }
    Ok(Regime::from_contacts(contacts))
}

/// Regime implied by the solved values at step `k`, or `None` when it does not change.
///
/// Active contacts whose normal force is no longer positive lift off. An
/// inactive contact touches down at its current ground projection when it
/// crosses the ground moving down: clear of the ground by more than the contact
/// tolerance at `k − 1`, at or below it at `k`. A foot that just lifted off
/// sits on the ground and is not caught again until it has cleared it.
pub fn next_regime(jr: &JumpingRobot, current: &Regime, values: &Values, k: usize) -> Result<Option<Regime>, ValuesError> {
    let mut contacts = Vec::new();
    let mut changed = false;
    for active in current.contacts() {
        let force = values.vector2(&Key::contact_force(active.contact, k))?;
        if force.y > 0.0 {
            contacts.push(*active);
        } else {
            changed = true;
        }
    }
    for point in jr.robot.contacts() {
        if k == 0 || current.contacts().iter().any(|active| active.contact == point.id) {
            continue;
        }
        let (previous, _) = contact_state(point, values, k - 1)?;
        let (position, velocity) = contact_state(point, values, k)?;
        let was_clear = previous.y - jr.contact.ground_height > jr.contact.tolerance;
        if was_clear && position.y <= jr.contact.ground_height && velocity.y < 0.0 {
            contacts.push(GroundContact {
                contact: point.id,
                anchor: ground_anchor(jr, position),
            });
            changed = true;
        }
    }
    contacts.sort_by_key(|contact| contact.contact);
    Ok(changed.then(|| Regime::from_contacts(contacts)))
}

/// Apex at step `k`: in flight, the base stopped rising since step `k − 1`.
pub fn is_apex(jr: &JumpingRobot, regime: &Regime, values: &Values, k: usize) -> Result<bool, ValuesError> {
    if !regime.is_flight() || k == 0 {
        return Ok(false);
    }
    let base = jr.robot.base();
    let previous = values.vector3(&Key::twist(base, k - 1))?[2];
    let current = values.vector3(&Key::twist(base, k))?[2];
    Ok(previous > 0.0 && current <= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jrsim_config::JumpingRobotConfig;
    use jrsim_core::planar::Vector3;

    fn robot() -> JumpingRobot {
        JumpingRobot::from_config(&JumpingRobotConfig::default()).expect("robot")
    }

    /// Initial posture raised by `lift`, falling at `vy`, stored at step `k`.
    fn place(jr: &JumpingRobot, values: &mut Values, k: usize, lift: f64, vy: f64) {
        let mut base = jr.initial.base_pose;
        base.y += lift;
        let (poses, twists) = jr.robot.forward_kinematics(
            base,
            Vector3::new(0.0, 0.0, vy),
            &jr.initial.joint_angles,
            &vec![0.0; jr.robot.joints().len()],
        );
        for link in jr.robot.links() {
            values.insert_pose(Key::pose(link.id, k), poses[link.id]);
            values.insert_vector3(Key::twist(link.id, k), twists[link.id]);
        }
    }

    fn phase(start_step: usize, num_steps: usize, regime: Regime) -> Phase {
        Phase {
            regime,
            start_step,
            num_steps,
            dt: 0.01,
        }
    }

    #[test]
    fn boundary_step_belongs_to_the_later_phase() {
        let phases = vec![
            phase(0, 5, Regime::GroundContact(Vec::new())),
            phase(5, 3, Regime::Flight),
        ];
        assert_eq!(phase_index_at(&phases, 4), Some(0));
        assert_eq!(phase_index_at(&phases, 5), Some(1));
        assert_eq!(phase_index_at(&phases, 8), Some(1));
        assert_eq!(phase_index_at(&phases, 9), None);
        assert!(phases[0].owns_interval(4));
        assert!(!phases[0].owns_interval(5));
    }

    #[test]
    fn step_times_cover_every_interval() {
        let phases = vec![phase(0, 2, Regime::Flight), phase(2, 3, Regime::Flight)];
        let times = step_times(&phases);
        assert_eq!(times.len(), 6);
        assert!((times[5] - 0.05).abs() < 1e-15);
    }

    #[test]
    fn regime_without_contacts_is_flight() {
        assert_eq!(Regime::from_contacts(Vec::new()), Regime::Flight);
        assert!(Regime::Flight.contacts().is_empty());
        assert_eq!(Regime::Flight.label(), "flight");
    }

    #[test]
    fn foot_crossing_the_ground_touches_down() {
        let jr = robot();
        let mut values = Values::new();
        place(&jr, &mut values, 0, 0.01, -1.0);
        place(&jr, &mut values, 1, -0.001, -1.0);

        let regime = next_regime(&jr, &Regime::Flight, &values, 1)
            .expect("values")
            .expect("touch-down");
        assert_eq!(regime.contacts().len(), 2);
        for contact in regime.contacts() {
            assert_eq!(contact.anchor.y, jr.contact.ground_height);
        }
    }

    #[test]
    fn released_foot_resting_on_the_ground_is_not_caught_again() {
        let jr = robot();
        let mut values = Values::new();
        place(&jr, &mut values, 0, 0.0, -1e-3);
        place(&jr, &mut values, 1, -1e-9, -1e-3);
        assert_eq!(next_regime(&jr, &Regime::Flight, &values, 1).expect("values"), None);

        // Once clear of the ground the foot is caught on the way back down.
        place(&jr, &mut values, 2, 0.002, -1e-3);
        place(&jr, &mut values, 3, -1e-9, -1e-3);
        assert!(next_regime(&jr, &Regime::Flight, &values, 3).expect("values").is_some());
    }

    #[test]
    fn contacts_lift_off_one_at_a_time() {
        let jr = robot();
        let mut values = Values::new();
        place(&jr, &mut values, 0, 0.0, 0.0);
        place(&jr, &mut values, 1, 0.0, 0.0);
        let ground = initial_regime(&jr, &values, 0).expect("values");
        assert_eq!(ground.contacts().len(), 2);

        values.insert_vector2(Key::contact_force(0, 1), Vector2::new(0.0, 3.0));
        values.insert_vector2(Key::contact_force(1, 1), Vector2::new(0.0, -0.5));
        let one = next_regime(&jr, &ground, &values, 1).expect("values").expect("release");
        assert_eq!(one.contacts().len(), 1);
        assert_eq!(one.contacts()[0].contact, 0);

        values.insert_vector2(Key::contact_force(0, 2), Vector2::new(0.0, 0.0));
        place(&jr, &mut values, 2, 0.0, 0.0);
        let none = next_regime(&jr, &one, &values, 2).expect("values").expect("release");
        assert!(none.is_flight());
    }
}
