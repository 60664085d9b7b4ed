//! Blocking action sequences.
//!
//! A sequence is a list of `(command, hold)` steps played synchronously on
//! the ticking thread.  While it runs the owning machine does not see fresher
//! sensor data; only one machine is ever active, so nothing else competes for
//! the wheels in that window.
//!
//! Holding goes through a [`Pacer`] so tests can record holds instead of
//! sleeping.

use std::time::Duration;

use puckbot_types::WheelCommand;
use rand::Rng;
use tracing::debug;

use crate::governor::OutputGovernor;

pub const GET_FREE_STEPS: usize = 3;
pub const GET_FREE_HOLD: Duration = Duration::from_millis(500);
pub const REVERSE_SPEED: f32 = -0.8;
pub const REVERSE_HOLD: Duration = Duration::from_millis(3000);
pub const TURN_SPEED: f32 = 0.5;
pub const TURN_HOLD: Duration = Duration::from_millis(3000);

/// Blocks the calling thread for a step's hold time.
pub trait Pacer: Send + Sync {
    fn hold(&self, duration: Duration);
}

/// Real-time pacer backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn hold(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionStep {
    pub command: WheelCommand,
    pub hold: Duration,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionSequence {
    name: &'static str,
    steps: Vec<ActionStep>,
}

impl ActionSequence {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    pub fn then(mut self, command: WheelCommand, hold: Duration) -> Self {
        self.steps.push(ActionStep { command, hold });
        self
    }

    /// Recovery: three full-power pulses, each wheel's sign drawn
    /// independently.
    pub fn get_free<R: Rng + ?Sized>(rng: &mut R) -> Self {
        (0..GET_FREE_STEPS).fold(Self::new("get_free"), |seq, _| {
            let left = random_sign(rng);
            let right = random_sign(rng);
            seq.then(WheelCommand::new(left, right), GET_FREE_HOLD)
        })
    }

    /// Full-power pulse, then a strictly decreasing ramp down to the floor
    /// speed, then stop.
    pub fn rearm_ramp() -> Self {
        const RAMP: [f32; 5] = [0.8, 0.65, 0.5, 0.35, 0.2];
        let step = Duration::from_millis(100);
        RAMP.iter()
            .fold(
                Self::new("rearm").then(WheelCommand::both(1.0), Duration::from_millis(300)),
                |seq, &speed| seq.then(WheelCommand::both(speed), step),
            )
            .then(WheelCommand::ZERO, Duration::ZERO)
    }

    /// Back away, then spin in place in a random direction.  Used both to
    /// dismount the puck and to flee a peer.
    pub fn reverse_and_turn<R: Rng + ?Sized>(name: &'static str, rng: &mut R) -> Self {
        let s = random_sign(rng);
        Self::new(name)
            .then(WheelCommand::both(REVERSE_SPEED), REVERSE_HOLD)
            .then(WheelCommand::new(s * TURN_SPEED, -s * TURN_SPEED), TURN_HOLD)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn steps(&self) -> &[ActionStep] {
        &self.steps
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.hold).sum()
    }

    /// Play every step through `governor`, holding each with `pacer`.
    pub fn run(&self, governor: &OutputGovernor, pacer: &dyn Pacer) {
        debug!(sequence = self.name, steps = self.steps.len(), "running action sequence");
        for step in &self.steps {
            governor.dispatch(step.command);
            if !step.hold.is_zero() {
                pacer.hold(step.hold);
            }
        }
    }
}

fn random_sign<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    if rng.random_bool(0.5) { 1.0 } else { -1.0 }
}

/// Records holds instead of sleeping.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingPacer {
    holds: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingPacer {
    pub(crate) fn holds(&self) -> Vec<Duration> {
        self.holds.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Pacer for RecordingPacer {
    fn hold(&self, duration: Duration) {
        self.holds.lock().unwrap().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::WheelBias;
    use puckbot_hal::SimRig;
    use puckbot_perception::ScalarCell;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn get_free_is_three_full_power_pulses() {
        let mut rng = StdRng::seed_from_u64(7);
        let seq = ActionSequence::get_free(&mut rng);
        assert_eq!(seq.steps().len(), 3);
        for step in seq.steps() {
            assert_eq!(step.command.left.abs(), 1.0);
            assert_eq!(step.command.right.abs(), 1.0);
            assert_eq!(step.hold, GET_FREE_HOLD);
        }
    }

    #[test]
    fn rearm_ramp_strictly_decreases_to_floor() {
        let seq = ActionSequence::rearm_ramp();
        let speeds: Vec<f32> = seq.steps().iter().map(|s| s.command.left).collect();
        assert_eq!(speeds, vec![1.0, 0.8, 0.65, 0.5, 0.35, 0.2, 0.0]);
        assert!(speeds[..6].windows(2).all(|w| w[0] > w[1]));
        assert_eq!(seq.total_duration(), Duration::from_millis(800));
    }

    #[test]
    fn reverse_and_turn_spins_in_place() {
        let mut rng = StdRng::seed_from_u64(1);
        let seq = ActionSequence::reverse_and_turn("dismount", &mut rng);
        let steps = seq.steps();
        assert_eq!(steps[0].command, WheelCommand::both(-0.8));
        assert_eq!(steps[1].command.left, -steps[1].command.right);
        assert_eq!(steps[1].command.left.abs(), 0.5);
        assert_eq!(seq.total_duration(), Duration::from_millis(6000));
    }

    #[test]
    fn run_dispatches_every_step_and_holds() {
        let rig = SimRig::new();
        let governor = OutputGovernor::new("test", rig.actuator(), ScalarCell::new(), 3.3, WheelBias::new());
        let pacer = RecordingPacer::default();

        ActionSequence::rearm_ramp().run(&governor, &pacer);

        let history = rig.wheels.lock().unwrap().history().to_vec();
        assert_eq!(history.len(), 7);
        assert_eq!(history.last(), Some(&WheelCommand::ZERO));
        // The trailing stop is not held.
        assert_eq!(pacer.holds().len(), 6);
    }
}
