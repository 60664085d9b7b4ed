//! Plumbing shared by the behavior machines.
//!
//! [`Wiring`] holds the process-wide handles (sensor hub, output sinks,
//! shared cells).  [`Wiring::parts`] turns it into one machine's private
//! [`MachineParts`]: its own stuck detector, stall evaluator, governor and
//! target cell.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError};

use puckbot_hal::{SharedActuator, SharedIndicator, SharedTransponder};
use puckbot_kernel::{EvaluatorScheduler, StallEvaluator, StuckDetector};
use puckbot_perception::{SensorCell, SensorHub};
use puckbot_types::{Face, SafetyEvent, StateCode, TargetObservation, WheelCommand};
use rand::Rng;
use rand::rngs::StdRng;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::config::{RobotConfig, SearchConfig};
use crate::governor::{OutputGovernor, WheelBias};
use crate::sequence::{ActionSequence, Pacer, ThreadPacer};

// ────────────────────────────────────────────────────────────────────────────
// StateCell
// ────────────────────────────────────────────────────────────────────────────

/// State code of whichever machine last transitioned.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new(initial: Face) -> Self {
        Self(Arc::new(AtomicU8::new(initial.code())))
    }

    pub fn set(&self, code: StateCode) {
        self.0.store(code, Ordering::Relaxed);
    }

    pub fn get(&self) -> StateCode {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(Face::ChargingSearching)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SearchWander
// ────────────────────────────────────────────────────────────────────────────

/// Random exploration that holds each wheel pair for a number of ticks so
/// the camera is not jerked around between frames.
#[derive(Debug, Clone)]
pub struct SearchWander {
    hold_ticks: u32,
    max_speed: f32,
    remaining: u32,
    current: WheelCommand,
}

impl SearchWander {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            hold_ticks: config.hold_ticks.max(1),
            max_speed: config.max_speed.max(0.0),
            remaining: 0,
            current: WheelCommand::ZERO,
        }
    }

    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> WheelCommand {
        if self.remaining == 0 {
            self.current = WheelCommand::new(self.roll(rng), self.roll(rng));
            self.remaining = self.hold_ticks;
        }
        self.remaining -= 1;
        self.current
    }

    /// Re-roll on the next call.
    pub fn reset(&mut self) {
        self.remaining = 0;
    }

    fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let sign = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        sign * rng.random_range(0.0..=self.max_speed)
    }
}

/// Proportional bearing correction around a forward bias.  The correction
/// subtracts on the left wheel and adds on the right.
pub fn approach_command(bearing_error: f32, gain: f32, static_speed: f32) -> WheelCommand {
    WheelCommand::new(
        -(bearing_error * gain) + static_speed,
        bearing_error * gain + static_speed,
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Wiring
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Wiring {
    pub handle: Handle,
    pub hub: Arc<SensorHub>,
    pub actuator: SharedActuator,
    pub indicator: SharedIndicator,
    pub transponder: SharedTransponder,
    pub bias: WheelBias,
    pub output: SensorCell<WheelCommand>,
    pub state: StateCell,
    pub pacer: Arc<dyn Pacer>,
    pub events: Option<UnboundedSender<SafetyEvent>>,
}

impl Wiring {
    pub fn new(
        handle: Handle,
        hub: Arc<SensorHub>,
        actuator: SharedActuator,
        indicator: SharedIndicator,
        transponder: SharedTransponder,
    ) -> Self {
        Self {
            handle,
            hub,
            actuator,
            indicator,
            transponder,
            bias: WheelBias::new(),
            output: SensorCell::default(),
            state: StateCell::default(),
            pacer: Arc::new(ThreadPacer),
            events: None,
        }
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<SafetyEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the private parts of the machine called `name`.
    pub fn parts(&self, name: &'static str, config: &RobotConfig, rng: StdRng) -> MachineParts {
        let mut detector = StuckDetector::new(name, self.handle.clone(), config.stall_thresholds());
        if let Some(events) = &self.events {
            detector = detector.with_events(events.clone());
        }
        let detector = Arc::new(detector);

        let evaluator = Arc::new(StallEvaluator::new(
            config.stall_model(),
            Arc::clone(&detector),
            self.hub.wheel_cell(),
            self.hub.battery_cell(),
        ));
        let scheduler = Arc::new(EvaluatorScheduler::new(
            self.handle.clone(),
            config.stall_delay(),
            evaluator,
        ));
        let governor = OutputGovernor::new(
            name,
            self.actuator.clone(),
            self.hub.battery_cell(),
            config.governor.v_nominal,
            self.bias.clone(),
        )
        .with_evaluations(scheduler)
        .with_output_cell(self.output.clone());

        MachineParts {
            name,
            governor,
            detector,
            indicator: self.indicator.clone(),
            transponder: self.transponder.clone(),
            target: SensorCell::new(TargetObservation::lost()),
            hub: Arc::clone(&self.hub),
            state: self.state.clone(),
            pacer: Arc::clone(&self.pacer),
            rng,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MachineParts
// ────────────────────────────────────────────────────────────────────────────

pub struct MachineParts {
    pub name: &'static str,
    pub governor: OutputGovernor,
    pub detector: Arc<StuckDetector>,
    pub indicator: SharedIndicator,
    pub transponder: SharedTransponder,
    /// Latest observation of this machine's target class.
    pub target: SensorCell<TargetObservation>,
    pub hub: Arc<SensorHub>,
    pub state: StateCell,
    pub pacer: Arc<dyn Pacer>,
    pub rng: StdRng,
}

impl MachineParts {
    /// Show `face` and publish its state code.
    pub fn show(&self, face: Face) {
        self.state.set(face.code());
        let result = self
            .indicator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_face(face);
        if let Err(e) = result {
            warn!(machine = self.name, error = %e, "status indicator unavailable");
        }
    }

    pub fn drive(&self, command: WheelCommand) -> WheelCommand {
        self.governor.dispatch(command)
    }

    pub fn hold_still(&self) {
        self.governor.dispatch(WheelCommand::ZERO);
    }

    /// Run `sequence` to completion on this thread.
    pub fn play(&self, sequence: &ActionSequence) {
        sequence.run(&self.governor, self.pacer.as_ref());
    }

    /// Get-free pulses, then drop the stuck latches.
    pub fn recover(&mut self) {
        let sequence = ActionSequence::get_free(&mut self.rng);
        self.play(&sequence);
        self.detector.clear_stuck_latch();
    }

    pub fn rearm(&self) {
        self.play(&ActionSequence::rearm_ramp());
    }

    pub fn transponder_on(&self, payload: &str) {
        let result = self
            .transponder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .turn_on(payload);
        if let Err(e) = result {
            warn!(machine = self.name, error = %e, "transponder unavailable");
        }
    }

    pub fn transponder_off(&self) {
        let result = self
            .transponder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .turn_off();
        if let Err(e) = result {
            warn!(machine = self.name, error = %e, "transponder unavailable");
        }
    }

    /// Zero output, no pending evaluations, no armed deadline.
    pub fn halt(&self) {
        self.governor.halt();
        self.detector.cancel_timer();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::sequence::RecordingPacer;
    use puckbot_hal::SimRig;

    pub(crate) struct Bench {
        pub rig: SimRig,
        pub hub: Arc<SensorHub>,
        pub pacer: Arc<RecordingPacer>,
        pub wiring: Wiring,
    }

    /// Sim rig, unsmoothed hub and a recording pacer on the current runtime.
    pub(crate) fn bench() -> Bench {
        let rig = SimRig::new();
        let hub = Arc::new(SensorHub::with_alphas(1.0, 1.0));
        let pacer = Arc::new(RecordingPacer::default());
        let wiring = Wiring::new(
            Handle::current(),
            Arc::clone(&hub),
            rig.actuator(),
            rig.indicator(),
            rig.transponder(),
        )
        .with_pacer(pacer.clone());
        Bench {
            rig,
            hub,
            pacer,
            wiring,
        }
    }
}
