//! [`Supervisor`] – picks which machine owns the wheels.
//!
//! The supervisor builds both machines from one [`Wiring`], registers them
//! with a [`ControllerComposer`] and, once per perception frame:
//!
//! 1. drains pending [`SafetyEvent`]s;
//! 2. updates the [`Mode`] from the slow battery trend (with hysteresis);
//! 3. stops the inactive machine if it is running;
//! 4. publishes the frame's target to the active machine and starts it if
//!    it is not running yet.
//!
//! # Shutdown
//!
//! A [`SafetyPayload::StallShutdown`] from either stuck detector removes
//! both machines from the composer and stops them, which zeroes the output.
//! Frames are ignored until [`Supervisor::restore`] resets the detectors and
//! re-registers the machines.

use std::sync::Arc;

use puckbot_kernel::StuckDetector;
use puckbot_perception::{SensorCell, SensorHub, TargetSelector};
use puckbot_types::{
    Detection, Mode, PuckError, SafetyEvent, SafetyPayload, StateCode, TargetObservation,
    WheelCommand,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};

use crate::charging::ChargingMachine;
use crate::composer::ControllerComposer;
use crate::config::{RobotConfig, SelectorConfig};
use crate::governor::WheelBias;
use crate::machine::{StateCell, Wiring};
use crate::mating::MatingMachine;
use crate::periodic::{Controller, PeriodicTask};
use crate::usage::UsageRecorder;

pub struct Supervisor {
    config: RobotConfig,
    selector: TargetSelector,
    hub: Arc<SensorHub>,
    bias: WheelBias,
    state: StateCell,
    output: SensorCell<WheelCommand>,
    composer: ControllerComposer,
    charging: Arc<PeriodicTask<ChargingMachine>>,
    mating: Arc<PeriodicTask<MatingMachine>>,
    charging_target: SensorCell<TargetObservation>,
    mating_target: SensorCell<TargetObservation>,
    detectors: [Arc<StuckDetector>; 2],
    events: UnboundedReceiver<SafetyEvent>,
    mode: Mode,
    shut_down: bool,
}

impl Supervisor {
    /// Validate `config`, build both machines on `wiring` and register them.
    /// Nothing runs until the first frame arrives.
    ///
    /// # Errors
    ///
    /// Returns [`PuckError::Config`] if `config` fails validation.
    pub fn new(config: &RobotConfig, wiring: Wiring) -> Result<Self, PuckError> {
        config.validate()?;

        let (tx, events) = mpsc::unbounded_channel();
        let wiring = wiring.with_events(tx);
        wiring.bias.set(config.governor.wheel_bias);

        let seed = config.control.seed.unwrap_or_else(rand::random);
        info!(seed, "machine rng seeded");

        let charging_parts = wiring.parts(ChargingMachine::NAME, config, StdRng::seed_from_u64(seed));
        let mating_parts = wiring.parts(
            MatingMachine::NAME,
            config,
            StdRng::seed_from_u64(seed.wrapping_add(1)),
        );
        let charging_target = charging_parts.target.clone();
        let mating_target = mating_parts.target.clone();
        let detectors = [
            Arc::clone(&charging_parts.detector),
            Arc::clone(&mating_parts.detector),
        ];

        let charging = Arc::new(PeriodicTask::new(
            ChargingMachine::new(charging_parts, config.charging.clone()),
            config.timestep(),
            wiring.handle.clone(),
        ));
        let mating = Arc::new(PeriodicTask::new(
            MatingMachine::new(mating_parts, config.mating.clone()),
            config.timestep(),
            wiring.handle.clone(),
        ));

        let composer = ControllerComposer::new();
        composer.add(charging.clone());
        composer.add(mating.clone());

        Ok(Self {
            config: config.clone(),
            selector: config.target_selector(),
            hub: wiring.hub,
            bias: wiring.bias,
            state: wiring.state,
            output: wiring.output,
            composer,
            charging,
            mating,
            charging_target,
            mating_target,
            detectors,
            events,
            mode: Mode::Charging,
            shut_down: false,
        })
    }

    // ── frame handling ───────────────────────────────────────────────────

    /// Process one perception frame.
    pub fn on_frame(&mut self, detections: &[Detection]) {
        self.poll_events();
        if self.shut_down {
            debug!("shut down, frame ignored");
            return;
        }

        let targets = self.selector.select(detections);
        self.update_mode();

        let (active, inactive, target, cell) = match self.mode {
            Mode::Charging => (
                ChargingMachine::NAME,
                MatingMachine::NAME,
                targets.puck,
                &self.charging_target,
            ),
            Mode::Mating => (
                MatingMachine::NAME,
                ChargingMachine::NAME,
                targets.peer,
                &self.mating_target,
            ),
        };

        if let Some(inactive) = self.composer.get(inactive) {
            if inactive.is_running() {
                inactive.stop();
            }
        }
        cell.publish(target);
        if let Some(active) = self.composer.get(active) {
            if !active.is_running() {
                active.start();
            }
        }
    }

    /// Apply the battery hysteresis.  Keeps the current mode while no
    /// battery sample has arrived.
    pub fn update_mode(&mut self) -> Mode {
        let Some(trend) = self.hub.battery_trend() else {
            return self.mode;
        };
        let thresholds = &self.config.selector;
        let next = match self.mode {
            Mode::Mating if trend < thresholds.min_mating_voltage => Mode::Charging,
            Mode::Charging if trend > thresholds.max_charging_voltage => Mode::Mating,
            current => current,
        };
        if next != self.mode {
            info!(from = ?self.mode, to = ?next, trend, "mode switch");
            self.mode = next;
        }
        self.mode
    }

    // ── safety ───────────────────────────────────────────────────────────

    /// Drain every event queued by the stuck detectors and deadline timers.
    pub fn poll_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_safety_event(&event);
        }
    }

    pub fn handle_safety_event(&mut self, event: &SafetyEvent) {
        match &event.payload {
            SafetyPayload::StallShutdown { side, stall_ticks } => {
                error!(
                    machine = %event.source,
                    ?side,
                    stall_ticks,
                    "stall shutdown requested"
                );
                self.shutdown();
            }
            SafetyPayload::WatchdogExpired { timeout_ms } => {
                debug!(machine = %event.source, timeout_ms, "watchdog expiry reported");
            }
        }
    }

    /// Remove and stop both machines.  Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        for name in [ChargingMachine::NAME, MatingMachine::NAME] {
            if let Some(controller) = self.composer.remove(name) {
                controller.stop();
            }
        }
        self.shut_down = true;
        warn!("all machines stopped until restore");
    }

    /// Reset both detectors and put the machines back under control.  The
    /// next frame starts the active machine from its initial state.
    pub fn restore(&mut self) {
        for detector in &self.detectors {
            detector.restore();
        }
        // Anything queued before the reset belongs to the old episode.
        while self.events.try_recv().is_ok() {}

        self.composer.add(self.charging.clone());
        self.composer.add(self.mating.clone());
        self.shut_down = false;
        info!("supervisor restored");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    // ── operator controls ────────────────────────────────────────────────

    /// Positive boosts the left wheel, negative the right.
    pub fn set_wheel_bias(&self, bias: f32) {
        self.bias.set(bias);
    }

    /// Replace the hysteresis voltages.
    ///
    /// # Errors
    ///
    /// Returns [`PuckError::Config`] if `min_mating` exceeds `max_charging`.
    pub fn set_mode_thresholds(&mut self, min_mating: f64, max_charging: f64) -> Result<(), PuckError> {
        if min_mating > max_charging {
            return Err(PuckError::Config(format!(
                "min_mating_voltage ({min_mating}) must not exceed max_charging_voltage ({max_charging})"
            )));
        }
        self.config.selector = SelectorConfig {
            min_mating_voltage: min_mating,
            max_charging_voltage: max_charging,
        };
        Ok(())
    }

    pub fn stop_all(&self) {
        self.composer.stop_all();
    }

    // ── accessors ────────────────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state_code(&self) -> StateCode {
        self.state.get()
    }

    pub fn composer(&self) -> &ControllerComposer {
        &self.composer
    }

    pub fn charging(&self) -> &PeriodicTask<ChargingMachine> {
        &self.charging
    }

    pub fn mating(&self) -> &PeriodicTask<MatingMachine> {
        &self.mating
    }

    pub fn hub(&self) -> &Arc<SensorHub> {
        &self.hub
    }

    /// Last command that reached the actuator, from either machine.
    pub fn last_output(&self) -> WheelCommand {
        self.output.latest()
    }

    /// A recorder sampling this supervisor's hub, state code and output.
    pub fn usage_recorder(&self) -> UsageRecorder {
        UsageRecorder::new(
            Arc::clone(&self.hub),
            self.state.clone(),
            self.output.clone(),
            &self.config.usage,
        )
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.charging.stop();
        self.mating.stop();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
