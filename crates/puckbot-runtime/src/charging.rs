//! [`ChargingMachine`] – find a charging puck, drive onto it, charge, leave.
//!
//! ```text
//!  Searching ──target──▶ Deciding ──visible > N──▶ Mounting ──current──▶ Charging
//!      ▲                    │                                              │
//!      │◀──── target lost ──┘                          full / low current  │
//!      └──────────────────────────── Dismounting ◀──────────────────────────┘
//! ```
//!
//! Vision only gates Searching and Deciding.  Once mounting starts the puck
//! slides under the chassis and out of view, so Mounting, Charging and
//! Dismounting carry on without a target and rely on their watchdog
//! timeouts instead.

use std::time::Duration;

use puckbot_types::Face;
use tracing::{debug, info, warn};

use crate::config::ChargingConfig;
use crate::machine::{MachineParts, SearchWander, approach_command};
use crate::periodic::Behavior;
use crate::sequence::ActionSequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingState {
    Searching,
    Deciding,
    Mounting,
    Charging,
    Dismounting,
}

impl ChargingState {
    pub fn face(self) -> Face {
        match self {
            ChargingState::Searching => Face::ChargingSearching,
            ChargingState::Deciding => Face::ChargingDeciding,
            ChargingState::Mounting => Face::ChargingMounting,
            ChargingState::Charging => Face::ChargingCharging,
            ChargingState::Dismounting => Face::ChargingDismounting,
        }
    }
}

pub struct ChargingMachine {
    parts: MachineParts,
    config: ChargingConfig,
    state: ChargingState,
    visible_frames: u32,
    low_current_frames: u32,
    wander: SearchWander,
}

impl ChargingMachine {
    pub const NAME: &'static str = "charging";

    pub fn new(parts: MachineParts, config: ChargingConfig) -> Self {
        Self {
            wander: SearchWander::new(&config.search),
            parts,
            config,
            state: ChargingState::Searching,
            visible_frames: 0,
            low_current_frames: 0,
        }
    }

    pub fn state(&self) -> ChargingState {
        self.state
    }

    pub fn parts(&self) -> &MachineParts {
        &self.parts
    }

    fn timeout(&self, state: ChargingState) -> Duration {
        let ms = match state {
            ChargingState::Searching => self.config.searching_timeout_ms,
            ChargingState::Deciding => self.config.deciding_timeout_ms,
            ChargingState::Mounting => self.config.mounting_timeout_ms,
            ChargingState::Charging => self.config.charging_timeout_ms,
            ChargingState::Dismounting => self.config.dismounting_timeout_ms,
        };
        Duration::from_millis(ms)
    }

    /// Switch to `next`: reset counters, arm its watchdog, show its face.
    fn enter(&mut self, next: ChargingState) {
        if next != self.state {
            info!(machine = Self::NAME, from = ?self.state, to = ?next, "transition");
        }
        self.state = next;
        self.visible_frames = 0;
        self.low_current_frames = 0;
        if next == ChargingState::Searching {
            self.wander.reset();
        }
        self.parts.detector.start_timer(self.timeout(next));
        self.parts.show(next.face());
    }

    /// Back to Searching with fresh stall counters.  Recovery re-enters
    /// Searching through [`Self::enter`] instead so counts keep piling up
    /// toward a chronic stall.
    fn restart_search(&mut self) {
        self.parts.detector.reset_stall_counters();
        self.enter(ChargingState::Searching);
    }

    fn search(&mut self) {
        let command = self.wander.next(&mut self.parts.rng);
        self.parts.drive(command);
    }

    /// Target lost while deciding: back to Searching and search on this
    /// same tick.
    fn fall_back_to_search(&mut self) {
        debug!(machine = Self::NAME, "target lost while deciding");
        self.restart_search();
        self.search();
    }

    fn decide(&mut self) {
        self.parts.hold_still();
        self.visible_frames += 1;
        debug!(machine = Self::NAME, visible = self.visible_frames, "deciding");
        if self.visible_frames > self.config.min_visible_frames {
            self.enter(ChargingState::Mounting);
        }
    }

    fn mount(&mut self, bearing_error: f32) {
        if self.parts.hub.charger_current() > self.config.charging_current {
            self.parts.hold_still();
            self.enter(ChargingState::Charging);
        } else {
            self.parts.drive(approach_command(
                bearing_error,
                self.config.gain,
                self.config.static_speed,
            ));
        }
    }

    fn charge(&mut self) {
        self.parts.hold_still();
        let battery = self.parts.hub.battery_voltage();
        let current = self.parts.hub.charger_current();

        if battery.is_some_and(|v| v >= self.config.charged_voltage) {
            info!(machine = Self::NAME, battery = ?battery, "fully charged");
            self.enter(ChargingState::Dismounting);
        } else if current < self.config.charging_current {
            self.low_current_frames += 1;
            if self.low_current_frames > self.config.max_low_current_frames {
                info!(machine = Self::NAME, current, "charge current lost");
                self.enter(ChargingState::Dismounting);
            }
        } else {
            self.low_current_frames = 0;
        }
    }

    fn dismount(&mut self) {
        let sequence = ActionSequence::reverse_and_turn("dismount", &mut self.parts.rng);
        self.parts.play(&sequence);
        self.restart_search();
        self.parts.rearm();
    }
}

impl Behavior for ChargingMachine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn on_start(&mut self) {
        self.restart_search();
    }

    fn on_stop(&mut self) {
        self.parts.halt();
    }

    fn tick(&mut self) {
        if self.parts.detector.is_stuck() {
            warn!(machine = Self::NAME, state = ?self.state, "stuck, running recovery");
            self.parts.recover();
            self.enter(ChargingState::Searching);
            self.parts.rearm();
        }

        let target = self.parts.target.latest();
        match (self.state, target.acquired) {
            (ChargingState::Searching, false) => self.search(),
            (ChargingState::Searching, true) => {
                self.parts.hold_still();
                self.enter(ChargingState::Deciding);
            }
            (ChargingState::Deciding, false) => self.fall_back_to_search(),
            (ChargingState::Deciding, true) => self.decide(),
            (ChargingState::Mounting, acquired) => {
                let bearing = if acquired { target.bearing_error } else { 0.0 };
                self.mount(bearing);
            }
            (ChargingState::Charging, _) => self.charge(),
            (ChargingState::Dismounting, _) => self.dismount(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;
    use crate::machine::testing::{Bench, bench};
    use puckbot_hal::{StatusIndicator, WheelActuator};
    use puckbot_types::{BatterySample, ChargerSample, TargetObservation, WheelCommand, WheelSide};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn machine(bench: &Bench) -> ChargingMachine {
        let config = RobotConfig::default();
        let parts = bench
            .wiring
            .parts(ChargingMachine::NAME, &config, StdRng::seed_from_u64(42));
        let mut m = ChargingMachine::new(parts, config.charging);
        m.on_start();
        m
    }

    fn see(m: &ChargingMachine, bearing: f32) {
        m.parts.target.publish(TargetObservation::acquired(bearing, 0.1));
    }

    fn lose(m: &ChargingMachine) {
        m.parts.target.publish(TargetObservation::lost());
    }

    fn charger(bench: &Bench, current: f64) {
        bench.hub.on_charger(ChargerSample {
            charger_voltage: current,
            coil_voltage: 0.0,
            timestamp_ms: 0,
        });
    }

    fn last_output(bench: &Bench) -> WheelCommand {
        bench.rig.wheels.lock().unwrap().output()
    }

    /// Drive a fresh machine to Mounting.
    fn mounting(bench: &Bench) -> ChargingMachine {
        let mut m = machine(bench);
        see(&m, 0.0);
        for _ in 0..12 {
            m.tick();
        }
        assert_eq!(m.state(), ChargingState::Mounting);
        m
    }

    #[tokio::test(start_paused = true)]
    async fn searching_without_target_explores() {
        let bench = bench();
        let mut m = machine(&bench);
        m.tick();
        assert_eq!(m.state(), ChargingState::Searching);
        let out = last_output(&bench);
        assert!(out.left.abs() <= 0.5 && out.right.abs() <= 0.5);
        assert_eq!(bench.rig.indicator.lock().unwrap().face(), Some(Face::ChargingSearching));
    }

    #[tokio::test(start_paused = true)]
    async fn deciding_advances_on_eleventh_visible_tick() {
        let bench = bench();
        let mut m = machine(&bench);
        see(&m, 0.0);
        m.tick();
        assert_eq!(m.state(), ChargingState::Deciding);

        for tick in 1..=10 {
            m.tick();
            assert_eq!(m.state(), ChargingState::Deciding, "left Deciding on tick {tick}");
            assert_eq!(last_output(&bench), WheelCommand::ZERO);
        }
        m.tick();
        assert_eq!(m.state(), ChargingState::Mounting);
        assert_eq!(bench.wiring.state.get(), Face::ChargingMounting.code());
    }

    #[tokio::test(start_paused = true)]
    async fn losing_target_while_deciding_searches_same_tick() {
        let bench = bench();
        let mut m = machine(&bench);
        see(&m, 0.0);
        m.tick();
        m.tick();
        let before = bench.rig.wheels.lock().unwrap().history().len();

        lose(&m);
        m.tick();
        assert_eq!(m.state(), ChargingState::Searching);
        assert_eq!(bench.rig.wheels.lock().unwrap().history().len(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn losing_target_clears_stall_counters() {
        let bench = bench();
        let mut m = machine(&bench);
        see(&m, 0.0);
        m.tick();
        assert_eq!(m.state(), ChargingState::Deciding);
        for _ in 0..4 {
            m.parts.detector.check_stall(WheelSide::Left, 220.0, 0.0);
        }
        assert_eq!(m.parts.detector.record(WheelSide::Left).consecutive_stall_ticks, 4);

        lose(&m);
        m.tick();
        assert_eq!(m.state(), ChargingState::Searching);
        assert_eq!(m.parts.detector.record(WheelSide::Left).consecutive_stall_ticks, 0);
        assert_eq!(m.parts.detector.record(WheelSide::Right).consecutive_stall_ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mounting_steers_on_bearing_and_continues_blind() {
        let bench = bench();
        let mut m = mounting(&bench);

        see(&m, 0.4);
        m.tick();
        let out = last_output(&bench);
        assert!((out.left - 0.6).abs() < 1e-6);
        assert!((out.right - 0.8).abs() < 1e-6);

        lose(&m);
        m.tick();
        assert_eq!(m.state(), ChargingState::Mounting);
        assert_eq!(last_output(&bench), WheelCommand::both(0.7));
    }

    #[tokio::test(start_paused = true)]
    async fn charge_current_moves_to_charging() {
        let bench = bench();
        let mut m = mounting(&bench);
        charger(&bench, 2.5);
        m.tick();
        assert_eq!(m.state(), ChargingState::Charging);
        assert_eq!(last_output(&bench), WheelCommand::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn full_battery_moves_to_dismounting() {
        let bench = bench();
        let mut m = mounting(&bench);
        charger(&bench, 2.5);
        m.tick();

        bench.hub.on_battery(BatterySample {
            voltage: 4.0,
            timestamp_ms: 0,
        });
        m.tick();
        assert_eq!(m.state(), ChargingState::Dismounting);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_low_current_moves_to_dismounting() {
        let bench = bench();
        let mut m = mounting(&bench);
        charger(&bench, 2.5);
        m.tick();
        charger(&bench, 0.5);

        for _ in 0..50 {
            m.tick();
        }
        assert_eq!(m.state(), ChargingState::Charging);
        m.tick();
        assert_eq!(m.state(), ChargingState::Dismounting);
    }

    #[tokio::test(start_paused = true)]
    async fn current_recovery_resets_low_current_count() {
        let bench = bench();
        let mut m = mounting(&bench);
        charger(&bench, 2.5);
        m.tick();

        charger(&bench, 0.5);
        for _ in 0..40 {
            m.tick();
        }
        charger(&bench, 2.5);
        m.tick();
        charger(&bench, 0.5);
        for _ in 0..40 {
            m.tick();
        }
        assert_eq!(m.state(), ChargingState::Charging);
    }

    #[tokio::test(start_paused = true)]
    async fn dismount_backs_off_turns_and_rearms() {
        let bench = bench();
        let mut m = mounting(&bench);
        charger(&bench, 2.5);
        m.tick();
        bench.hub.on_battery(BatterySample {
            voltage: 4.2,
            timestamp_ms: 0,
        });
        m.tick();
        bench.rig.wheels.lock().unwrap().clear_history();

        m.tick();
        assert_eq!(m.state(), ChargingState::Searching);
        let history = bench.rig.wheels.lock().unwrap().history().to_vec();
        // A full battery scales every step down.
        let governor = &m.parts.governor;
        assert_eq!(history[0], governor.compensate(WheelCommand::both(-0.8), Some(4.2)));
        assert_eq!(history[1].left, -history[1].right);
        // Re-arm ramp follows and ends stopped.
        assert_eq!(history[2], governor.compensate(WheelCommand::both(1.0), Some(4.2)));
        assert_eq!(history.last(), Some(&WheelCommand::ZERO));

        let holds = bench.pacer.holds();
        assert_eq!(holds[0], Duration::from_millis(3000));
        assert_eq!(holds[1], Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_runs_recovery_and_returns_to_searching() {
        let bench = bench();
        let mut m = mounting(&bench);
        for _ in 0..6 {
            m.parts.detector.check_stall(WheelSide::Left, 220.0, 0.0);
        }
        assert!(m.parts.detector.is_stuck());
        lose(&m);

        m.tick();
        assert_eq!(m.state(), ChargingState::Searching);
        assert!(!m.parts.detector.is_stuck());
        let holds = bench.pacer.holds();
        assert_eq!(&holds[..3], &[Duration::from_millis(500); 3]);
        // Stall count survives recovery so a chronic stall can escalate.
        assert_eq!(m.parts.detector.record(WheelSide::Left).consecutive_stall_ticks, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn state_timeout_marks_stuck() {
        let bench = bench();
        let mut m = machine(&bench);
        see(&m, 0.0);
        m.tick();
        assert_eq!(m.state(), ChargingState::Deciding);

        tokio::time::sleep(Duration::from_millis(10_001)).await;
        assert!(m.parts.detector.is_stuck());
        m.tick();
        // Recovered, then saw the target again from Searching.
        assert_eq!(m.state(), ChargingState::Deciding);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_zeroes_output() {
        let bench = bench();
        let mut m = mounting(&bench);
        m.tick();
        assert!(!last_output(&bench).is_zero());
        m.on_stop();
        assert_eq!(last_output(&bench), WheelCommand::ZERO);
    }
}
