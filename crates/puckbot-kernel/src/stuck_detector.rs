//! [`StuckDetector`] – the single "am I stuck?" answer a machine reads each
//! tick.
//!
//! Two independent latches feed it:
//!
//! - the state [`DeadlineTimer`] expiring before the machine left the state;
//! - a wheel [`StallRecord`] latching `stuck` in the [`StallMonitor`].
//!
//! A rearm clears only the deadline latch and a free run clears only the
//! stall latch.  After its recovery sequence a machine calls
//! [`StuckDetector::clear_stuck_latch`] to drop both.
//!
//! A chronic stall escalates exactly once per episode: the first
//! [`StallVerdict::Shutdown`] sets `shutdown_requested` and sends a
//! [`SafetyPayload::StallShutdown`] event.  Only [`StuckDetector::restore`]
//! re-enables escalation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use puckbot_types::{SafetyEvent, SafetyPayload, WheelSide};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

use crate::stall::{StallMonitor, StallRecord, StallThresholds, StallVerdict};
use crate::watchdog::DeadlineTimer;

pub struct StuckDetector {
    name: String,
    timer: DeadlineTimer,
    monitor: Mutex<StallMonitor>,
    shutdown_requested: AtomicBool,
    events: Option<UnboundedSender<SafetyEvent>>,
}

impl StuckDetector {
    pub fn new(name: impl Into<String>, handle: Handle, thresholds: StallThresholds) -> Self {
        let name = name.into();
        Self {
            timer: DeadlineTimer::new(name.clone(), handle),
            name,
            monitor: Mutex::new(StallMonitor::new(thresholds)),
            shutdown_requested: AtomicBool::new(false),
            events: None,
        }
    }

    /// Route shutdown and watchdog events to the supervisor.
    pub fn with_events(mut self, events: UnboundedSender<SafetyEvent>) -> Self {
        self.timer = self.timer.with_events(events.clone());
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── watchdog ─────────────────────────────────────────────────────────

    pub fn start_timer(&self, timeout: Duration) {
        self.timer.start_timer(timeout);
    }

    pub fn cancel_timer(&self) {
        self.timer.cancel();
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_armed()
    }

    // ── stall evaluation ─────────────────────────────────────────────────

    /// Feed one expected/observed pair for `side` and escalate on the first
    /// shutdown verdict.
    pub fn check_stall(&self, side: WheelSide, expected: f64, observed: f64) -> StallVerdict {
        let (verdict, record) = {
            let mut monitor = self.monitor();
            let verdict = monitor.check_stall(side, expected, observed);
            (verdict, monitor.record(side))
        };

        if verdict == StallVerdict::Shutdown && !self.shutdown_requested.swap(true, Ordering::AcqRel) {
            error!(
                machine = %self.name,
                ?side,
                stall_ticks = record.consecutive_stall_ticks,
                "chronic stall, requesting shutdown"
            );
            if let Some(tx) = &self.events {
                let _ = tx.send(SafetyEvent::new(
                    self.name.clone(),
                    SafetyPayload::StallShutdown {
                        side,
                        stall_ticks: record.consecutive_stall_ticks,
                    },
                ));
            }
        }
        verdict
    }

    pub fn record(&self, side: WheelSide) -> StallRecord {
        self.monitor().record(side)
    }

    // ── flags ────────────────────────────────────────────────────────────

    /// Non-blocking: deadline expired or any wheel latched stuck.
    pub fn is_stuck(&self) -> bool {
        self.timer.is_expired() || self.monitor().any_stuck()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Drop both stuck latches after a recovery sequence.  Stall counters
    /// are kept so a wheel that stays blocked still escalates.
    pub fn clear_stuck_latch(&self) {
        self.timer.clear_expired();
        self.monitor().clear_stuck();
    }

    /// Zero both wheels' stall and free counters and their latches.  Called
    /// when a machine falls back to its initial state.  The shutdown flag is
    /// left alone; only [`StuckDetector::restore`] clears it.
    pub fn reset_stall_counters(&self) {
        self.monitor().reset();
    }

    /// Return to initial values after an external restore: counters, both
    /// latches and the shutdown flag.
    pub fn restore(&self) {
        self.timer.cancel();
        self.timer.clear_expired();
        self.monitor().reset();
        self.shutdown_requested.store(false, Ordering::Release);
        info!(machine = %self.name, "stuck detector restored");
    }

    fn monitor(&self) -> MutexGuard<'_, StallMonitor> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
