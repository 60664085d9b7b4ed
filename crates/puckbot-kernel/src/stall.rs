//! [`StallMonitor`] – per-wheel debounced stall counting.
//!
//! Each evaluation compares an expected wheel speed with the observed one.
//! Consecutive out-of-tolerance evaluations build up a stall count; the count
//! only resets after a run of in-tolerance evaluations longer than
//! `min_free`, so one borderline sample never flips the wheel back to free.
//!
//! ```text
//!   stall ticks  > stuck_threshold     → record.stuck = true
//!   stall ticks  > shutdown_threshold  → StallVerdict::Shutdown
//!   free ticks   > min_free            → stall ticks = 0, stuck = false
//! ```

use puckbot_types::WheelSide;
use tracing::{debug, warn};

/// Tuning for [`StallMonitor`].  `stuck_threshold` must stay strictly below
/// `shutdown_threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StallThresholds {
    /// Largest tolerated `|expected - observed|`, in sensor speed units.
    pub error_threshold: f64,
    pub stuck_threshold: u32,
    pub shutdown_threshold: u32,
    pub min_free: u32,
}

impl Default for StallThresholds {
    fn default() -> Self {
        Self {
            error_threshold: 220.0 / 3.0,
            stuck_threshold: 5,
            shutdown_threshold: 15,
            min_free: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StallRecord {
    pub consecutive_stall_ticks: u32,
    pub consecutive_free_ticks: u32,
    pub stuck: bool,
}

/// Outcome of one [`StallMonitor::check_stall`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallVerdict {
    /// Within tolerance.
    Free,
    /// Out of tolerance, not yet stuck.
    Stalled,
    /// Out of tolerance and past the stuck threshold.
    Stuck,
    /// Past the shutdown threshold; the owning machine must be stopped.
    Shutdown,
}

#[derive(Debug, Clone, Default)]
pub struct StallMonitor {
    thresholds: StallThresholds,
    records: [StallRecord; 2],
}

impl StallMonitor {
    pub fn new(thresholds: StallThresholds) -> Self {
        Self {
            thresholds,
            records: [StallRecord::default(); 2],
        }
    }

    pub fn thresholds(&self) -> &StallThresholds {
        &self.thresholds
    }

    /// Feed one evaluation for `side`.
    pub fn check_stall(&mut self, side: WheelSide, expected: f64, observed: f64) -> StallVerdict {
        let t = self.thresholds;
        let record = &mut self.records[side.index()];
        let error = (expected - observed).abs();

        if error > t.error_threshold {
            record.consecutive_stall_ticks = record.consecutive_stall_ticks.saturating_add(1);
            record.consecutive_free_ticks = 0;
            let ticks = record.consecutive_stall_ticks;
            warn!(?side, error, expected, observed, stall_ticks = ticks, "wheel stall");

            if ticks > t.stuck_threshold {
                record.stuck = true;
            }
            if ticks > t.shutdown_threshold {
                StallVerdict::Shutdown
            } else if record.stuck {
                StallVerdict::Stuck
            } else {
                StallVerdict::Stalled
            }
        } else {
            record.consecutive_free_ticks = record.consecutive_free_ticks.saturating_add(1);
            if record.consecutive_free_ticks > t.min_free
                && (record.consecutive_stall_ticks > 0 || record.stuck)
            {
                debug!(?side, "wheel free again, stall count cleared");
                record.consecutive_stall_ticks = 0;
                record.stuck = false;
            }
            StallVerdict::Free
        }
    }

    pub fn record(&self, side: WheelSide) -> StallRecord {
        self.records[side.index()]
    }

    pub fn any_stuck(&self) -> bool {
        self.records.iter().any(|r| r.stuck)
    }

    /// Clear both stuck latches, keeping the counters.  A wheel that keeps
    /// stalling re-latches on its next evaluation and can still escalate.
    pub fn clear_stuck(&mut self) {
        for record in &mut self.records {
            record.stuck = false;
        }
    }

    /// Back to the initial state: counters zero, nothing stuck.
    pub fn reset(&mut self) {
        self.records = [StallRecord::default(); 2];
    }
}
