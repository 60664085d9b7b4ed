//! [`OutputGovernor`] – last stop before the actuator.
//!
//! Every wheel command a machine issues goes through [`OutputGovernor::dispatch`]:
//!
//! ```text
//! dispatched = clamp(commanded · multiplier / (battery / V_nominal), -1, 1)
//! ```
//!
//! The per-wheel multiplier compensates asymmetric motor wear and is shared
//! by both machines through a [`WheelBias`] handle.  After a successful
//! dispatch a delayed stall evaluation is scheduled against the dispatched
//! value.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use puckbot_hal::SharedActuator;
use puckbot_kernel::{EvaluatorScheduler, voltage_ratio};
use puckbot_perception::{ScalarCell, SensorCell};
use puckbot_types::{WheelCommand, WheelSide};
use tracing::{info, trace, warn};

// ────────────────────────────────────────────────────────────────────────────
// WheelBias
// ────────────────────────────────────────────────────────────────────────────

/// Shared per-wheel wear multipliers, 1.0 each by default.
#[derive(Debug, Clone)]
pub struct WheelBias {
    multipliers: Arc<[AtomicU32; 2]>,
}

impl WheelBias {
    pub fn new() -> Self {
        Self {
            multipliers: Arc::new([AtomicU32::new(1.0f32.to_bits()), AtomicU32::new(1.0f32.to_bits())]),
        }
    }

    /// Positive `bias` boosts the left wheel by `1 + |bias|`, negative boosts
    /// the right wheel, zero restores both to 1.
    pub fn set(&self, bias: f32) {
        let boosted = 1.0 + bias.abs();
        let (left, right) = if bias > 0.0 {
            (boosted, 1.0)
        } else if bias < 0.0 {
            (1.0, boosted)
        } else {
            (1.0, 1.0)
        };
        self.multipliers[0].store(left.to_bits(), Ordering::Relaxed);
        self.multipliers[1].store(right.to_bits(), Ordering::Relaxed);
        info!(bias, left, right, "wheel bias updated");
    }

    pub fn multiplier(&self, side: WheelSide) -> f32 {
        f32::from_bits(self.multipliers[side.index()].load(Ordering::Relaxed))
    }
}

impl Default for WheelBias {
    fn default() -> Self {
        Self::new()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OutputGovernor
// ────────────────────────────────────────────────────────────────────────────

pub struct OutputGovernor {
    machine: String,
    actuator: SharedActuator,
    battery: ScalarCell,
    v_nominal: f64,
    bias: WheelBias,
    last_output: SensorCell<WheelCommand>,
    evaluations: Option<Arc<EvaluatorScheduler>>,
}

impl OutputGovernor {
    pub fn new(
        machine: impl Into<String>,
        actuator: SharedActuator,
        battery: ScalarCell,
        v_nominal: f64,
        bias: WheelBias,
    ) -> Self {
        Self {
            machine: machine.into(),
            actuator,
            battery,
            v_nominal,
            bias,
            last_output: SensorCell::default(),
            evaluations: None,
        }
    }

    /// Schedule a stall evaluation after every dispatch.
    pub fn with_evaluations(mut self, scheduler: Arc<EvaluatorScheduler>) -> Self {
        self.evaluations = Some(scheduler);
        self
    }

    /// Publish every dispatched command into `cell` (read by the usage
    /// recorder).
    pub fn with_output_cell(mut self, cell: SensorCell<WheelCommand>) -> Self {
        self.last_output = cell;
        self
    }

    pub fn bias(&self) -> &WheelBias {
        &self.bias
    }

    /// Voltage- and wear-compensated command before clamping.
    pub fn scale(&self, command: WheelCommand, battery: Option<f64>) -> WheelCommand {
        let ratio = voltage_ratio(battery, self.v_nominal) as f32;
        WheelCommand::new(
            command.left * self.bias.multiplier(WheelSide::Left) / ratio,
            command.right * self.bias.multiplier(WheelSide::Right) / ratio,
        )
    }

    /// [`scale`][Self::scale] clamped to the actuator range.
    pub fn compensate(&self, command: WheelCommand, battery: Option<f64>) -> WheelCommand {
        self.scale(command, battery).clamped()
    }

    /// Compensate, send to the actuator and schedule the stall evaluation.
    ///
    /// A sink failure is logged and nothing is scheduled; the next tick
    /// simply tries again.
    pub fn dispatch(&self, command: WheelCommand) -> WheelCommand {
        let out = self.compensate(command, self.battery.load());
        if !self.send(out) {
            return out;
        }
        trace!(machine = %self.machine, left = out.left, right = out.right, "dispatched");
        if let Some(scheduler) = &self.evaluations {
            scheduler.schedule(out);
        }
        out
    }

    /// Zero the output and drop every pending stall evaluation.
    pub fn halt(&self) {
        if let Some(scheduler) = &self.evaluations {
            scheduler.cancel_all();
        }
        self.send(WheelCommand::ZERO);
    }

    pub fn last_output(&self) -> WheelCommand {
        self.last_output.latest()
    }

    /// Stall evaluations scheduled by this governor and not yet run.
    pub fn pending_evaluations(&self) -> usize {
        self.evaluations.as_ref().map_or(0, |s| s.pending())
    }

    fn send(&self, out: WheelCommand) -> bool {
        let result = self
            .actuator
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .set_output(out);
        match result {
            Ok(()) => {
                self.last_output.publish(out);
                true
            }
            Err(e) => {
                warn!(machine = %self.machine, error = %e, "actuator rejected command");
                false
            }
        }
    }
}
