//! Delayed stall evaluation.
//!
//! After every dispatched command the [`EvaluatorScheduler`] arms one
//! one-shot task that waits `delay` (shorter than the control timestep) and
//! then runs [`StallEvaluator::evaluate`]: the expected speed of each wheel is
//! derived from the commanded value through the [`StallModel`] and compared
//! against the latest buffered speed reported by the wheel driver.
//!
//! ```text
//! expected = commanded · k_pwm · (battery / V_nominal)^5
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use puckbot_perception::{ScalarCell, SensorCell};
use puckbot_types::{WheelCommand, WheelSide, WheelTelemetry};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::stall::StallVerdict;
use crate::stuck_detector::StuckDetector;

/// `battery / v_nominal`, or 1 when the battery is unknown or either value
/// is not positive.
pub fn voltage_ratio(battery: Option<f64>, v_nominal: f64) -> f64 {
    match battery {
        Some(v) if v > 0.0 && v_nominal > 0.0 => v / v_nominal,
        _ => 1.0,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// StallModel
// ────────────────────────────────────────────────────────────────────────────

/// Empirical PWM-to-speed model with fifth-power torque fall-off at low
/// charge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StallModel {
    pub k_pwm: f64,
    pub v_nominal: f64,
}

impl Default for StallModel {
    fn default() -> Self {
        Self {
            k_pwm: 220.0,
            v_nominal: 3.3,
        }
    }
}

impl StallModel {
    pub fn expected_speed(&self, commanded: f32, battery: Option<f64>) -> f64 {
        f64::from(commanded) * self.k_pwm * voltage_ratio(battery, self.v_nominal).powi(5)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// StallEvaluator
// ────────────────────────────────────────────────────────────────────────────

/// Reads the shared wheel and battery cells and feeds the owning machine's
/// [`StuckDetector`].
pub struct StallEvaluator {
    model: StallModel,
    detector: Arc<StuckDetector>,
    wheels: SensorCell<WheelTelemetry>,
    battery: ScalarCell,
}

impl StallEvaluator {
    pub fn new(
        model: StallModel,
        detector: Arc<StuckDetector>,
        wheels: SensorCell<WheelTelemetry>,
        battery: ScalarCell,
    ) -> Self {
        Self {
            model,
            detector,
            wheels,
            battery,
        }
    }

    pub fn model(&self) -> &StallModel {
        &self.model
    }

    /// Evaluate both wheels against `commanded` using the samples cached
    /// right now.
    pub fn evaluate(&self, commanded: WheelCommand) -> [StallVerdict; 2] {
        let telemetry = self.wheels.latest();
        let battery = self.battery.load();
        WheelSide::ALL.map(|side| {
            let expected = self.model.expected_speed(commanded.get(side), battery);
            let observed = telemetry.buffered_speed(side);
            trace!(machine = %self.detector.name(), ?side, expected, observed, "stall evaluation");
            self.detector.check_stall(side, expected, observed)
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// EvaluatorScheduler
// ────────────────────────────────────────────────────────────────────────────

/// One-shot delayed evaluations for one machine.
///
/// Finished handles are pruned on every schedule; [`cancel_all`] aborts the
/// rest so nothing evaluates against a stopped machine.
///
/// [`cancel_all`]: EvaluatorScheduler::cancel_all
pub struct EvaluatorScheduler {
    handle: Handle,
    delay: Duration,
    evaluator: Arc<StallEvaluator>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl EvaluatorScheduler {
    pub fn new(handle: Handle, delay: Duration, evaluator: Arc<StallEvaluator>) -> Self {
        Self {
            handle,
            delay,
            evaluator,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&self, commanded: WheelCommand) {
        let evaluator = Arc::clone(&self.evaluator);
        let delay = self.delay;
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            evaluator.evaluate(commanded);
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|t| !t.is_finished());
        pending.push(task);
    }

    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for task in pending.drain(..) {
            task.abort();
        }
    }

    /// Evaluations scheduled and not yet finished.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| !t.is_finished())
            .count()
    }
}

impl Drop for EvaluatorScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
