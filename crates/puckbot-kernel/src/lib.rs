//! `puckbot-kernel` – Stall Safety
//!
//! Protects the drive base from mechanical stalls.  Nothing here decides
//! where to drive; it only watches what was commanded against what the
//! wheels actually did and raises flags when the two disagree for too long.
//!
//! # Modules
//!
//! - [`watchdog`] – [`DeadlineTimer`][watchdog::DeadlineTimer]: a single
//!   outstanding, rearmable deadline per machine state.  Rearming is
//!   generation-guarded so a stale expiry can never mark a fresh state stuck.
//! - [`stall`] – [`StallMonitor`][stall::StallMonitor]: per-wheel debounced
//!   stall/free counters with stuck and shutdown thresholds.
//! - [`stuck_detector`] – [`StuckDetector`][stuck_detector::StuckDetector]:
//!   combines the deadline timer and the stall monitor into the single
//!   `is_stuck()` flag a machine reads at the top of every tick, and escalates
//!   chronic stalls to the supervisor as a
//!   [`SafetyEvent`][puckbot_types::SafetyEvent].
//! - [`evaluator`] – [`StallModel`][evaluator::StallModel],
//!   [`StallEvaluator`][evaluator::StallEvaluator] and
//!   [`EvaluatorScheduler`][evaluator::EvaluatorScheduler]: the delayed
//!   one-shot comparison of expected against observed wheel speed that runs
//!   after every dispatched command.

pub mod evaluator;
pub mod stall;
pub mod stuck_detector;
pub mod watchdog;

pub use evaluator::{EvaluatorScheduler, StallEvaluator, StallModel, voltage_ratio};
pub use stall::{StallMonitor, StallRecord, StallThresholds, StallVerdict};
pub use stuck_detector::StuckDetector;
pub use watchdog::DeadlineTimer;
