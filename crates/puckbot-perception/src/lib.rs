//! `puckbot-perception` – sensor caches and target extraction.
//!
//! Sensor and perception collaborators push updates asynchronously; the
//! behavior machines and the stall evaluator only ever read the latest
//! value.  Nothing here blocks a reader or enforces a staleness bound.
//!
//! # Modules
//!
//! - [`filter`] – [`SmoothedScalar`][filter::SmoothedScalar]: exponential
//!   moving average used for battery and charger signals.
//! - [`cache`] – [`ScalarCell`][cache::ScalarCell] and
//!   [`SensorCell`][cache::SensorCell]: last-write-wins shared cells.
//! - [`hub`] – [`SensorHub`][hub::SensorHub]: ingests raw battery, charger
//!   and wheel samples and publishes smoothed values into cells.
//! - [`targeting`] – [`TargetSelector`][targeting::TargetSelector]: turns a
//!   frame's detections into one [`TargetObservation`][puckbot_types::TargetObservation]
//!   per class of interest.

pub mod cache;
pub mod filter;
pub mod hub;
pub mod targeting;

pub use cache::{ScalarCell, SensorCell};
pub use filter::SmoothedScalar;
pub use hub::SensorHub;
pub use targeting::{FrameTargets, TargetSelector};
