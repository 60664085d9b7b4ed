//! `puckbot-hal` – output collaborators.
//!
//! The behavior core never talks to a motor driver or display directly; it
//! holds trait objects for the three sinks it produces into.
//!
//! # Modules
//!
//! - [`actuator`] – [`WheelActuator`][actuator::WheelActuator]: accepts
//!   normalized `{left, right}` wheel commands.
//! - [`indicator`] – [`StatusIndicator`][indicator::StatusIndicator] (one
//!   [`Face`][puckbot_types::Face] per state) and
//!   [`Transponder`][indicator::Transponder] (on with a payload / off).
//! - [`sim`] – in-process drivers that record what they were told, used by
//!   tests and the CLI's simulated rig.

pub mod actuator;
pub mod indicator;
pub mod sim;

pub use actuator::{SharedActuator, WheelActuator};
pub use indicator::{SharedIndicator, SharedTransponder, StatusIndicator, Transponder};
pub use sim::{SimIndicator, SimRig, SimTransponder, SimWheels};
