//! `WheelActuator` trait for the differential drive.
//!
//! Drivers implement this trait; the output governor is the only caller.

use std::sync::{Arc, Mutex};

use puckbot_types::{PuckError, WheelCommand};

/// Handle shared between the governors of both behavior machines.
pub type SharedActuator = Arc<Mutex<dyn WheelActuator>>;

/// The motor driver for both drive wheels.
pub trait WheelActuator: Send {
    /// Stable identifier, e.g. `"drive_base"`.
    fn id(&self) -> &str;

    /// Apply a normalized command.  Values are already clamped to `[-1, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`PuckError::HardwareFault`] if the driver rejects the command.
    fn set_output(&mut self, command: WheelCommand) -> Result<(), PuckError>;

    /// The most recently applied command.
    fn output(&self) -> WheelCommand;
}
