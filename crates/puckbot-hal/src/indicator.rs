//! Discrete status outputs: the face display and the payload transponder.

use std::sync::{Arc, Mutex};

use puckbot_types::{Face, PuckError};

pub type SharedIndicator = Arc<Mutex<dyn StatusIndicator>>;
pub type SharedTransponder = Arc<Mutex<dyn Transponder>>;

/// Shows one [`Face`] at a time so a peer or observer can read the machine
/// state.
pub trait StatusIndicator: Send {
    /// # Errors
    ///
    /// Returns [`PuckError::HardwareFault`] if the display cannot be updated.
    fn set_face(&mut self, face: Face) -> Result<(), PuckError>;

    fn face(&self) -> Option<Face>;
}

/// Broadcasts the local payload to peers while switched on.
pub trait Transponder: Send {
    /// Start broadcasting `payload`.  Calling again replaces the payload.
    ///
    /// # Errors
    ///
    /// Returns [`PuckError::HardwareFault`] if the marker cannot be shown.
    fn turn_on(&mut self, payload: &str) -> Result<(), PuckError>;

    /// Stop broadcasting.  No-op when already off.
    ///
    /// # Errors
    ///
    /// Returns [`PuckError::HardwareFault`] if the marker cannot be hidden.
    fn turn_off(&mut self) -> Result<(), PuckError>;

    /// The payload currently broadcast, `None` when off.
    fn payload(&self) -> Option<&str>;
}
