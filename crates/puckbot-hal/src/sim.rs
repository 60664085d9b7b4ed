//! In-process simulated drivers for tests and the CLI demo rig.
//!
//! Every sim driver records what it was told so assertions can inspect the
//! full command history without any physical hardware.
//!
//! # Example
//!
//! ```rust
//! use puckbot_hal::sim::SimRig;
//! use puckbot_types::WheelCommand;
//!
//! let rig = SimRig::new();
//! rig.actuator()
//!     .lock()
//!     .unwrap()
//!     .set_output(WheelCommand::new(0.5, 0.5))
//!     .expect("sim drive must succeed");
//! assert_eq!(rig.wheels.lock().unwrap().history().len(), 1);
//! ```

use std::sync::{Arc, Mutex};

use puckbot_types::{Face, PuckError, WheelCommand};
use tracing::debug;

use crate::actuator::{SharedActuator, WheelActuator};
use crate::indicator::{SharedIndicator, SharedTransponder, StatusIndicator, Transponder};

// ────────────────────────────────────────────────────────────────────────────
// Sim drive
// ────────────────────────────────────────────────────────────────────────────

/// A simulated drive base that records every applied command.
///
/// Can be put into a faulted state to exercise error paths.
pub struct SimWheels {
    id: String,
    output: WheelCommand,
    history: Vec<WheelCommand>,
    faulted: bool,
}

impl SimWheels {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            output: WheelCommand::ZERO,
            history: Vec::new(),
            faulted: false,
        }
    }

    /// Every command applied so far, oldest first.
    pub fn history(&self) -> &[WheelCommand] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// While faulted, `set_output` fails and leaves the output unchanged.
    pub fn set_faulted(&mut self, faulted: bool) {
        self.faulted = faulted;
    }
}

impl WheelActuator for SimWheels {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_output(&mut self, command: WheelCommand) -> Result<(), PuckError> {
        if self.faulted {
            debug!(actuator = %self.id, ?command, "rejecting command while faulted");
            return Err(PuckError::HardwareFault {
                component: self.id.clone(),
                details: "simulated driver fault".to_string(),
            });
        }
        self.output = command;
        self.history.push(command);
        Ok(())
    }

    fn output(&self) -> WheelCommand {
        self.output
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sim face display
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct SimIndicator {
    faces: Vec<Face>,
}

impl SimIndicator {
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }
}

impl StatusIndicator for SimIndicator {
    fn set_face(&mut self, face: Face) -> Result<(), PuckError> {
        self.faces.push(face);
        Ok(())
    }

    fn face(&self) -> Option<Face> {
        self.faces.last().copied()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sim transponder
// ────────────────────────────────────────────────────────────────────────────

/// Records the broadcast payload and how many times it was switched on.
#[derive(Default)]
pub struct SimTransponder {
    payload: Option<String>,
    activations: usize,
}

impl SimTransponder {
    pub fn activations(&self) -> usize {
        self.activations
    }
}

impl Transponder for SimTransponder {
    fn turn_on(&mut self, payload: &str) -> Result<(), PuckError> {
        if self.payload.is_none() {
            self.activations += 1;
        }
        self.payload = Some(payload.to_string());
        Ok(())
    }

    fn turn_off(&mut self) -> Result<(), PuckError> {
        self.payload = None;
        Ok(())
    }

    fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rig
// ────────────────────────────────────────────────────────────────────────────

/// A full set of simulated output collaborators.
///
/// The concrete handles stay accessible for assertions; the `actuator()`,
/// `indicator()` and `transponder()` accessors hand out the trait-object
/// handles the runtime consumes.
#[derive(Clone)]
pub struct SimRig {
    pub wheels: Arc<Mutex<SimWheels>>,
    pub indicator: Arc<Mutex<SimIndicator>>,
    pub transponder: Arc<Mutex<SimTransponder>>,
}

impl SimRig {
    pub fn new() -> Self {
        Self {
            wheels: Arc::new(Mutex::new(SimWheels::new("drive_base"))),
            indicator: Arc::new(Mutex::new(SimIndicator::default())),
            transponder: Arc::new(Mutex::new(SimTransponder::default())),
        }
    }

    pub fn actuator(&self) -> SharedActuator {
        self.wheels.clone()
    }

    pub fn indicator(&self) -> SharedIndicator {
        self.indicator.clone()
    }

    pub fn transponder(&self) -> SharedTransponder {
        self.transponder.clone()
    }
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_wheels_record_history() {
        let mut wheels = SimWheels::new("test");
        wheels.set_output(WheelCommand::new(0.2, 0.3)).unwrap();
        wheels.set_output(WheelCommand::ZERO).unwrap();
        assert_eq!(wheels.history().len(), 2);
        assert_eq!(wheels.output(), WheelCommand::ZERO);
    }

    #[test]
    fn faulted_sim_wheels_reject_commands() {
        let mut wheels = SimWheels::new("test");
        wheels.set_faulted(true);
        let err = wheels.set_output(WheelCommand::both(0.5)).unwrap_err();
        assert!(matches!(err, PuckError::HardwareFault { .. }));
        assert!(wheels.history().is_empty());
    }

    #[test]
    fn sim_indicator_tracks_latest_face() {
        let mut display = SimIndicator::default();
        assert!(display.face().is_none());
        display.set_face(Face::ChargingSearching).unwrap();
        display.set_face(Face::ChargingDeciding).unwrap();
        assert_eq!(display.face(), Some(Face::ChargingDeciding));
        assert_eq!(display.faces().len(), 2);
    }

    #[test]
    fn sim_transponder_counts_activations_not_refreshes() {
        let mut t = SimTransponder::default();
        t.turn_on("[0]").unwrap();
        t.turn_on("[1]").unwrap();
        assert_eq!(t.activations(), 1);
        assert_eq!(t.payload(), Some("[1]"));
        t.turn_off().unwrap();
        t.turn_on("[2]").unwrap();
        assert_eq!(t.activations(), 2);
    }

    #[test]
    fn rig_handles_share_state() {
        let rig = SimRig::new();
        rig.actuator()
            .lock()
            .unwrap()
            .set_output(WheelCommand::both(0.1))
            .unwrap();
        rig.indicator()
            .lock()
            .unwrap()
            .set_face(Face::MatingWaiting)
            .unwrap();
        assert_eq!(rig.wheels.lock().unwrap().output(), WheelCommand::both(0.1));
        assert_eq!(rig.indicator.lock().unwrap().face(), Some(Face::MatingWaiting));
    }
}
