//! [`MatingMachine`] – find a peer, approach it, swap genes, flee.
//!
//! Every state past Searching needs the peer in view; losing it drops the
//! machine straight back to Searching.  While approaching, the transponder
//! broadcasts the local gene payload.  In Waiting the exchange happens once
//! the peer faces us and its payload has been decoded.

use std::time::Duration;

use puckbot_types::{Face, PeerFacing};
use tracing::{debug, info, warn};

use crate::config::MatingConfig;
use crate::genes::GenePool;
use crate::machine::{MachineParts, SearchWander, approach_command};
use crate::periodic::Behavior;
use crate::sequence::ActionSequence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatingState {
    Searching,
    Deciding,
    Approaching,
    Waiting,
    Fleeing,
}

impl MatingState {
    pub fn face(self) -> Face {
        match self {
            MatingState::Searching => Face::MatingSearching,
            MatingState::Deciding => Face::MatingDeciding,
            MatingState::Approaching => Face::MatingApproaching,
            MatingState::Waiting => Face::MatingWaiting,
            MatingState::Fleeing => Face::MatingFleeing,
        }
    }
}

pub struct MatingMachine {
    parts: MachineParts,
    config: MatingConfig,
    state: MatingState,
    visible_frames: u32,
    wander: SearchWander,
    genes: GenePool,
}

impl MatingMachine {
    pub const NAME: &'static str = "mating";

    pub fn new(parts: MachineParts, config: MatingConfig) -> Self {
        Self {
            wander: SearchWander::new(&config.search),
            genes: GenePool::new(config.gene_length, config.max_mutation),
            parts,
            config,
            state: MatingState::Searching,
            visible_frames: 0,
        }
    }

    pub fn state(&self) -> MatingState {
        self.state
    }

    pub fn genes(&self) -> &GenePool {
        &self.genes
    }

    pub fn parts(&self) -> &MachineParts {
        &self.parts
    }

    fn timeout(&self, state: MatingState) -> Duration {
        let ms = match state {
            MatingState::Searching => self.config.searching_timeout_ms,
            MatingState::Deciding => self.config.deciding_timeout_ms,
            MatingState::Approaching => self.config.approaching_timeout_ms,
            MatingState::Waiting => self.config.waiting_timeout_ms,
            MatingState::Fleeing => self.config.fleeing_timeout_ms,
        };
        Duration::from_millis(ms)
    }

    fn enter(&mut self, next: MatingState) {
        if next != self.state {
            info!(machine = Self::NAME, from = ?self.state, to = ?next, "transition");
        }
        self.state = next;
        self.visible_frames = 0;
        if next == MatingState::Searching {
            self.wander.reset();
            self.parts.transponder_off();
        }
        if matches!(next, MatingState::Searching | MatingState::Waiting)
            && self.parts.hub.take_payload().is_some()
        {
            debug!(machine = Self::NAME, state = ?next, "dropped stale peer payload");
        }
        self.parts.detector.start_timer(self.timeout(next));
        self.parts.show(next.face());
    }

    /// Back to Searching with fresh stall counters.  Recovery re-enters
    /// Searching through [`Self::enter`] instead so counts keep piling up
    /// toward a chronic stall.
    fn restart_search(&mut self) {
        self.parts.detector.reset_stall_counters();
        self.enter(MatingState::Searching);
    }

    fn search(&mut self) {
        let command = self.wander.next(&mut self.parts.rng);
        self.parts.drive(command);
    }

    fn decide(&mut self) {
        self.parts.hold_still();
        self.visible_frames += 1;
        if self.visible_frames > self.config.min_visible_frames {
            self.enter(MatingState::Approaching);
        }
    }

    fn approach(&mut self, bearing_error: f32, proximity: f32) {
        self.parts.transponder_on(&self.genes.to_payload());
        self.parts.drive(approach_command(
            bearing_error,
            self.config.gain,
            self.config.static_speed,
        ));
        debug!(machine = Self::NAME, proximity, "approaching");
        if proximity > self.config.min_proximity {
            self.enter(MatingState::Waiting);
        }
    }

    fn wait(&mut self, facing: PeerFacing) {
        self.parts.hold_still();
        if facing != PeerFacing::Front {
            return;
        }
        let Some(payload) = self.parts.hub.take_payload() else {
            return;
        };
        match self.genes.exchange_payload(&payload, &mut self.parts.rng) {
            Ok(_) => self.enter(MatingState::Fleeing),
            // Dropped; the next decoded payload gets another try.
            Err(e) => debug!(machine = Self::NAME, error = %e, "ignoring peer payload"),
        }
    }

    fn flee(&mut self) {
        self.parts.transponder_off();
        let sequence = ActionSequence::reverse_and_turn("flee", &mut self.parts.rng);
        self.parts.play(&sequence);
        self.restart_search();
        self.parts.rearm();
    }
}

impl Behavior for MatingMachine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn on_start(&mut self) {
        self.restart_search();
    }

    fn on_stop(&mut self) {
        self.parts.transponder_off();
        self.parts.halt();
    }

    fn tick(&mut self) {
        if self.parts.detector.is_stuck() {
            warn!(machine = Self::NAME, state = ?self.state, "stuck, running recovery");
            self.parts.recover();
            self.enter(MatingState::Searching);
            self.parts.rearm();
        }

        let target = self.parts.target.latest();
        if !target.acquired {
            if self.state != MatingState::Searching {
                self.restart_search();
            }
            self.search();
            return;
        }

        match self.state {
            MatingState::Searching => {
                self.parts.hold_still();
                self.enter(MatingState::Deciding);
            }
            MatingState::Deciding => self.decide(),
            MatingState::Approaching => self.approach(target.bearing_error, target.proximity),
            MatingState::Waiting => self.wait(target.peer_facing),
            MatingState::Fleeing => self.flee(),
        }
    }
}
