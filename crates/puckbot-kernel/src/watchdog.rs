//! [`DeadlineTimer`] – per-machine state watchdog.
//!
//! A machine arms the timer on every state transition with that state's
//! timeout.  If the machine neither rearms nor cancels before the deadline,
//! the timer latches *expired* and the next tick treats the machine as stuck.
//!
//! At most one deadline is outstanding.  Every arm bumps a generation
//! counter under the same lock the expiry task takes, and the expiry task
//! only latches when its captured generation is still current.  A cancelled
//! task that already woke up is therefore a no-op even if `abort` lost the
//! race.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use puckbot_kernel::watchdog::DeadlineTimer;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let timer = DeadlineTimer::new("charging", tokio::runtime::Handle::current());
//! timer.start_timer(Duration::from_millis(100));
//! assert!(!timer.is_expired());
//!
//! tokio::time::sleep(Duration::from_millis(150)).await;
//! assert!(timer.is_expired());
//! # }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use puckbot_types::{SafetyEvent, SafetyPayload};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// ────────────────────────────────────────────────────────────────────────────
// Internal state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct TimerState {
    generation: u64,
    pending: Option<JoinHandle<()>>,
    expired: bool,
}

impl TimerState {
    /// Invalidate any outstanding deadline and return the new generation.
    fn invalidate(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        if let Some(task) = self.pending.take() {
            task.abort();
        }
        self.generation
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DeadlineTimer
// ────────────────────────────────────────────────────────────────────────────

pub struct DeadlineTimer {
    name: String,
    handle: Handle,
    state: Arc<Mutex<TimerState>>,
    events: Option<UnboundedSender<SafetyEvent>>,
}

impl DeadlineTimer {
    /// Create an unarmed timer whose expiry tasks run on `handle`.
    pub fn new(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            name: name.into(),
            handle,
            state: Arc::new(Mutex::new(TimerState::default())),
            events: None,
        }
    }

    /// Also report every expiry as a [`SafetyPayload::WatchdogExpired`].
    pub fn with_events(mut self, events: UnboundedSender<SafetyEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Cancel any outstanding deadline, clear the expired latch and install a
    /// new deadline `timeout` from now.
    pub fn start_timer(&self, timeout: Duration) {
        let mut state = self.lock();
        let generation = state.invalidate();
        state.expired = false;

        let shared = Arc::clone(&self.state);
        let name = self.name.clone();
        let events = self.events.clone();
        state.pending = Some(self.handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            {
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if state.generation != generation {
                    return;
                }
                state.expired = true;
                state.pending = None;
            }
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(machine = %name, timeout_ms, "state watchdog expired");
            if let Some(tx) = events {
                let _ = tx.send(SafetyEvent::new(
                    name,
                    SafetyPayload::WatchdogExpired { timeout_ms },
                ));
            }
        }));
        debug!(
            machine = %self.name,
            generation,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "watchdog armed"
        );
    }

    /// Drop the outstanding deadline without touching the expired latch.
    pub fn cancel(&self) {
        self.lock().invalidate();
    }

    /// Non-blocking read of the expired latch.
    pub fn is_expired(&self) -> bool {
        self.lock().expired
    }

    /// `true` while a deadline is outstanding.
    pub fn is_armed(&self) -> bool {
        self.lock().pending.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Clear the expired latch.  An outstanding deadline stays armed.
    pub fn clear_expired(&self) {
        self.lock().expired = false;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.lock().invalidate();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
