//! Fixed-timestep execution of behaviors.
//!
//! A [`Behavior`] is the per-tick logic of one machine.  [`PeriodicTask`]
//! owns it and drives it on a tokio interval; through the object-safe
//! [`Controller`] trait the supervisor and the
//! [`ControllerComposer`][crate::composer::ControllerComposer] handle every
//! machine uniformly.
//!
//! Each tick body runs on the blocking pool.  Action sequences hold their
//! thread for seconds by design, and must not stall the async workers that
//! fire deadline timers and stall evaluations.
//!
//! # Stop semantics
//!
//! `stop` bumps an epoch counter before aborting the loop.  A tick that was
//! already handed to the blocking pool checks the epoch under the behavior
//! lock and skips itself, so no command is issued after `on_stop` zeroed the
//! output.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

// ────────────────────────────────────────────────────────────────────────────
// Traits
// ────────────────────────────────────────────────────────────────────────────

/// Per-tick logic of one machine.
pub trait Behavior: Send + 'static {
    fn name(&self) -> &str;

    /// Run one control step.  May block for the duration of an action
    /// sequence.
    fn tick(&mut self);

    /// Called by `start` before the first tick.
    fn on_start(&mut self) {}

    /// Called by `stop`.  Must leave the actuator at zero.
    fn on_stop(&mut self) {}
}

/// Lifecycle surface shared by every periodic machine.
pub trait Controller: Send + Sync {
    fn name(&self) -> &str;

    /// Arm periodic invocation.  No-op while already running.
    fn start(&self);

    /// Halt invocation and command zero output.
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Run one tick synchronously on the caller's thread.
    fn tick(&self);
}

// ────────────────────────────────────────────────────────────────────────────
// PeriodicTask
// ────────────────────────────────────────────────────────────────────────────

pub struct PeriodicTask<B: Behavior> {
    name: String,
    behavior: Arc<Mutex<B>>,
    timestep: Duration,
    handle: Handle,
    runner: Mutex<Option<JoinHandle<()>>>,
    epoch: Arc<AtomicU64>,
}

impl<B: Behavior> PeriodicTask<B> {
    pub fn new(behavior: B, timestep: Duration, handle: Handle) -> Self {
        Self {
            name: behavior.name().to_string(),
            behavior: Arc::new(Mutex::new(behavior)),
            timestep,
            handle,
            runner: Mutex::new(None),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn timestep(&self) -> Duration {
        self.timestep
    }

    /// Run `f` against the behavior under its lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(&lock(&self.behavior))
    }

    /// Run `f` against the behavior mutably under its lock.
    pub fn with_behavior<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut lock(&self.behavior))
    }

    fn spawn_loop(&self, epoch: u64) -> JoinHandle<()> {
        let behavior = Arc::clone(&self.behavior);
        let current = Arc::clone(&self.epoch);
        let timestep = self.timestep;
        let name = self.name.clone();

        self.handle.spawn(async move {
            let mut interval = tokio::time::interval(timestep);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let behavior = Arc::clone(&behavior);
                let current = Arc::clone(&current);
                let step = tokio::task::spawn_blocking(move || {
                    let mut b = lock(&behavior);
                    if current.load(Ordering::Acquire) == epoch {
                        b.tick();
                    }
                })
                .await;
                if let Err(e) = step {
                    if e.is_panic() {
                        error!(machine = %name, "tick panicked, stopping loop");
                        break;
                    }
                }
            }
        })
    }
}

fn lock<B>(behavior: &Mutex<B>) -> MutexGuard<'_, B> {
    behavior.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<B: Behavior> Controller for PeriodicTask<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) {
        let mut runner = self.runner.lock().unwrap_or_else(PoisonError::into_inner);
        if runner.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!(machine = %self.name, "already running");
            return;
        }
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        lock(&self.behavior).on_start();
        *runner = Some(self.spawn_loop(epoch));
        info!(
            machine = %self.name,
            timestep_ms = u64::try_from(self.timestep.as_millis()).unwrap_or(u64::MAX),
            "controller started"
        );
    }

    fn stop(&self) {
        let task = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = &task {
            task.abort();
        }
        lock(&self.behavior).on_stop();
        if task.is_some() {
            info!(machine = %self.name, "controller stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn tick(&self) {
        lock(&self.behavior).tick();
    }
}

impl<B: Behavior> Drop for PeriodicTask<B> {
    fn drop(&mut self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self
            .runner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default, Clone)]
    struct Counters {
        ticks: Arc<AtomicUsize>,
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    struct Counting(Counters);

    impl Behavior for Counting {
        fn name(&self) -> &str {
            "counting"
        }
        fn tick(&mut self) {
            self.0.ticks.fetch_add(1, Ordering::SeqCst);
        }
        fn on_start(&mut self) {
            self.0.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_stop(&mut self) {
            self.0.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn task(counters: &Counters) -> PeriodicTask<Counting> {
        PeriodicTask::new(
            Counting(counters.clone()),
            Duration::from_millis(100),
            Handle::current(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_fixed_timestep() {
        let c = Counters::default();
        let t = task(&c);
        t.start();
        assert!(t.is_running());

        tokio::time::sleep(Duration::from_millis(1050)).await;
        let ticks = c.ticks.load(Ordering::SeqCst);
        // First tick fires immediately, then every 100 ms.
        assert!((9..=11).contains(&ticks), "ticks = {ticks}");
        t.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_does_not_double_schedule() {
        let c = Counters::default();
        let t = task(&c);
        t.start();
        t.start();
        assert_eq!(c.starts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1050)).await;
        assert!(c.ticks.load(Ordering::SeqCst) <= 11);
        t.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_ticks_and_calls_on_stop() {
        let c = Counters::default();
        let t = task(&c);
        t.start();
        tokio::time::sleep(Duration::from_millis(350)).await;
        t.stop();
        assert!(!t.is_running());
        assert_eq!(c.stops.load(Ordering::SeqCst), 1);

        let frozen = c.ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(c.ticks.load(Ordering::SeqCst), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_machine_leaves_wheels_at_zero_and_nothing_pending() {
        use crate::charging::ChargingMachine;
        use crate::config::RobotConfig;
        use crate::machine::testing::bench;
        use puckbot_types::{WheelCommand, WheelSide};
        use rand::SeedableRng;
        use rand::rngs::StdRng;

        let bench = bench();
        let config = RobotConfig::default();
        let parts = bench
            .wiring
            .parts(ChargingMachine::NAME, &config, StdRng::seed_from_u64(3));
        let t = PeriodicTask::new(
            ChargingMachine::new(parts, config.charging.clone()),
            config.timestep(),
            Handle::current(),
        );
        t.start();

        // Ticks at 0 and 200 ms; the second evaluation is still due at 350 ms.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(t.inspect(|m| m.parts().governor.pending_evaluations()) > 0);
        let dispatched = bench.rig.wheels.lock().unwrap().history().len();
        assert!(dispatched >= 2);

        t.stop();
        assert_eq!(t.inspect(|m| m.parts().governor.pending_evaluations()), 0);
        assert!(!t.inspect(|m| m.parts().detector.timer_armed()));
        let history = bench.rig.wheels.lock().unwrap().history().to_vec();
        assert_eq!(history.len(), dispatched + 1);
        assert_eq!(history.last(), Some(&WheelCommand::ZERO));

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(bench.rig.wheels.lock().unwrap().history().len(), dispatched + 1);
        let record = t.inspect(|m| m.parts().detector.record(WheelSide::Left));
        // Only the evaluation that came due before the stop was counted.
        assert!(record.consecutive_stall_ticks + record.consecutive_free_ticks <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop() {
        let c = Counters::default();
        let t = task(&c);
        t.start();
        t.stop();
        t.start();
        assert!(t.is_running());
        assert_eq!(c.starts.load(Ordering::SeqCst), 2);
        t.stop();
    }

    #[tokio::test]
    async fn manual_tick_runs_synchronously() {
        let c = Counters::default();
        let t = task(&c);
        t.tick();
        t.tick();
        assert_eq!(c.ticks.load(Ordering::SeqCst), 2);
        assert!(!t.is_running());
    }
}
