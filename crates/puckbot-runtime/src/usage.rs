//! [`UsageRecorder`] – periodic sampling into the usage CSV.
//!
//! The recorder runs as its own tokio task with two intervals: a fast one
//! that appends a [`UsageRow`] and a slow one that flushes.  Stopping it
//! through [`RecorderHandle::shutdown`] flushes whatever is still buffered.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use puckbot_memory::{UsageLog, UsageRow};
use puckbot_perception::{SensorCell, SensorHub};
use puckbot_types::WheelCommand;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::UsageConfig;
use crate::machine::StateCell;

#[derive(Clone)]
pub struct UsageRecorder {
    hub: Arc<SensorHub>,
    state: StateCell,
    output: SensorCell<WheelCommand>,
    sample_period: Duration,
    flush_period: Duration,
}

impl UsageRecorder {
    pub fn new(
        hub: Arc<SensorHub>,
        state: StateCell,
        output: SensorCell<WheelCommand>,
        config: &UsageConfig,
    ) -> Self {
        Self {
            hub,
            state,
            output,
            sample_period: Duration::from_millis(config.sample_period_ms.max(1)),
            flush_period: Duration::from_millis(config.flush_period_ms.max(1)),
        }
    }

    /// One row from the current contents of the shared cells.  A battery
    /// that has not reported yet is logged as 0.
    pub fn sample(&self) -> UsageRow {
        let wheels = self.hub.wheels();
        let output = self.output.latest();
        UsageRow {
            battery_level: self.hub.battery_voltage().unwrap_or(0.0),
            state: self.state.get(),
            distance_left: wheels.distance_left,
            distance_right: wheels.distance_right,
            speed_exp_left: wheels.speed_exp_avg_left,
            speed_exp_right: wheels.speed_exp_avg_right,
            speed_buffered_left: wheels.speed_buffered_left,
            speed_buffered_right: wheels.speed_buffered_right,
            output_left: output.left,
            output_right: output.right,
        }
    }

    /// Start sampling into `log` on `handle`.
    pub fn spawn<W>(self, log: UsageLog<W>, handle: &Handle) -> RecorderHandle<W>
    where
        W: Write + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = handle.spawn(async move {
            let mut log = log;
            let mut sample = tokio::time::interval(self.sample_period);
            sample.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut flush = tokio::time::interval(self.flush_period);
            flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Both intervals complete their first tick immediately.
            flush.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = sample.tick() => {
                        if let Err(e) = log.append(&self.sample()) {
                            warn!(error = %e, "usage row dropped");
                        }
                    }
                    _ = flush.tick() => {
                        match log.flush() {
                            Ok(()) => debug!(rows = log.rows(), "usage log flushed"),
                            Err(e) => warn!(error = %e, "usage log flush failed"),
                        }
                    }
                }
            }

            if let Err(e) = log.flush() {
                warn!(error = %e, "final usage log flush failed");
            }
            info!(rows = log.rows(), "usage recorder stopped");
            log
        });
        RecorderHandle {
            stop: Some(stop_tx),
            task,
        }
    }
}

/// Owner of a running recorder task.
pub struct RecorderHandle<W: Write> {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<UsageLog<W>>,
}

impl<W: Write> RecorderHandle<W> {
    /// Stop sampling, flush, and hand the log back.  `None` if the task
    /// panicked or was aborted.
    pub async fn shutdown(mut self) -> Option<UsageLog<W>> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match (&mut self.task).await {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(error = %e, "usage recorder task failed");
                None
            }
        }
    }
}
