//! [`SensorHub`] – ingestion point for the driver-side sample streams.
//!
//! Each `on_*` method is called from whichever thread the collaborator
//! delivers on.  Smoothing state is serialized behind one mutex; the
//! smoothed results land in lock-free [`ScalarCell`]s so readers never wait
//! on a writer.

use std::sync::{Mutex, PoisonError};

use puckbot_types::{BatterySample, ChargerSample, WheelTelemetry};
use tracing::trace;

use crate::cache::{ScalarCell, SensorCell};
use crate::filter::SmoothedScalar;

/// Smoothing factor for battery, charger and coil signals.
pub const SIGNAL_ALPHA: f64 = 0.1;
/// Smoothing factor for the slow battery trend the mode selector uses.
pub const TREND_ALPHA: f64 = 0.01;

struct Filters {
    battery: SmoothedScalar,
    trend: SmoothedScalar,
    charger: SmoothedScalar,
    coil: SmoothedScalar,
}

/// Latest-value caches for every sensor channel the core consumes.
pub struct SensorHub {
    filters: Mutex<Filters>,
    battery: ScalarCell,
    battery_trend: ScalarCell,
    charger: ScalarCell,
    coil: ScalarCell,
    wheels: SensorCell<WheelTelemetry>,
    payload: SensorCell<Option<String>>,
}

impl SensorHub {
    pub fn new() -> Self {
        Self::with_alphas(SIGNAL_ALPHA, TREND_ALPHA)
    }

    pub fn with_alphas(signal_alpha: f64, trend_alpha: f64) -> Self {
        Self {
            filters: Mutex::new(Filters {
                battery: SmoothedScalar::new(signal_alpha),
                trend: SmoothedScalar::new(trend_alpha),
                charger: SmoothedScalar::new(signal_alpha),
                coil: SmoothedScalar::new(signal_alpha),
            }),
            battery: ScalarCell::new(),
            battery_trend: ScalarCell::new(),
            charger: ScalarCell::new(),
            coil: ScalarCell::new(),
            wheels: SensorCell::default(),
            payload: SensorCell::default(),
        }
    }

    // ── ingestion ────────────────────────────────────────────────────────

    pub fn on_battery(&self, sample: BatterySample) {
        let mut f = self.filters.lock().unwrap_or_else(PoisonError::into_inner);
        self.battery.store(f.battery.update(sample.voltage));
        self.battery_trend.store(f.trend.update(sample.voltage));
        trace!(voltage = sample.voltage, ts = sample.timestamp_ms, "battery sample");
    }

    pub fn on_charger(&self, sample: ChargerSample) {
        let mut f = self.filters.lock().unwrap_or_else(PoisonError::into_inner);
        self.charger.store(f.charger.update(sample.charger_voltage));
        self.coil.store(f.coil.update(sample.coil_voltage));
    }

    pub fn on_wheels(&self, sample: WheelTelemetry) {
        self.wheels.publish(sample);
    }

    /// A decoded peer payload became visible.
    pub fn on_payload(&self, text: impl Into<String>) {
        self.payload.publish(Some(text.into()));
    }

    // ── readers ──────────────────────────────────────────────────────────

    /// Smoothed battery voltage, `None` before the first sample.
    pub fn battery_voltage(&self) -> Option<f64> {
        self.battery.load()
    }

    /// Slow battery trend used for mode hysteresis.
    pub fn battery_trend(&self) -> Option<f64> {
        self.battery_trend.load()
    }

    /// Smoothed charge-sense signal, 0 before the first sample.
    pub fn charger_current(&self) -> f64 {
        self.charger.load_or(0.0)
    }

    pub fn coil_current(&self) -> f64 {
        self.coil.load_or(0.0)
    }

    pub fn wheels(&self) -> WheelTelemetry {
        self.wheels.latest()
    }

    /// Handle to the battery cell, for components that only need voltage.
    pub fn battery_cell(&self) -> ScalarCell {
        self.battery.clone()
    }

    pub fn wheel_cell(&self) -> SensorCell<WheelTelemetry> {
        self.wheels.clone()
    }

    /// Consume the pending peer payload, if any.
    pub fn take_payload(&self) -> Option<String> {
        self.payload.take()
    }

    pub fn has_payload(&self) -> bool {
        self.payload.latest().is_some()
    }
}

impl Default for SensorHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery(v: f64) -> BatterySample {
        BatterySample {
            voltage: v,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn readers_see_nothing_before_first_sample() {
        let hub = SensorHub::new();
        assert!(hub.battery_voltage().is_none());
        assert!(hub.battery_trend().is_none());
        assert_eq!(hub.charger_current(), 0.0);
    }

    #[test]
    fn battery_smoothed_and_trended_independently() {
        let hub = SensorHub::with_alphas(0.5, 0.1);
        hub.on_battery(battery(3.0));
        hub.on_battery(battery(4.0));
        assert!((hub.battery_voltage().unwrap() - 3.5).abs() < 1e-9);
        assert!((hub.battery_trend().unwrap() - 3.1).abs() < 1e-9);
    }

    #[test]
    fn battery_cell_handle_tracks_hub() {
        let hub = SensorHub::new();
        let cell = hub.battery_cell();
        hub.on_battery(battery(3.3));
        assert_eq!(cell.load(), Some(3.3));
    }

    #[test]
    fn charger_sample_updates_both_channels() {
        let hub = SensorHub::new();
        hub.on_charger(ChargerSample {
            charger_voltage: 2.5,
            coil_voltage: 1.2,
            timestamp_ms: 10,
        });
        assert_eq!(hub.charger_current(), 2.5);
        assert_eq!(hub.coil_current(), 1.2);
    }

    #[test]
    fn wheel_sample_overwrites() {
        let hub = SensorHub::new();
        hub.on_wheels(WheelTelemetry {
            speed_buffered_left: 10.0,
            ..Default::default()
        });
        hub.on_wheels(WheelTelemetry {
            speed_buffered_left: 20.0,
            ..Default::default()
        });
        assert_eq!(hub.wheels().speed_buffered_left, 20.0);
    }

    #[test]
    fn payload_is_consumed_once() {
        let hub = SensorHub::new();
        hub.on_payload("[1, 2, 3]");
        assert!(hub.has_payload());
        assert_eq!(hub.take_payload().as_deref(), Some("[1, 2, 3]"));
        assert!(hub.take_payload().is_none());
    }
}
