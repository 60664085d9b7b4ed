//! [`RobotConfig`] – every tunable of the control core.
//!
//! All durations are milliseconds.  Every field has a default, so a partial
//! TOML file (or none at all) yields a complete configuration.

use std::time::Duration;

use puckbot_kernel::{StallModel, StallThresholds};
use puckbot_perception::TargetSelector;
use puckbot_types::PuckError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotConfig {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub stall: StallConfig,
    #[serde(default)]
    pub charging: ChargingConfig,
    #[serde(default)]
    pub mating: MatingConfig,
    #[serde(default)]
    pub perception: PerceptionConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub usage: UsageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub timestep_ms: u64,
    /// Delay between a dispatched command and its stall evaluation.
    pub stall_delay_ms: u64,
    /// Fixed RNG seed for reproducible runs.  Random when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            timestep_ms: 200,
            stall_delay_ms: 150,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub v_nominal: f64,
    /// Positive boosts the left wheel, negative the right.
    pub wheel_bias: f32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            v_nominal: 3.3,
            wheel_bias: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StallConfig {
    pub k_pwm: f64,
    pub error_threshold: f64,
    pub stuck_threshold: u32,
    pub shutdown_threshold: u32,
    pub min_free: u32,
}

impl Default for StallConfig {
    fn default() -> Self {
        let t = StallThresholds::default();
        Self {
            k_pwm: StallModel::default().k_pwm,
            error_threshold: t.error_threshold,
            stuck_threshold: t.stuck_threshold,
            shutdown_threshold: t.shutdown_threshold,
            min_free: t.min_free,
        }
    }
}

/// Exploration while no target is in view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Ticks a random wheel pair is held before re-rolling.
    pub hold_ticks: u32,
    pub max_speed: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            hold_ticks: 20,
            max_speed: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargingConfig {
    pub gain: f32,
    pub static_speed: f32,
    pub min_visible_frames: u32,
    pub max_low_current_frames: u32,
    pub charging_current: f64,
    pub charged_voltage: f64,
    pub search: SearchConfig,
    pub searching_timeout_ms: u64,
    pub deciding_timeout_ms: u64,
    pub mounting_timeout_ms: u64,
    pub charging_timeout_ms: u64,
    pub dismounting_timeout_ms: u64,
}

impl Default for ChargingConfig {
    fn default() -> Self {
        Self {
            gain: 0.25,
            static_speed: 0.7,
            min_visible_frames: 10,
            max_low_current_frames: 50,
            charging_current: 2.0,
            charged_voltage: 4.0,
            search: SearchConfig::default(),
            searching_timeout_ms: 15_000,
            deciding_timeout_ms: 10_000,
            mounting_timeout_ms: 10_000,
            charging_timeout_ms: 70_000,
            dismounting_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatingConfig {
    pub gain: f32,
    pub static_speed: f32,
    pub min_visible_frames: u32,
    pub min_proximity: f32,
    pub gene_length: usize,
    pub max_mutation: i32,
    pub search: SearchConfig,
    pub searching_timeout_ms: u64,
    pub deciding_timeout_ms: u64,
    pub approaching_timeout_ms: u64,
    pub waiting_timeout_ms: u64,
    pub fleeing_timeout_ms: u64,
}

impl Default for MatingConfig {
    fn default() -> Self {
        Self {
            gain: 0.45,
            static_speed: 0.5,
            min_visible_frames: 10,
            min_proximity: 0.2,
            gene_length: 10,
            max_mutation: 4,
            search: SearchConfig::default(),
            searching_timeout_ms: 15_000,
            deciding_timeout_ms: 10_000,
            approaching_timeout_ms: 15_000,
            waiting_timeout_ms: 20_000,
            fleeing_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub frame_width: f32,
    pub frame_height: f32,
    pub camera_center: f32,
    pub min_confidence: f32,
    pub signal_alpha: f64,
    pub trend_alpha: f64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            frame_width: 320.0,
            frame_height: 320.0,
            camera_center: 160.0,
            min_confidence: 0.8,
            signal_alpha: 0.1,
            trend_alpha: 0.01,
        }
    }
}

/// Battery hysteresis between the two modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Below this trend voltage mating gives way to charging.
    pub min_mating_voltage: f64,
    /// Above this trend voltage charging gives way to mating.
    pub max_charging_voltage: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_mating_voltage: 2.95,
            max_charging_voltage: 3.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    pub enabled: bool,
    /// Relative paths resolve against the config directory.
    pub log_path: String,
    pub sample_period_ms: u64,
    pub flush_period_ms: u64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: "usage.csv".to_string(),
            sample_period_ms: 10,
            flush_period_ms: 1000,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Derived views
// ────────────────────────────────────────────────────────────────────────────

impl RobotConfig {
    pub fn timestep(&self) -> Duration {
        Duration::from_millis(self.control.timestep_ms)
    }

    pub fn stall_delay(&self) -> Duration {
        Duration::from_millis(self.control.stall_delay_ms)
    }

    pub fn stall_thresholds(&self) -> StallThresholds {
        StallThresholds {
            error_threshold: self.stall.error_threshold,
            stuck_threshold: self.stall.stuck_threshold,
            shutdown_threshold: self.stall.shutdown_threshold,
            min_free: self.stall.min_free,
        }
    }

    pub fn stall_model(&self) -> StallModel {
        StallModel {
            k_pwm: self.stall.k_pwm,
            v_nominal: self.governor.v_nominal,
        }
    }

    pub fn target_selector(&self) -> TargetSelector {
        let p = &self.perception;
        TargetSelector::new(p.frame_width, p.frame_height, p.camera_center, p.min_confidence)
    }

    /// Reject combinations that would break the control invariants.
    pub fn validate(&self) -> Result<(), PuckError> {
        let fail = |msg: String| Err(PuckError::Config(msg));

        if self.control.timestep_ms == 0 {
            return fail("control.timestep_ms must be positive".into());
        }
        if self.control.stall_delay_ms >= self.control.timestep_ms {
            return fail(format!(
                "control.stall_delay_ms ({}) must be shorter than control.timestep_ms ({})",
                self.control.stall_delay_ms, self.control.timestep_ms
            ));
        }
        if self.stall.stuck_threshold >= self.stall.shutdown_threshold {
            return fail(format!(
                "stall.stuck_threshold ({}) must be below stall.shutdown_threshold ({})",
                self.stall.stuck_threshold, self.stall.shutdown_threshold
            ));
        }
        if !(self.governor.v_nominal > 0.0) {
            return fail("governor.v_nominal must be positive".into());
        }
        for (name, alpha) in [
            ("perception.signal_alpha", self.perception.signal_alpha),
            ("perception.trend_alpha", self.perception.trend_alpha),
        ] {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return fail(format!("{name} must be in (0, 1], got {alpha}"));
            }
        }
        if self.selector.min_mating_voltage > self.selector.max_charging_voltage {
            return fail("selector.min_mating_voltage must not exceed selector.max_charging_voltage".into());
        }
        if self.mating.gene_length < 2 {
            return fail("mating.gene_length must be at least 2".into());
        }
        if self.usage.sample_period_ms == 0 || self.usage.flush_period_ms == 0 {
            return fail("usage periods must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RobotConfig::default().validate().is_ok());
    }

    #[test]
    fn stall_delay_must_be_shorter_than_timestep() {
        let mut cfg = RobotConfig::default();
        cfg.control.stall_delay_ms = 200;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("stall_delay_ms"));
    }

    #[test]
    fn stuck_must_be_below_shutdown() {
        let mut cfg = RobotConfig::default();
        cfg.stall.stuck_threshold = 15;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn alpha_range_checked() {
        let mut cfg = RobotConfig::default();
        cfg.perception.signal_alpha = 0.0;
        assert!(cfg.validate().is_err());
        cfg.perception.signal_alpha = 1.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn nominal_voltage_must_be_positive() {
        let mut cfg = RobotConfig::default();
        cfg.governor.v_nominal = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_document_fills_defaults() {
        let cfg: RobotConfig =
            serde_json::from_str(r#"{ "control": { "timestep_ms": 100 }, "mating": { "min_proximity": 0.3 } }"#)
                .unwrap();
        assert_eq!(cfg.control.timestep_ms, 100);
        assert_eq!(cfg.control.stall_delay_ms, 150);
        assert_eq!(cfg.mating.min_proximity, 0.3);
        assert_eq!(cfg.mating.gain, 0.45);
        assert_eq!(cfg.charging, ChargingConfig::default());
        // 150 ms evaluation no longer fits in a 100 ms tick.
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn derived_views_follow_fields() {
        let mut cfg = RobotConfig::default();
        cfg.stall.k_pwm = 100.0;
        cfg.governor.v_nominal = 3.0;
        assert_eq!(cfg.stall_model().k_pwm, 100.0);
        assert_eq!(cfg.stall_model().v_nominal, 3.0);
        assert_eq!(cfg.timestep(), Duration::from_millis(200));
        assert_eq!(cfg.stall_thresholds().shutdown_threshold, 15);
    }
}
