//! A toy arena for the simulated rig.
//!
//! One charging puck and one peer robot live at a bearing relative to the
//! camera.  Turning shifts both bearings, driving forward shrinks the
//! distance to the puck, and the wheel odometry follows whatever the
//! governor last dispatched through the same voltage model the stall
//! evaluator expects.  Nothing here is physically accurate; it only has to
//! exercise every state of both machines.

use std::time::Duration;

use puckbot_kernel::StallModel;
use puckbot_perception::SensorHub;
use puckbot_types::{
    BatterySample, BoundingBox, ChargerSample, Detection, Face, StateCode, WheelCommand,
    WheelTelemetry,
};
use rand::Rng;
use rand::rngs::StdRng;

const FRAME: f32 = 320.0;
const TURN_GAIN: f32 = 0.08;
const APPROACH_GAIN: f32 = 0.02;
const DRAIN_PER_TICK: f64 = 0.0004;
const CHARGE_PER_TICK: f64 = 0.004;
const MOUNT_TICKS: u32 = 8;

pub struct SimWorld {
    model: StallModel,
    rng: StdRng,
    elapsed_ms: u64,
    battery: f64,
    puck_bearing: f32,
    puck_distance: f32,
    peer_bearing: f32,
    mount_ticks: u32,
    wheels: WheelTelemetry,
}

impl SimWorld {
    pub fn new(model: StallModel, mut rng: StdRng) -> Self {
        Self {
            battery: model.v_nominal,
            puck_bearing: rng.random_range(-2.0..2.0),
            puck_distance: 1.0,
            peer_bearing: rng.random_range(-2.0..2.0),
            model,
            rng,
            elapsed_ms: 0,
            mount_ticks: 0,
            wheels: WheelTelemetry::default(),
        }
    }

    pub fn battery(&self) -> f64 {
        self.battery
    }

    /// Advance by `dt` under `output` and publish the resulting samples.
    pub fn step(&mut self, dt: Duration, output: WheelCommand, state: StateCode, hub: &SensorHub) {
        self.elapsed_ms += u64::try_from(dt.as_millis()).unwrap_or(u64::MAX);
        let secs = dt.as_secs_f64();

        let turn = output.right - output.left;
        let forward = (output.left + output.right) * 0.5;
        self.puck_bearing = wrap(self.puck_bearing - turn * TURN_GAIN);
        self.peer_bearing = wrap(self.peer_bearing - turn * TURN_GAIN + self.rng.random_range(-0.02..0.02));
        if self.puck_bearing.abs() < 1.0 {
            self.puck_distance = (self.puck_distance - forward * APPROACH_GAIN).clamp(0.05, 1.0);
        }

        let mounted = if state == Face::ChargingMounting.code() {
            self.mount_ticks += 1;
            self.mount_ticks > MOUNT_TICKS
        } else {
            self.mount_ticks = 0;
            state == Face::ChargingCharging.code()
        };
        if mounted {
            self.battery += CHARGE_PER_TICK;
        } else {
            let load = f64::from(output.left.abs() + output.right.abs());
            self.battery -= DRAIN_PER_TICK * (1.0 + load);
        }
        if state == Face::ChargingDismounting.code() {
            self.puck_distance = 1.0;
        }

        let left = self.model.expected_speed(output.left, Some(self.battery));
        let right = self.model.expected_speed(output.right, Some(self.battery));
        self.wheels.timestamp_ms = self.elapsed_ms;
        self.wheels.distance_left += left * secs;
        self.wheels.distance_right += right * secs;
        self.wheels.speed_instant_left = left;
        self.wheels.speed_instant_right = right;
        self.wheels.speed_buffered_left = left;
        self.wheels.speed_buffered_right = right;
        self.wheels.speed_exp_avg_left += 0.3 * (left - self.wheels.speed_exp_avg_left);
        self.wheels.speed_exp_avg_right += 0.3 * (right - self.wheels.speed_exp_avg_right);

        hub.on_wheels(self.wheels);
        hub.on_battery(BatterySample {
            voltage: self.battery,
            timestamp_ms: self.elapsed_ms,
        });
        hub.on_charger(ChargerSample {
            charger_voltage: if mounted { 2.5 } else { 0.1 },
            coil_voltage: if mounted { 1.2 } else { 0.0 },
            timestamp_ms: self.elapsed_ms,
        });
    }

    /// Detections for the current frame.  A visible peer facing the camera
    /// also makes its payload readable.
    pub fn frame(&mut self, hub: &SensorHub) -> Vec<Detection> {
        let mut detections = Vec::new();
        if let Some(bbox) = bbox_at(self.puck_bearing, 1.0 - self.puck_distance) {
            detections.push(Detection {
                confidence: 0.9,
                label: "puck_red".to_string(),
                bbox,
            });
        }
        if let Some(bbox) = bbox_at(self.peer_bearing, 0.6) {
            let front = self.rng.random_bool(0.5);
            let label = if front { "robot_front" } else { "robot_back" };
            if front && self.rng.random_bool(0.3) {
                let genes: Vec<i32> = (0..10).map(|_| self.rng.random_range(0..5)).collect();
                hub.on_payload(format!("{genes:?}"));
            }
            detections.push(Detection {
                confidence: 0.85,
                label: label.to_string(),
                bbox,
            });
        }
        detections
    }
}

/// Keep bearings in [-3, 3): anything past ±1 is behind the frame edge.
fn wrap(bearing: f32) -> f32 {
    (bearing + 3.0).rem_euclid(6.0) - 3.0
}

/// Square box centered on `bearing` whose area fraction grows with
/// `closeness` in [0, 1].  `None` when the bearing is out of frame.
fn bbox_at(bearing: f32, closeness: f32) -> Option<BoundingBox> {
    if bearing.abs() >= 1.0 {
        return None;
    }
    let center = FRAME * 0.5 - bearing * FRAME * 0.5;
    let half = FRAME * (0.05 + 0.3 * closeness.clamp(0.0, 1.0));
    Some(BoundingBox::new(center - half, FRAME * 0.5 - half, center + half, FRAME * 0.5 + half))
}
