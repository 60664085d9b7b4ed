use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One of the two drive wheels of the differential base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WheelSide {
    Left,
    Right,
}

impl WheelSide {
    /// Both wheels, left first.  Per-wheel arrays are indexed in this order.
    pub const ALL: [WheelSide; 2] = [WheelSide::Left, WheelSide::Right];

    /// Index of this wheel in a `[_; 2]` per-wheel array.
    pub fn index(self) -> usize {
        match self {
            WheelSide::Left => 0,
            WheelSide::Right => 1,
        }
    }
}

/// Normalized differential-drive command, each wheel in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelCommand {
    pub left: f32,
    pub right: f32,
}

impl WheelCommand {
    pub const ZERO: WheelCommand = WheelCommand {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Same value on both wheels.
    pub fn both(value: f32) -> Self {
        Self::new(value, value)
    }

    pub fn get(&self, side: WheelSide) -> f32 {
        match side {
            WheelSide::Left => self.left,
            WheelSide::Right => self.right,
        }
    }

    /// Clamp both wheels into the actuator's valid range `[-1, 1]`.
    pub fn clamped(self) -> Self {
        Self::new(self.left.clamp(-1.0, 1.0), self.right.clamp(-1.0, 1.0))
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

/// Which side of a peer robot the camera currently sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PeerFacing {
    Front,
    Back,
    #[default]
    Invisible,
}

/// Latest perception result for one class of interest.
///
/// Overwritten wholesale on every processed frame.  `bearing_error` is 0 when
/// the target is centered and ±1 at the frame edges; `proximity` is the
/// bounding-box area normalized to the frame area.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetObservation {
    pub acquired: bool,
    pub bearing_error: f32,
    pub proximity: f32,
    pub peer_facing: PeerFacing,
}

impl TargetObservation {
    /// Observation published when nothing of interest is in view.
    pub fn lost() -> Self {
        Self::default()
    }

    pub fn acquired(bearing_error: f32, proximity: f32) -> Self {
        Self {
            acquired: true,
            bearing_error,
            proximity,
            peer_facing: PeerFacing::Invisible,
        }
    }

    pub fn with_facing(mut self, facing: PeerFacing) -> Self {
        self.peer_facing = facing;
        self
    }
}

/// High-level behavior mode chosen by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Charging,
    Mating,
}

/// Integer code of the active machine state, written to the usage log.
pub type StateCode = u8;

/// Discrete status symbol shown to peers and observers, one per machine state.
///
/// The numeric [`Face::code`] doubles as the `State` column of the usage log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    MatingSearching,
    MatingDeciding,
    MatingApproaching,
    MatingWaiting,
    MatingFleeing,
    ChargingSearching,
    ChargingMounting,
    ChargingCharging,
    ChargingDismounting,
    ChargingDeciding,
}

impl Face {
    pub fn code(self) -> StateCode {
        match self {
            Face::MatingSearching => 0,
            Face::MatingDeciding => 1,
            Face::MatingApproaching => 2,
            Face::MatingWaiting => 3,
            Face::MatingFleeing => 4,
            Face::ChargingSearching => 5,
            Face::ChargingMounting => 6,
            Face::ChargingCharging => 7,
            Face::ChargingDismounting => 8,
            Face::ChargingDeciding => 9,
        }
    }
}

/// Axis-aligned bounding box in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center_x(&self) -> f32 {
        (self.left + self.right) * 0.5
    }
}

/// A single detector output for one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub confidence: f32,
    pub label: String,
    pub bbox: BoundingBox,
}

/// Periodic odometry sample from the wheel driver.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelTelemetry {
    pub timestamp_ms: u64,
    pub distance_left: f64,
    pub distance_right: f64,
    pub speed_instant_left: f64,
    pub speed_instant_right: f64,
    pub speed_buffered_left: f64,
    pub speed_buffered_right: f64,
    pub speed_exp_avg_left: f64,
    pub speed_exp_avg_right: f64,
}

impl WheelTelemetry {
    /// Buffered speed of one wheel; this is what stall evaluation compares
    /// against.
    pub fn buffered_speed(&self, side: WheelSide) -> f64 {
        match side {
            WheelSide::Left => self.speed_buffered_left,
            WheelSide::Right => self.speed_buffered_right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatterySample {
    pub voltage: f64,
    pub timestamp_ms: u64,
}

/// Charger-side sample.  `charger_voltage` is the charge-sense signal the
/// charging machine treats as current.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChargerSample {
    pub charger_voltage: f64,
    pub coil_voltage: f64,
    pub timestamp_ms: u64,
}

/// Notification raised by the safety layer towards the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Name of the machine whose detector raised the event.
    pub source: String,
    pub payload: SafetyPayload,
}

impl SafetyEvent {
    pub fn new(source: impl Into<String>, payload: SafetyPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SafetyPayload {
    /// A wheel stayed stalled past the shutdown threshold.  All machines must
    /// stop until an explicit restore.
    StallShutdown { side: WheelSide, stall_ticks: u32 },
    /// A state watchdog expired before being rearmed.
    WatchdogExpired { timeout_ms: u64 },
}

/// Crate-wide error type for hardware, payload, and configuration failures.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum PuckError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Malformed peer payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_command_clamps_into_actuator_range() {
        let cmd = WheelCommand::new(1.7, -2.0).clamped();
        assert_eq!(cmd, WheelCommand::new(1.0, -1.0));

        let inside = WheelCommand::new(0.3, -0.4).clamped();
        assert_eq!(inside, WheelCommand::new(0.3, -0.4));
    }

    #[test]
    fn wheel_side_indexes_match_all_order() {
        for (i, side) in WheelSide::ALL.iter().enumerate() {
            assert_eq!(side.index(), i);
        }
    }

    #[test]
    fn lost_observation_is_not_acquired() {
        let obs = TargetObservation::lost();
        assert!(!obs.acquired);
        assert_eq!(obs.peer_facing, PeerFacing::Invisible);
    }

    #[test]
    fn face_codes_are_unique() {
        let faces = [
            Face::MatingSearching,
            Face::MatingDeciding,
            Face::MatingApproaching,
            Face::MatingWaiting,
            Face::MatingFleeing,
            Face::ChargingSearching,
            Face::ChargingMounting,
            Face::ChargingCharging,
            Face::ChargingDismounting,
            Face::ChargingDeciding,
        ];
        let mut codes: Vec<StateCode> = faces.iter().map(|f| f.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes, (0..10).collect::<Vec<StateCode>>());
    }

    #[test]
    fn bounding_box_geometry() {
        let bbox = BoundingBox::new(10.0, 20.0, 50.0, 40.0);
        assert!((bbox.area() - 800.0).abs() < f32::EPSILON);
        assert!((bbox.center_x() - 30.0).abs() < f32::EPSILON);

        let inverted = BoundingBox::new(50.0, 40.0, 10.0, 20.0);
        assert_eq!(inverted.area(), 0.0);
    }

    #[test]
    fn safety_event_roundtrip() {
        let event = SafetyEvent::new(
            "charging",
            SafetyPayload::StallShutdown {
                side: WheelSide::Right,
                stall_ticks: 16,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: SafetyEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(back.source, "charging");
        assert_eq!(back.payload, event.payload);
    }

    #[test]
    fn puck_error_display() {
        let err = PuckError::HardwareFault {
            component: "left_wheel".to_string(),
            details: "driver offline".to_string(),
        };
        assert!(err.to_string().contains("left_wheel"));

        let err2 = PuckError::MalformedPayload("[1, x]".to_string());
        assert!(err2.to_string().contains("Malformed"));
    }
}
