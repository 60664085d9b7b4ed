//! Detection → [`TargetObservation`] selection.
//!
//! Per processed frame the selector keeps detections above the confidence
//! threshold and, per class of interest, the one with the largest bounding
//! box (the closest).  Bearing and proximity are derived from that box:
//!
//! ```text
//! bearing   = (camera_center − bbox_center_x) / (frame_width / 2)
//! proximity = bbox_area / frame_area
//! ```

use puckbot_types::{Detection, PeerFacing, TargetObservation};

pub const PUCK_LABEL: &str = "puck_red";
pub const PEER_FRONT_LABEL: &str = "robot_front";
pub const PEER_BACK_LABEL: &str = "robot_back";

/// The two observations extracted from one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTargets {
    /// Charging puck.
    pub puck: TargetObservation,
    /// Peer robot, with `peer_facing` set from the detected side.
    pub peer: TargetObservation,
}

#[derive(Debug, Clone)]
pub struct TargetSelector {
    frame_width: f32,
    frame_height: f32,
    /// Horizontal pixel the camera actually points at; the camera is not
    /// mounted on the frame center line.
    camera_center: f32,
    min_confidence: f32,
}

impl TargetSelector {
    pub fn new(frame_width: f32, frame_height: f32, camera_center: f32, min_confidence: f32) -> Self {
        Self {
            frame_width,
            frame_height,
            camera_center,
            min_confidence,
        }
    }

    pub fn select(&self, detections: &[Detection]) -> FrameTargets {
        let mut puck: Option<&Detection> = None;
        let mut peer: Option<&Detection> = None;

        for det in detections.iter().filter(|d| d.confidence > self.min_confidence) {
            let slot = match det.label.as_str() {
                PUCK_LABEL => &mut puck,
                PEER_FRONT_LABEL | PEER_BACK_LABEL => &mut peer,
                _ => continue,
            };
            if slot.is_none_or(|best| det.bbox.area() > best.bbox.area()) {
                *slot = Some(det);
            }
        }

        FrameTargets {
            puck: puck.map_or_else(TargetObservation::lost, |d| self.observe(d)),
            peer: peer.map_or_else(TargetObservation::lost, |d| {
                let facing = if d.label == PEER_FRONT_LABEL {
                    PeerFacing::Front
                } else {
                    PeerFacing::Back
                };
                self.observe(d).with_facing(facing)
            }),
        }
    }

    fn observe(&self, det: &Detection) -> TargetObservation {
        let half_width = (self.frame_width * 0.5).max(f32::EPSILON);
        let frame_area = (self.frame_width * self.frame_height).max(f32::EPSILON);
        let bearing = (self.camera_center - det.bbox.center_x()) / half_width;
        let proximity = det.bbox.area() / frame_area;
        TargetObservation::acquired(bearing.clamp(-1.0, 1.0), proximity.clamp(0.0, 1.0))
    }
}

impl Default for TargetSelector {
    fn default() -> Self {
        Self::new(320.0, 320.0, 160.0, 0.8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use puckbot_types::BoundingBox;

    fn det(label: &str, confidence: f32, bbox: BoundingBox) -> Detection {
        Detection {
            confidence,
            label: label.to_string(),
            bbox,
        }
    }

    #[test]
    fn empty_frame_loses_both_targets() {
        let targets = TargetSelector::default().select(&[]);
        assert!(!targets.puck.acquired);
        assert!(!targets.peer.acquired);
    }

    #[test]
    fn centered_puck_has_zero_bearing() {
        let targets = TargetSelector::default().select(&[det(
            PUCK_LABEL,
            0.9,
            BoundingBox::new(140.0, 100.0, 180.0, 140.0),
        )]);
        assert!(targets.puck.acquired);
        assert!(targets.puck.bearing_error.abs() < 1e-6);
        // 40 * 40 / (320 * 320)
        assert!((targets.puck.proximity - 1600.0 / 102_400.0).abs() < 1e-6);
    }

    #[test]
    fn bearing_sign_follows_offset_from_camera_center() {
        let sel = TargetSelector::default();
        let left = sel.select(&[det(PUCK_LABEL, 0.9, BoundingBox::new(0.0, 0.0, 40.0, 40.0))]);
        // center_x = 20 → (160 - 20) / 160 = 0.875
        assert!((left.puck.bearing_error - 0.875).abs() < 1e-6);

        let right = sel.select(&[det(PUCK_LABEL, 0.9, BoundingBox::new(280.0, 0.0, 320.0, 40.0))]);
        assert!((right.puck.bearing_error + 0.875).abs() < 1e-6);
    }

    #[test]
    fn low_confidence_detections_ignored() {
        let targets = TargetSelector::default().select(&[det(
            PUCK_LABEL,
            0.8,
            BoundingBox::new(0.0, 0.0, 100.0, 100.0),
        )]);
        assert!(!targets.puck.acquired);
    }

    #[test]
    fn largest_box_wins_per_class() {
        let targets = TargetSelector::default().select(&[
            det(PUCK_LABEL, 0.95, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            det(PUCK_LABEL, 0.85, BoundingBox::new(100.0, 100.0, 200.0, 200.0)),
            det(PEER_BACK_LABEL, 0.9, BoundingBox::new(0.0, 0.0, 20.0, 20.0)),
            det(PEER_FRONT_LABEL, 0.9, BoundingBox::new(0.0, 0.0, 60.0, 60.0)),
        ]);
        assert!((targets.puck.proximity - 10_000.0 / 102_400.0).abs() < 1e-6);
        assert_eq!(targets.peer.peer_facing, PeerFacing::Front);
    }

    #[test]
    fn back_of_peer_reported_as_back() {
        let targets = TargetSelector::default().select(&[det(
            PEER_BACK_LABEL,
            0.9,
            BoundingBox::new(0.0, 0.0, 60.0, 60.0),
        )]);
        assert!(targets.peer.acquired);
        assert_eq!(targets.peer.peer_facing, PeerFacing::Back);
        assert!(!targets.puck.acquired);
    }

    #[test]
    fn unknown_labels_ignored() {
        let targets = TargetSelector::default().select(&[det(
            "chair",
            0.99,
            BoundingBox::new(0.0, 0.0, 300.0, 300.0),
        )]);
        assert!(!targets.puck.acquired);
        assert!(!targets.peer.acquired);
    }

    #[test]
    fn off_center_camera_clamps_bearing() {
        let sel = TargetSelector::new(320.0, 320.0, 200.0, 0.5);
        let t = sel.select(&[det(PUCK_LABEL, 0.9, BoundingBox::new(300.0, 0.0, 320.0, 10.0))]);
        // (200 - 310) / 160 = -0.6875, within range
        assert!((t.puck.bearing_error + 0.6875).abs() < 1e-6);

        let far = TargetSelector::new(320.0, 320.0, 400.0, 0.5);
        let t = far.select(&[det(PUCK_LABEL, 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0))]);
        assert_eq!(t.puck.bearing_error, 1.0);
    }
}
