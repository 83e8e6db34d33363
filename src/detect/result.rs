use serde::{Deserialize, Serialize};

/// One classified bead ("ball") in a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Center in pixels, rotation-normalized frame coordinates.
    pub x: i32,
    pub y: i32,
    #[serde(rename = "r_px")]
    pub radius_px: f64,
    pub diameter_mm: f64,
    /// Label of the first size bin containing `diameter_mm`.
    #[serde(rename = "cls")]
    pub class: i32,
    /// Heuristic weight in [0, 1]; not comparable across detector paths.
    #[serde(rename = "conf")]
    pub confidence: f64,
}

/// All detections for one processed frame. One line of the result log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_id: u64,
    /// Seconds from stream start (`frame_id / fps`, or 0 without fps).
    pub timestamp: f64,
    #[serde(rename = "balls", default)]
    pub detections: Vec<Detection>,
}

impl FrameRecord {
    pub fn new(frame_id: u64, timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            frame_id,
            timestamp,
            detections,
        }
    }
}
