//! Ranging sensor readings.

use serde::Serialize;
use thiserror::Error;

/// One tracked object relative to the ego vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadarPoint {
    pub track_id: u32,
    /// Longitudinal distance (m).
    pub d_rel: f32,
    /// Lateral distance, left positive (m).
    pub y_rel: f32,
    /// Relative speed (m/s).
    pub v_rel: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum RadarError {
    #[error("malformed radar frame 0x{id:x} ({len} bytes)")]
    Malformed { id: u32, len: usize },
    #[error("radar sensor reported a fault")]
    Fault,
    #[error("unexpected trigger frame 0x{id:x} on channel {channel}")]
    UnexpectedTrigger { channel: u8, id: u32 },
}

/// Structured output of a ranging interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RadarReading {
    pub points: Vec<RadarPoint>,
    /// Problems tolerated while producing this reading.
    pub errors: Vec<RadarError>,
    /// True when the reading reflects a complete sensor scan.
    pub valid: bool,
}

impl RadarReading {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
