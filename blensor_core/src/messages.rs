// blensor_core/src/messages.rs

use crate::types::{Color, ObjectId, NO_OBJECT};
use nalgebra::Point3;

// =========================================================================
// == Scan Output Data Structures ==
// =========================================================================

/// One measured (or synthesized "no data") sample of a scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    /// Seconds since the start of the scan (or of the capture, for range scans).
    pub timestamp: f64,
    /// Horizontal beam angle at capture time, radians.
    pub yaw: f64,
    /// Vertical beam angle at capture time, radians.
    pub pitch: f64,
    /// Noise-free range along the beam.
    pub distance: f64,
    /// Perturbed range along the beam.
    pub distance_noise: f64,
    /// True hit point in the requested output frame.
    pub position: Point3<f64>,
    /// Perturbed hit point. Always on the beam through `position`.
    pub position_noise: Point3<f64>,
    pub object_id: ObjectId,
    /// Surface color at capture, channels in `[0, 1]`.
    pub color: Color,
    /// Position of the sample in the sensor's regular scan grid (row-major).
    pub point_index: usize,
}

impl PointRecord {
    /// A sample at `point_index` for which the sensor produced no measurement.
    pub fn no_data(point_index: usize, timestamp: f64, yaw: f64, pitch: f64) -> Self {
        let nan = Point3::new(f64::NAN, f64::NAN, f64::NAN);
        Self {
            timestamp,
            yaw,
            pitch,
            distance: f64::NAN,
            distance_noise: f64::NAN,
            position: nan,
            position_noise: nan,
            object_id: NO_OBJECT,
            color: [0.0; 3],
            point_index,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.distance_noise.is_finite()
    }
}

/// Euclidean distances of a depth-camera scan, row-major from the top row.
/// Pixels without a measurement hold `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    pub width: usize,
    pub height: usize,
    pub distances: Vec<f32>,
}
