// blensor_core/src/types.rs

use crate::error::Result;
use crate::messages::PointRecord;
use nalgebra::{Isometry3, Point3};
use serde::Deserialize;

// --- Core Type Aliases ---
/// Identifier of the scene object a ray hit.
pub type ObjectId = i64;
/// Linear RGB, each channel in `[0, 1]`.
pub type Color = [f64; 3];

/// Object id used for samples that did not hit anything.
pub const NO_OBJECT: ObjectId = -1;

/// Per-axis sign flips applied by the ray-intersection provider to every ray
/// before it is cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct AxisInversion {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl AxisInversion {
    pub const NONE: AxisInversion = AxisInversion {
        x: false,
        y: false,
        z: false,
    };

    pub fn new(x: bool, y: bool, z: bool) -> Self {
        Self { x, y, z }
    }

    /// Applies the flips to a vector. Applying twice is the identity.
    pub fn apply(&self, v: &nalgebra::Vector3<f64>) -> nalgebra::Vector3<f64> {
        let flip = |on: bool, c: f64| if on { -c } else { c };
        nalgebra::Vector3::new(flip(self.x, v.x), flip(self.y, v.y), flip(self.z, v.z))
    }
}

/// The coordinate frame emitted points are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OutputFrame {
    /// Sensor-local coordinates (forward is -Z, up is +Y).
    #[default]
    Local,
    /// World coordinates, given the sensor's pose in the world.
    World(Isometry3<f64>),
}

impl OutputFrame {
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        match self {
            OutputFrame::Local => *p,
            OutputFrame::World(iso) => iso * p,
        }
    }
}

// --- Core Trait for handing finished scans to a visualizer ---
/// Receives the points of a finished scan, already mapped into the requested
/// output frame, together with the parallel record buffer.
pub trait MeshBuilder {
    fn build_mesh(
        &mut self,
        name: &str,
        points: &[Point3<f64>],
        records: &[PointRecord],
    ) -> Result<()>;
}
