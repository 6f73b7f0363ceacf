// blensor_sim/src/simulation/core/transforms.rs

//! The sensor's place in the world and the conversions between its frame and
//! the world frame the scene lives in.

use blensor_core::prelude::{AxisInversion, OutputFrame, SensorRay};
use nalgebra::{Isometry3, Point3, Vector3};

/// The sensor frame: forward is -Z, up is +Y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    /// T_W_S: maps sensor-frame coordinates into the world.
    pub world_from_sensor: Isometry3<f64>,
}

impl Default for SensorFrame {
    fn default() -> Self {
        Self {
            world_from_sensor: Isometry3::identity(),
        }
    }
}

impl SensorFrame {
    pub fn new(world_from_sensor: Isometry3<f64>) -> Self {
        Self { world_from_sensor }
    }

    /// The world-frame origin and unit direction of a sensor ray, after the
    /// per-axis flips. `None` for a zero-length direction.
    pub fn world_ray(
        &self,
        ray: &SensorRay,
        inversion: AxisInversion,
    ) -> Option<(Point3<f64>, Vector3<f64>)> {
        let direction = inversion.apply(&ray.direction);
        let norm = direction.norm();
        if !(norm > 0.0) || !norm.is_finite() {
            return None;
        }
        Some((
            self.world_from_sensor * ray.origin,
            self.world_from_sensor * (direction / norm),
        ))
    }

    pub fn to_sensor_point(&self, world: &Point3<f64>) -> Point3<f64> {
        self.world_from_sensor.inverse_transform_point(world)
    }

    /// The frame emitted points are expressed in.
    pub fn output_frame(&self, world: bool) -> OutputFrame {
        if world {
            OutputFrame::World(self.world_from_sensor)
        } else {
            OutputFrame::Local
        }
    }
}
