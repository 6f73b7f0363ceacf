// blensor_core/src/models/perception/tof.rs

//! Time-of-flight camera: a pixel grid cast through a pinhole, Gaussian range
//! noise and optional phase backfolding.

use super::{BeamSample, RayBatch, RaycastingSensorModel};
use crate::error::{Result, ScanError};
use crate::evd::ImageShape;
use crate::models::noise::{BiasTable, GaussianNoise};
use nalgebra::Vector3;
use rand::RngCore;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TofParams {
    pub width: usize,
    pub height: usize,
    /// Full horizontal field of view, degrees.
    pub horizontal_fov: f64,
    /// Full vertical field of view, degrees.
    pub vertical_fov: f64,
    pub max_distance: f64,
    pub noise: GaussianNoise,
    /// Wrap distances beyond half the unambiguous range.
    pub backfolding: bool,
}

impl Default for TofParams {
    fn default() -> Self {
        Self {
            width: 176,
            height: 144,
            horizontal_fov: 43.6,
            vertical_fov: 34.6,
            max_distance: 10.0,
            noise: GaussianNoise {
                mu: 0.0,
                sigma: 0.004,
            },
            backfolding: false,
        }
    }
}

/// Phase ambiguity: anything at or beyond half the range aliases closer.
pub fn backfold(distance: f64, max_distance: f64) -> f64 {
    let half = max_distance / 2.0;
    if distance >= half {
        distance - half
    } else {
        distance
    }
}

impl TofParams {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::config(format!(
                "ToF resolution must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        for fov in [self.horizontal_fov, self.vertical_fov] {
            if !(fov > 0.0 && fov < 180.0) {
                return Err(ScanError::config(format!(
                    "ToF field of view must lie in (0, 180) degrees, got {fov}"
                )));
            }
        }
        if !(self.max_distance > 0.0) {
            return Err(ScanError::config(format!(
                "max distance must be positive, got {}",
                self.max_distance
            )));
        }
        GaussianNoise::new(self.noise.mu, self.noise.sigma)?;
        Ok(())
    }

    /// Pixel pitch at unit focal length, per axis.
    pub fn pixel_size(&self) -> (f64, f64) {
        let w = 2.0 * (self.horizontal_fov.to_radians() / 2.0).tan() / self.width as f64;
        let h = 2.0 * (self.vertical_fov.to_radians() / 2.0).tan() / self.height as f64;
        (w, h)
    }

    /// Unit-focal-length direction through the center of pixel `(x, y)`,
    /// row 0 at the top.
    pub fn pixel_direction(&self, x: usize, y: usize) -> Vector3<f64> {
        let (pw, ph) = self.pixel_size();
        let u = (x as f64 + 0.5 - self.width as f64 / 2.0) * pw;
        let v = (self.height as f64 / 2.0 - (y as f64 + 0.5)) * ph;
        Vector3::new(u, v, -1.0)
    }
}

impl RaycastingSensorModel for TofParams {
    fn generate_rays(&self) -> Result<RayBatch> {
        self.validate()?;
        let mut batch = RayBatch::with_capacity(self.width * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let d = self.pixel_direction(x, y);
                batch.push(
                    d.normalize() * self.max_distance,
                    BeamSample {
                        beam: 0,
                        yaw: d.x.atan(),
                        pitch: d.y.atan(),
                        timestamp: 0.0,
                        point_index: y * self.width + x,
                    },
                );
            }
        }
        Ok(batch)
    }

    /// Gaussian noise only; ToF cameras carry no per-beam bias.
    fn noisy_distance(
        &self,
        _sample: &BeamSample,
        distance: f64,
        _bias: &BiasTable,
        rng: &mut dyn RngCore,
    ) -> f64 {
        let noisy = distance + self.noise.sample(rng);
        if self.backfolding {
            backfold(noisy, self.max_distance)
        } else {
            noisy
        }
    }

    fn get_max_range(&self) -> f64 {
        self.max_distance
    }

    fn image_shape(&self) -> Option<ImageShape> {
        Some(ImageShape::new(self.width, self.height, self.max_distance))
    }

    fn for_frame(&self, _elapsed: f64, _duration: f64) -> Box<dyn RaycastingSensorModel> {
        Box::new(self.clone())
    }
}
