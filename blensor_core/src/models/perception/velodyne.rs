// blensor_core/src/models/perception/velodyne.rs

//! Rotating multi-beam LIDAR (Velodyne HDL-64E, HDL-32E, VLP-16).

use super::sweep::{rotating_ray, SweepParams};
use super::{BeamSample, RayBatch, RaycastingSensorModel};
use crate::error::Result;
use crate::evd::ImageShape;
use crate::models::noise::{BiasTable, GaussianNoise};
use rand::RngCore;
use serde::Deserialize;

/// Vertical beam angles in firing order, degrees.
const HDL64E_ANGLES: [f64; 64] = [
    // upper block
    2.0000, 1.6668, 1.3335, 1.0003, 0.6671, 0.3339, 0.0006, -0.3326, -0.6658, -0.9990, -1.3323,
    -1.6655, -1.9987, -2.3319, -2.6652, -2.9984, -3.3316, -3.6648, -3.9981, -4.3313, -4.6645,
    -4.9977, -5.3310, -5.6642, -5.9974, -6.3306, -6.6639, -6.9971, -7.3303, -7.6635, -7.9968,
    -8.3300,
    // lower block
    -8.83, -9.33, -9.83, -10.33, -10.83, -11.33, -11.83, -12.33, -12.83, -13.33, -13.83, -14.33,
    -14.83, -15.33, -15.83, -16.33, -16.83, -17.33, -17.83, -18.33, -18.83, -19.33, -19.83,
    -20.33, -20.83, -21.33, -21.83, -22.33, -22.83, -23.33, -23.83, -24.33,
];

const HDL32E_ANGLES: [f64; 32] = [
    10.6700, 9.3365, 8.0029, 6.6694, 5.3358, 4.0023, 2.6687, 1.3352, 0.0016, -1.3319, -2.6655,
    -3.9990, -5.3326, -6.6661, -7.9997, -9.3332, -10.6668, -12.0003, -13.3339, -14.6674,
    -16.0010, -17.3345, -18.6681, -20.0016, -21.3352, -22.6687, -24.0023, -25.3358, -26.6694,
    -28.0029, -29.3365, -30.6700,
];

const VLP16_ANGLES: [f64; 16] = [
    -15.0, 1.0, -13.0, 3.0, -11.0, 5.0, -9.0, 7.0, -7.0, 9.0, -5.0, 11.0, -3.0, 13.0, -1.0, 15.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VelodyneModel {
    #[default]
    Hdl64e,
    Hdl32e,
    Vlp16,
}

impl VelodyneModel {
    pub fn vertical_angles(&self) -> &'static [f64] {
        match self {
            VelodyneModel::Hdl64e => &HDL64E_ANGLES,
            VelodyneModel::Hdl32e => &HDL32E_ANGLES,
            VelodyneModel::Vlp16 => &VLP16_ANGLES,
        }
    }

    pub fn beams(&self) -> usize {
        self.vertical_angles().len()
    }

    /// The checked-in bias table of this model.
    pub fn seeded_bias(&self) -> BiasTable {
        match self {
            VelodyneModel::Hdl64e => BiasTable::hdl64e(),
            VelodyneModel::Hdl32e => BiasTable::hdl32e(),
            VelodyneModel::Vlp16 => BiasTable::vlp16(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VelodyneParams {
    pub model: VelodyneModel,
    /// Degrees between two horizontal steps.
    pub angle_resolution: f64,
    /// Revolutions per second.
    pub rotation_speed: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub max_distance: f64,
    pub noise: GaussianNoise,
}

impl Default for VelodyneParams {
    fn default() -> Self {
        Self::preset(VelodyneModel::Hdl64e)
    }
}

impl VelodyneParams {
    /// Factory settings of a model: one full revolution at 10 Hz.
    pub fn preset(model: VelodyneModel) -> Self {
        let (angle_resolution, max_distance) = match model {
            VelodyneModel::Hdl64e => (0.1728, 120.0),
            VelodyneModel::Hdl32e => (0.1600, 100.0),
            VelodyneModel::Vlp16 => (0.2000, 100.0),
        };
        Self {
            model,
            angle_resolution,
            rotation_speed: 10.0,
            start_angle: 0.0,
            end_angle: 360.0,
            max_distance,
            noise: GaussianNoise {
                mu: 0.0,
                sigma: 0.01,
            },
        }
    }

    pub fn sweep(&self) -> SweepParams {
        SweepParams {
            angle_resolution: self.angle_resolution,
            rotation_speed: self.rotation_speed,
            start_angle: self.start_angle,
            end_angle: self.end_angle,
            max_distance: self.max_distance,
        }
    }

    fn with_sweep(&self, sweep: SweepParams) -> Self {
        Self {
            start_angle: sweep.start_angle,
            end_angle: sweep.end_angle,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.sweep().validate()?;
        GaussianNoise::new(self.noise.mu, self.noise.sigma)?;
        Ok(())
    }
}

impl RaycastingSensorModel for VelodyneParams {
    fn generate_rays(&self) -> Result<RayBatch> {
        self.validate()?;
        let sweep = self.sweep();
        let lines = sweep.lines();
        let angles = self.model.vertical_angles();
        let mut batch = RayBatch::with_capacity(sweep.ray_count(angles.len())?);
        for line in 0..lines {
            let step = sweep.step(line);
            for (beam, angle) in angles.iter().enumerate() {
                let pitch = angle.to_radians();
                batch.push(
                    rotating_ray(self.max_distance, pitch, step.rotation),
                    BeamSample {
                        beam,
                        yaw: step.yaw,
                        pitch,
                        timestamp: step.timestamp,
                        point_index: beam * lines + line,
                    },
                );
            }
        }
        Ok(batch)
    }

    fn noisy_distance(
        &self,
        sample: &BeamSample,
        distance: f64,
        bias: &BiasTable,
        rng: &mut dyn RngCore,
    ) -> f64 {
        distance + bias.get(sample.beam) + self.noise.sample(rng)
    }

    fn get_max_range(&self) -> f64 {
        self.max_distance
    }

    /// One row per beam, one column per horizontal step.
    fn image_shape(&self) -> Option<ImageShape> {
        Some(ImageShape::new(
            self.sweep().lines(),
            self.model.beams(),
            self.max_distance,
        ))
    }

    fn for_frame(&self, elapsed: f64, duration: f64) -> Box<dyn RaycastingSensorModel> {
        Box::new(self.with_sweep(self.sweep().for_frame(elapsed, duration)))
    }

    fn uses_time_offset(&self) -> bool {
        false
    }
}
