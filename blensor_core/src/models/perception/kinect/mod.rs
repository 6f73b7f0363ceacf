// blensor_core/src/models/perception/kinect/mod.rs

//! Structured-light depth camera (Kinect style).
//!
//! A projector at the sensor origin lights every pixel; a camera one stereo
//! baseline to the right has to see the same surface point for the pixel to
//! get a disparity. Disparities are quantized like the real sensor's, run
//! through the window filter and back-projected into depth.

pub mod disparity;
pub mod perlin;

use self::disparity::{quantize, DisparityGrid, FilterParams};
use self::perlin::Perlin;
use super::{cast_checked, RayCaster, RayHit, ScanContext, SensorRay};
use crate::error::{Result, ScanError};
use crate::evd::{EvdStore, ImageShape};
use crate::messages::PointRecord;
use crate::models::noise::GaussianNoise;
use crate::types::NO_OBJECT;
use nalgebra::{Point3, Vector3};
use rand::RngCore;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KinectParams {
    pub width: usize,
    pub height: usize,
    /// Millimeters.
    pub focal_length: f64,
    /// Millimeters per pixel.
    pub pixel_width: f64,
    /// Projector to camera distance, meters.
    pub baseline: f64,
    pub min_distance: f64,
    pub max_distance: f64,
    /// Noise on the camera's horizontal pixel coordinate.
    pub pixel_noise: GaussianNoise,
    /// Pixels.
    pub inlier_threshold: f64,
    pub noise_scale: f64,
    pub noise_smoothness: f64,
    /// Meters the camera hit may lie from the projector hit.
    pub tolerance: f64,
}

impl Default for KinectParams {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            focal_length: 4.73,
            pixel_width: 0.0078,
            baseline: 0.075,
            min_distance: 0.7,
            max_distance: 6.0,
            pixel_noise: GaussianNoise::default(),
            inlier_threshold: 0.5,
            noise_scale: 0.25,
            noise_smoothness: 1.5,
            tolerance: 1e-3,
        }
    }
}

impl KinectParams {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::config(format!(
                "structured light resolution must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        let positive = [
            ("focal length", self.focal_length),
            ("pixel width", self.pixel_width),
            ("baseline", self.baseline),
            ("max distance", self.max_distance),
            ("noise smoothness", self.noise_smoothness),
            ("tolerance", self.tolerance),
        ];
        for (name, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ScanError::config(format!("{name} must be positive, got {value}")));
            }
        }
        if !(self.min_distance >= 0.0) || self.min_distance >= self.max_distance {
            return Err(ScanError::config(format!(
                "depth range [{}, {}] is empty",
                self.min_distance, self.max_distance
            )));
        }
        GaussianNoise::new(self.pixel_noise.mu, self.pixel_noise.sigma)?;
        Ok(())
    }

    /// Focal length expressed in pixels.
    pub fn focal_pixels(&self) -> f64 {
        self.focal_length / self.pixel_width
    }

    /// Offset of pixel `(x, y)`'s center from the principal point, in pixels,
    /// `+v` up.
    pub fn pixel_offset(&self, x: usize, y: usize) -> (f64, f64) {
        (
            x as f64 + 0.5 - self.width as f64 / 2.0,
            self.height as f64 / 2.0 - (y as f64 + 0.5),
        )
    }

    pub fn camera_origin(&self) -> Point3<f64> {
        Point3::new(self.baseline, 0.0, 0.0)
    }

    /// Depth of a disparity: `Z = f * b / (d * pixel_width)`.
    pub fn depth_from_disparity(&self, disparity: f64) -> f64 {
        (self.focal_length * self.baseline) / (disparity * self.pixel_width)
    }

    fn filter_params(&self) -> FilterParams {
        FilterParams {
            inlier_threshold: self.inlier_threshold,
            noise_scale: self.noise_scale,
            noise_smoothness: self.noise_smoothness,
        }
    }
}

/// Runs both ray passes, the disparity filter and back-projection. Every
/// pixel yields exactly one record; pixels without a disparity are "no data".
pub fn scan(
    params: &KinectParams,
    caster: &dyn RayCaster,
    ctx: &ScanContext,
    rng: &mut dyn RngCore,
) -> Result<EvdStore> {
    params.validate()?;
    let (w, h) = (params.width, params.height);
    let f = params.focal_pixels();

    // Projector pass. Rays are twice the range so far surfaces are not missed.
    let reach = 2.0 * params.max_distance;
    let projector_rays: Vec<SensorRay> = (0..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .map(|(x, y)| {
            let (u, v) = params.pixel_offset(x, y);
            let dir = Vector3::new(u, v, -f).normalize() * reach;
            SensorRay::from_sensor((y * w + x) as u32, dir)
        })
        .collect();
    let mut projector_hits: Vec<Option<RayHit>> = vec![None; w * h];
    for hit in cast_checked(caster, &projector_rays, reach, ctx.inversion)? {
        let index = hit.ray_id;
        projector_hits[index] = Some(hit);
    }

    // Camera pass: from the camera center back through each near projector hit.
    // Directions are pre-inverted so the provider's flip lands them on the hit.
    let camera = params.camera_origin();
    let mut camera_rays = Vec::new();
    let mut camera_pixels = Vec::new();
    for (index, hit) in projector_hits.iter().enumerate() {
        let Some(hit) = hit else { continue };
        if hit.point.coords.norm() >= params.max_distance {
            continue;
        }
        camera_rays.push(SensorRay {
            id: index as u32,
            origin: camera,
            direction: ctx.inversion.apply(&(hit.point - camera)),
        });
        camera_pixels.push(index);
    }
    let camera_hits = cast_checked(caster, &camera_rays, reach, ctx.inversion)?;
    debug!(
        projector_rays = projector_rays.len(),
        camera_rays = camera_rays.len(),
        camera_hits = camera_hits.len(),
        "structured light passes cast"
    );

    // Disparities, indexed by projector pixel.
    let mut raw = DisparityGrid::empty(w, h);
    for cam in &camera_hits {
        let index = camera_pixels[cam.ray_id];
        let Some(proj) = projector_hits[index].as_ref() else {
            continue;
        };
        if (cam.point - proj.point).norm() > params.tolerance {
            continue;
        }
        // Triangulate in the pixel frame, before the inversion flip.
        let p = ctx.inversion.apply(&proj.point.coords);
        let depth = -p.z;
        if depth < params.min_distance || depth > params.max_distance {
            continue;
        }
        let (x, y) = (index % w, index / w);
        let (u, _) = params.pixel_offset(x, y);
        let camera_x = f * (p.x - params.baseline) / depth;
        let camera_x = quantize(camera_x + params.pixel_noise.sample(rng));
        let disparity = quantize(u - camera_x);
        if disparity > 0.0 {
            raw.set(x, y, disparity);
        }
    }

    let perlin = Perlin::new(rng);
    let filtered = disparity::filter(&raw, &params.filter_params(), &perlin);

    let mut store = EvdStore::with_image_shape(ImageShape::new(w, h, params.max_distance));
    for y in 0..h {
        for x in 0..w {
            let index = y * w + x;
            let (u, v) = params.pixel_offset(x, y);
            let yaw = (u / f).atan();
            let pitch = (v / f).atan();
            let disparity = filtered.values[index];
            if !(disparity.is_finite() && disparity > 0.0) {
                store.add_entry(PointRecord::no_data(index, ctx.time_offset, yaw, pitch));
                continue;
            }
            let depth = params.depth_from_disparity(disparity);
            let along_pixel = Vector3::new(u * depth / f, v * depth / f, -depth);
            let measured = Point3::from(ctx.inversion.apply(&along_pixel));
            let (position, object_id, color) = match &projector_hits[index] {
                Some(hit) => (hit.point, hit.object_id, hit.color),
                None => (measured, NO_OBJECT, [0.0; 3]),
            };
            store.add_entry(PointRecord {
                timestamp: ctx.time_offset,
                yaw,
                pitch,
                distance: position.coords.norm(),
                distance_noise: measured.coords.norm(),
                position: ctx.output.transform_point(&position),
                position_noise: ctx.output.transform_point(&measured),
                object_id,
                color,
                point_index: index,
            });
        }
    }
    Ok(store)
}
