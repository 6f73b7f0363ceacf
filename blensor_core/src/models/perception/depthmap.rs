// blensor_core/src/models/perception/depthmap.rs

//! Depth camera: turns a rendered z-buffer into Euclidean distances and
//! points. No noise model.

use super::{cast_checked, RayCaster, ScanContext, SensorRay};
use crate::error::{Result, ScanError};
use crate::evd::{EvdStore, ImageShape};
use crate::messages::{DepthMap, PointRecord};
use crate::types::{AxisInversion, NO_OBJECT};
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// A pinhole camera looking down `-Z` with `+Y` up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeCamera {
    pub width: usize,
    pub height: usize,
    /// Focal length in pixels.
    pub focal_length: f64,
}

impl PinholeCamera {
    /// Direction through the center of pixel `(x, y)` with `z = -1`.
    pub fn pixel_direction(&self, x: usize, y: usize) -> Vector3<f64> {
        let u = (x as f64 + 0.5 - self.width as f64 / 2.0) / self.focal_length;
        let v = (self.height as f64 / 2.0 - (y as f64 + 0.5)) / self.focal_length;
        Vector3::new(u, v, -1.0)
    }

    pub fn pixels(&self) -> usize {
        self.width * self.height
    }
}

/// Z-depth along the optical axis per pixel, row-major from the top row.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBuffer {
    pub width: usize,
    pub height: usize,
    pub depths: Vec<f64>,
}

/// Default provider-side renderer: one ray per pixel, depth of the nearest hit,
/// `NaN` where nothing was hit. Depths are taken along the unflipped optical
/// axis, so an inverted camera still reports positive values.
pub fn render_by_ray_casting<C: RayCaster + ?Sized>(
    caster: &C,
    camera: &PinholeCamera,
    max_depth: f64,
    inversion: AxisInversion,
) -> Result<DepthBuffer> {
    let mut rays = Vec::with_capacity(camera.pixels());
    let mut longest = 0.0f64;
    for y in 0..camera.height {
        for x in 0..camera.width {
            let d = camera.pixel_direction(x, y) * max_depth;
            longest = longest.max(d.norm());
            rays.push(SensorRay::from_sensor((y * camera.width + x) as u32, d));
        }
    }
    let mut depths = vec![f64::NAN; camera.pixels()];
    for hit in cast_checked(caster, &rays, longest, inversion)? {
        depths[hit.ray_id] = -inversion.apply(&hit.point.coords).z;
    }
    Ok(DepthBuffer {
        width: camera.width,
        height: camera.height,
        depths,
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DepthMapParams {
    pub width: usize,
    pub height: usize,
    /// Focal length in pixels.
    pub focal_length: f64,
    /// Samples deeper than this are dropped.
    pub max_distance: f64,
}

impl Default for DepthMapParams {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            focal_length: 525.0,
            max_distance: 10.0,
        }
    }
}

impl DepthMapParams {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::config(format!(
                "depth camera resolution must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.focal_length > 0.0) || !(self.max_distance > 0.0) {
            return Err(ScanError::config(
                "depth camera focal length and max distance must be positive",
            ));
        }
        Ok(())
    }

    pub fn camera(&self) -> PinholeCamera {
        PinholeCamera {
            width: self.width,
            height: self.height,
            focal_length: self.focal_length,
        }
    }
}

/// Converts a z-buffer into records and the Euclidean depth map.
pub fn process_depth_buffer(
    params: &DepthMapParams,
    buffer: &DepthBuffer,
    ctx: &ScanContext,
) -> Result<(EvdStore, DepthMap)> {
    params.validate()?;
    if buffer.width != params.width
        || buffer.height != params.height
        || buffer.depths.len() != params.width * params.height
    {
        return Err(ScanError::config(format!(
            "depth buffer is {}x{} with {} values, camera is {}x{}",
            buffer.width,
            buffer.height,
            buffer.depths.len(),
            params.width,
            params.height
        )));
    }
    let camera = params.camera();
    let mut store =
        EvdStore::with_image_shape(ImageShape::new(params.width, params.height, params.max_distance));
    let mut distances = vec![f32::NAN; camera.pixels()];

    for y in 0..params.height {
        for x in 0..params.width {
            let index = y * params.width + x;
            let depth = buffer.depths[index];
            if !depth.is_finite() || depth <= 0.0 || depth > params.max_distance {
                continue;
            }
            let ray = camera.pixel_direction(x, y);
            let local = Point3::from(ctx.inversion.apply(&(ray * depth)));
            let distance = local.coords.norm();
            distances[index] = distance as f32;
            let position = ctx.output.transform_point(&local);
            store.add_entry(PointRecord {
                timestamp: ctx.time_offset,
                yaw: ray.x.atan(),
                pitch: ray.y.atan(),
                distance,
                distance_noise: distance,
                position,
                position_noise: position,
                object_id: NO_OBJECT,
                color: [1.0; 3],
                point_index: index,
            });
        }
    }
    Ok((
        store,
        DepthMap {
            width: params.width,
            height: params.height,
            distances,
        },
    ))
}

/// Renders through the provider and converts.
pub fn scan(
    params: &DepthMapParams,
    caster: &dyn RayCaster,
    ctx: &ScanContext,
) -> Result<(EvdStore, DepthMap)> {
    params.validate()?;
    let buffer = caster.render_depth(&params.camera(), params.max_distance, ctx.inversion)?;
    process_depth_buffer(params, &buffer, ctx)
}

impl DepthMap {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let dim = |v: usize| {
            u32::try_from(v).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "depth map too large")
            })
        };
        w.write_all(&dim(self.width)?.to_le_bytes())?;
        w.write_all(&dim(self.height)?.to_le_bytes())?;
        for d in &self.distances {
            w.write_all(&d.to_le_bytes())?;
        }
        Ok(())
    }

    /// Writes `u32 width`, `u32 height`, then the `f32` distances, all
    /// little-endian.
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| ScanError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        self.encode(&mut writer)
            .and_then(|_| writer.flush())
            .map_err(|e| ScanError::io(path, e))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ScanError::io(path, e))?;
        let mut reader = BufReader::new(file);
        Self::decode(&mut reader).map_err(|e| ScanError::io(path, e))
    }

    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut word = [0u8; 4];
        r.read_exact(&mut word)?;
        let width = u32::from_le_bytes(word) as usize;
        r.read_exact(&mut word)?;
        let height = u32::from_le_bytes(word) as usize;
        let mut distances = Vec::with_capacity(width.saturating_mul(height).min(1 << 24));
        for _ in 0..width * height {
            r.read_exact(&mut word)?;
            distances.push(f32::from_le_bytes(word));
        }
        Ok(Self {
            width,
            height,
            distances,
        })
    }
}
