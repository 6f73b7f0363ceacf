// blensor_core/src/models/perception/ibeo.rs

//! Four-layer LIDAR with a rotating 45° mirror (Ibeo LUX style).
//!
//! Each layer's laser fires downward onto a small triangular mirror that turns
//! about the vertical axis. The outgoing ray is the incoming ray reflected off
//! the mirror at the current sweep angle; layers away from 0° therefore tilt
//! slightly differently across the sweep. The few centimeters between the
//! mirror and the sensor origin are ignored when casting.

use super::sweep::SweepParams;
use super::{BeamSample, RayBatch, RaycastingSensorModel};
use crate::error::Result;
use crate::evd::ImageShape;
use crate::models::noise::{BiasTable, GaussianNoise};
use nalgebra::{Point3, Rotation3, Unit, Vector3};
use rand::RngCore;
use serde::Deserialize;
use tracing::{debug, warn};

/// Distance of the mirror center below the emitters, meters.
const MIRROR_DROP: f64 = 0.05;
/// Half-size of the mirror triangle, meters.
const MIRROR_HALF_WIDTH: f64 = 0.03;
/// Geometry closer than this to degenerate is skipped.
const GEOMETRY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IbeoParams {
    pub angle_resolution: f64,
    /// Mirror revolutions per second.
    pub rotation_speed: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub max_distance: f64,
    /// Layer angles in degrees, one per laser.
    pub layers: [f64; 4],
    pub noise: GaussianNoise,
}

impl Default for IbeoParams {
    fn default() -> Self {
        Self {
            angle_resolution: 0.25,
            rotation_speed: 12.5,
            start_angle: -60.0,
            end_angle: 50.0,
            max_distance: 200.0,
            layers: [-1.2, -0.4, 0.4, 1.2],
            noise: GaussianNoise {
                mu: 0.0,
                sigma: 0.01,
            },
        }
    }
}

/// A triangle given by its corners.
#[derive(Debug, Clone, Copy)]
struct Triangle {
    a: Point3<f64>,
    b: Point3<f64>,
    c: Point3<f64>,
}

impl Triangle {
    fn rotated(&self, rot: &Rotation3<f64>) -> Self {
        Self {
            a: rot * self.a,
            b: rot * self.b,
            c: rot * self.c,
        }
    }

    fn normal(&self) -> Option<Unit<Vector3<f64>>> {
        Unit::try_new((self.b - self.a).cross(&(self.c - self.a)), GEOMETRY_EPSILON)
    }

    /// Möller–Trumbore: distance along `dir` from `origin` to the triangle.
    fn intersect(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> Option<f64> {
        let e1 = self.b - self.a;
        let e2 = self.c - self.a;
        let p = dir.cross(&e2);
        let det = e1.dot(&p);
        if det.abs() < GEOMETRY_EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        let s = origin - self.a;
        let u = s.dot(&p) * inv;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(&e1);
        let v = dir.dot(&q) * inv;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(&q) * inv;
        (t > GEOMETRY_EPSILON).then_some(t)
    }
}

/// The mirror at sweep angle 0: centered below the emitters, tilted 45° so a
/// beam travelling down leaves forward (`-Z`).
fn mirror_at_rest() -> Triangle {
    let center = Point3::new(0.0, -MIRROR_DROP, 0.0);
    let across = Vector3::x();
    // lies in the mirror plane, pointing down and forward
    let along = Vector3::new(0.0, -1.0, -1.0).normalize();
    let w = MIRROR_HALF_WIDTH;
    Triangle {
        a: center + w * (-across - along),
        b: center + w * (across - along),
        c: center + 2.0 * w * along,
    }
}

/// Direction of the laser of a layer before it meets the mirror.
fn incoming_direction(layer: f64) -> Vector3<f64> {
    Vector3::new(0.0, -layer.cos(), layer.sin())
}

/// Reflects `incoming` off a mirror with `normal`: `-incoming` turned toward
/// the normal by twice the angle between them. `None` for glancing or
/// retro-reflecting geometry.
fn reflect(incoming: &Vector3<f64>, normal: &Unit<Vector3<f64>>) -> Option<Vector3<f64>> {
    let back = -incoming.normalize();
    let n = if back.dot(normal) < 0.0 {
        -normal.into_inner()
    } else {
        normal.into_inner()
    };
    let cos = back.dot(&n).clamp(-1.0, 1.0);
    let angle = cos.acos();
    if angle >= std::f64::consts::FRAC_PI_2 - GEOMETRY_EPSILON {
        return None;
    }
    let axis = Unit::try_new(back.cross(&n), GEOMETRY_EPSILON)?;
    Some(Rotation3::from_axis_angle(&axis, 2.0 * angle) * back)
}

impl IbeoParams {
    pub fn sweep(&self) -> SweepParams {
        SweepParams {
            angle_resolution: self.angle_resolution,
            rotation_speed: self.rotation_speed,
            start_angle: self.start_angle,
            end_angle: self.end_angle,
            max_distance: self.max_distance,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.sweep().validate()?;
        GaussianNoise::new(self.noise.mu, self.noise.sigma)?;
        Ok(())
    }

    /// Outgoing unit direction of `layer` (radians) with the mirror turned to
    /// `sweep_angle` (radians), or `None` when the sample is skipped.
    pub fn outgoing_direction(&self, layer: f64, sweep_angle: f64) -> Option<Vector3<f64>> {
        let turn = Rotation3::from_axis_angle(&Vector3::y_axis(), sweep_angle);
        let mirror = mirror_at_rest().rotated(&turn);
        let incoming = incoming_direction(layer);
        mirror.intersect(&Point3::origin(), &incoming)?;
        let normal = mirror.normal()?;
        reflect(&incoming, &normal)
    }
}

impl RaycastingSensorModel for IbeoParams {
    fn generate_rays(&self) -> Result<RayBatch> {
        self.validate()?;
        let sweep = self.sweep();
        let lines = sweep.lines();
        let mut batch = RayBatch::with_capacity(sweep.ray_count(self.layers.len())?);
        let mut skipped = 0usize;
        for line in 0..lines {
            let step = sweep.step(line);
            let sweep_angle = step.rotation - std::f64::consts::PI;
            for (beam, layer) in self.layers.iter().enumerate() {
                let Some(dir) = self.outgoing_direction(layer.to_radians(), sweep_angle) else {
                    skipped += 1;
                    continue;
                };
                batch.push(
                    dir * self.max_distance,
                    BeamSample {
                        beam,
                        yaw: step.yaw,
                        pitch: dir.y.clamp(-1.0, 1.0).asin(),
                        timestamp: step.timestamp,
                        point_index: beam * lines + line,
                    },
                );
            }
        }
        if skipped > 0 {
            warn!(skipped, "mirror geometry skipped samples");
        }
        debug!(rays = batch.len(), "mirror sweep built");
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

    fn image_shape(&self) -> Option<ImageShape> {
        Some(ImageShape::new(
            self.sweep().lines(),
            self.layers.len(),
            self.max_distance,
        ))
    }

    fn for_frame(&self, elapsed: f64, duration: f64) -> Box<dyn RaycastingSensorModel> {
        let sweep = self.sweep().for_frame(elapsed, duration);
        Box::new(Self {
            start_angle: sweep.start_angle,
            end_angle: sweep.end_angle,
            ..self.clone()
        })
    }

    fn uses_time_offset(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use approx::assert_abs_diff_eq;

    #[test]
    fn level_layer_leaves_forward_at_rest() {
        let p = IbeoParams::default();
        let dir = p.outgoing_direction(0.0, 0.0).unwrap();
        assert_abs_diff_eq!(dir, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);
    }

    #[test]
    fn layer_angle_becomes_pitch() {
        let p = IbeoParams::default();
        for deg in p.layers {
            let dir = p.outgoing_direction(deg.to_radians(), 0.0).unwrap();
            assert_abs_diff_eq!(dir.y.asin().to_degrees(), deg, epsilon = 1e-9);
            assert_abs_diff_eq!(dir.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn mirror_turn_sweeps_the_level_beam() {
        let p = IbeoParams::default();
        let angle = 30f64.to_radians();
        let dir = p.outgoing_direction(0.0, angle).unwrap();
        let expected = Rotation3::from_axis_angle(&Vector3::y_axis(), angle) * -Vector3::z();
        assert_abs_diff_eq!(dir, expected, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_geometry_is_skipped() {
        let normal = Unit::new_normalize(Vector3::y());
        // straight back along the normal
        assert!(reflect(&-Vector3::y(), &normal).is_none());
        // grazing the mirror plane
        assert!(reflect(&Vector3::x(), &normal).is_none());
        // a beam that misses the patch entirely
        let p = IbeoParams::default();
        assert!(p.outgoing_direction(80f64.to_radians(), 0.0).is_none());
    }

    #[test]
    fn default_sweep_batches_every_layer() {
        let p = IbeoParams::default();
        let batch = p.generate_rays().unwrap();
        assert_eq!(batch.len(), 440 * 4);
        assert_eq!(p.image_shape().unwrap().cells(), batch.len());
        for (ray, s) in batch.rays.iter().zip(&batch.samples) {
            assert_abs_diff_eq!(ray.direction.norm(), 200.0, epsilon = 1e-6);
            assert!(s.pitch.abs() < 2f64.to_radians());
        }
    }

    #[test]
    fn absurd_resolution_is_a_configuration_error() {
        let p = IbeoParams {
            angle_resolution: 1e-300,
            ..IbeoParams::default()
        };
        assert!(matches!(p.generate_rays(), Err(ScanError::Configuration(_))));
    }
}
