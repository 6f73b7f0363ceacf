// blensor_core/src/models/perception/mod.rs

pub mod depthmap;
pub mod generic;
pub mod ibeo;
pub mod kinect;
pub mod sweep;
pub mod tof;
pub mod velodyne;

use crate::error::{Result, ScanError};
use crate::evd::{EvdStore, ImageShape};
use crate::messages::PointRecord;
use crate::models::noise::BiasTable;
use crate::types::{AxisInversion, Color, ObjectId, OutputFrame};
use dyn_clone::DynClone;
use nalgebra::{Point3, Vector3};
use rand::RngCore;
use std::fmt::Debug;
use tracing::debug;

/// Represents a single ray to be cast by the ray-intersection provider.
/// All vectors are in the SENSOR's local coordinate frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRay {
    /// Grid index of the sample this ray belongs to.
    pub id: u32,
    pub origin: Point3<f64>,
    /// Points from `origin` toward the ray's far end. Not necessarily unit length.
    pub direction: Vector3<f64>,
}

impl SensorRay {
    pub fn from_sensor(id: u32, direction: Vector3<f64>) -> Self {
        Self {
            id,
            origin: Point3::origin(),
            direction,
        }
    }
}

/// Represents the result of a single ray cast by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RayHit {
    /// Index of the originating ray in the submitted batch.
    pub ray_id: usize,
    /// Distance from the ray origin to the hit.
    pub distance: f64,
    /// Hit point in the sensor frame the ray was cast in.
    pub point: Point3<f64>,
    pub object_id: ObjectId,
    pub color: Color,
}

/// The ray-intersection query a scene must answer.
///
/// Providers may return hits in any order and omit rays that found nothing
/// within `max_distance`, but `ray_id` must name the submitted ray.
pub trait RayCaster {
    fn cast_rays(
        &self,
        rays: &[SensorRay],
        max_distance: f64,
        inversion: AxisInversion,
    ) -> Result<Vec<RayHit>>;

    /// Renders a z-depth buffer for a pinhole camera looking down `-Z`.
    /// Hosts with a real renderer override this; the default casts one ray
    /// per pixel.
    fn render_depth(
        &self,
        camera: &depthmap::PinholeCamera,
        max_depth: f64,
        inversion: AxisInversion,
    ) -> Result<depthmap::DepthBuffer> {
        depthmap::render_by_ray_casting(self, camera, max_depth, inversion)
    }
}

/// Per-scan settings that do not belong to any one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScanContext {
    pub output: OutputFrame,
    pub inversion: AxisInversion,
    /// Added to the timestamps of sensors whose sweep does not encode time
    /// (the image-shaped ones). Rotating sensors fold elapsed time into their
    /// sweep angles instead.
    pub time_offset: f64,
}

/// When and where a batched ray was fired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamSample {
    /// Physical beam (laser channel) index, for bias lookup.
    pub beam: usize,
    pub yaw: f64,
    pub pitch: f64,
    pub timestamp: f64,
    pub point_index: usize,
}

/// Rays of one sweep plus the metadata needed to match hits back to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RayBatch {
    pub rays: Vec<SensorRay>,
    pub samples: Vec<BeamSample>,
}

impl RayBatch {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            rays: Vec::with_capacity(n),
            samples: Vec::with_capacity(n),
        }
    }

    /// Queues a ray fired from the sensor origin.
    pub fn push(&mut self, direction: Vector3<f64>, sample: BeamSample) {
        self.rays
            .push(SensorRay::from_sensor(sample.point_index as u32, direction));
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }
}

/// The contract for any sensor model that works by casting one batch of rays
/// from the sensor origin.
///
/// The model defines its scan pattern (`generate_rays`) and how a true range
/// is perturbed (`noisy_distance`); the shared `process_hits` turns the
/// provider's answer into point records.
pub trait RaycastingSensorModel: Send + Sync + DynClone + Debug {
    /// Generates the complete set of rays that defines this sensor's scan
    /// pattern, in the sensor's local frame.
    fn generate_rays(&self) -> Result<RayBatch>;

    /// Perturbs the true range of one hit.
    fn noisy_distance(
        &self,
        sample: &BeamSample,
        distance: f64,
        bias: &BiasTable,
        rng: &mut dyn RngCore,
    ) -> f64;

    /// Returns the maximum effective range of the sensor in meters.
    fn get_max_range(&self) -> f64;

    /// Dense layout of the sensor's samples, if it has one.
    fn image_shape(&self) -> Option<ImageShape> {
        None
    }

    /// The model as configured for one frame of a range scan starting
    /// `elapsed` seconds into the capture and lasting `duration` seconds.
    fn for_frame(&self, elapsed: f64, duration: f64) -> Box<dyn RaycastingSensorModel>;

    /// Whether `ScanContext::time_offset` applies to this model's timestamps.
    fn uses_time_offset(&self) -> bool {
        true
    }

    /// Turns the (sorted) hits of one batch into records.
    fn process_hits(
        &self,
        batch: &RayBatch,
        hits: &[RayHit],
        ctx: &ScanContext,
        bias: &BiasTable,
        rng: &mut dyn RngCore,
        store: &mut EvdStore,
    ) -> Result<()> {
        let time_offset = if self.uses_time_offset() {
            ctx.time_offset
        } else {
            0.0
        };
        for hit in hits {
            let sample = &batch.samples[hit.ray_id];
            let distance = hit.point.coords.norm();
            let noisy = self.noisy_distance(sample, distance, bias, rng);
            if let Some(mut record) = record_along_beam(hit, sample, noisy, &ctx.output) {
                record.timestamp += time_offset;
                store.add_entry(record);
            }
        }
        Ok(())
    }
}

// Make the trait object cloneable.
dyn_clone::clone_trait_object!(RaycastingSensorModel);

/// Builds the record of a hit whose noise acts along the beam: the noisy point
/// is the hit's unit direction scaled to `noisy_distance`. Hits at the sensor
/// origin have no direction and are dropped.
pub fn record_along_beam(
    hit: &RayHit,
    sample: &BeamSample,
    noisy_distance: f64,
    output: &OutputFrame,
) -> Option<PointRecord> {
    let distance = hit.point.coords.norm();
    if !(distance > 0.0) {
        return None;
    }
    let unit = hit.point.coords / distance;
    let noisy = Point3::from(unit * noisy_distance);
    Some(PointRecord {
        timestamp: sample.timestamp,
        yaw: sample.yaw,
        pitch: sample.pitch,
        distance,
        distance_noise: noisy_distance,
        position: output.transform_point(&hit.point),
        position_noise: output.transform_point(&noisy),
        object_id: hit.object_id,
        color: hit.color,
        point_index: sample.point_index,
    })
}

/// Casts `rays` and checks that every hit names a submitted ray. Hits come
/// back sorted by ray so output order does not depend on the provider.
pub fn cast_checked<C: RayCaster + ?Sized>(
    caster: &C,
    rays: &[SensorRay],
    max_distance: f64,
    inversion: AxisInversion,
) -> Result<Vec<RayHit>> {
    if rays.is_empty() {
        return Ok(Vec::new());
    }
    let mut hits = caster.cast_rays(rays, max_distance, inversion)?;
    if let Some(bad) = hits.iter().find(|h| h.ray_id >= rays.len()) {
        return Err(ScanError::GeometryQuery(format!(
            "provider returned a hit for ray {} but only {} rays were cast",
            bad.ray_id,
            rays.len()
        )));
    }
    hits.sort_by_key(|h| h.ray_id);
    Ok(hits)
}

/// One sweep of a ray-batch sensor: generate, cast once, perturb, record.
pub fn run_raycasting_scan(
    model: &dyn RaycastingSensorModel,
    bias: &BiasTable,
    caster: &dyn RayCaster,
    ctx: &ScanContext,
    rng: &mut dyn RngCore,
) -> Result<EvdStore> {
    let batch = model.generate_rays()?;
    let mut store = match model.image_shape() {
        Some(shape) => EvdStore::with_image_shape(shape),
        None => EvdStore::new(),
    };
    let hits = cast_checked(caster, &batch.rays, model.get_max_range(), ctx.inversion)?;
    debug!(rays = batch.len(), hits = hits.len(), "ray batch cast");
    model.process_hits(&batch, &hits, ctx, bias, rng, &mut store)?;
    Ok(store)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use nalgebra::Isometry3;

    fn sample(i: usize) -> BeamSample {
        BeamSample {
            beam: 0,
            yaw: 0.0,
            pitch: 0.0,
            timestamp: 0.25,
            point_index: i,
        }
    }

    fn hit(point: Point3<f64>) -> RayHit {
        RayHit {
            ray_id: 0,
            distance: point.coords.norm(),
            point,
            object_id: 2,
            color: [1.0, 1.0, 1.0],
        }
    }

    #[test]
    fn noise_stays_on_the_beam() {
        let h = hit(Point3::new(3.0, -4.0, -12.0));
        let r = record_along_beam(&h, &sample(5), 13.5, &OutputFrame::Local).unwrap();
        assert_eq!(r.distance, 13.0);
        assert_eq!(r.distance_noise, 13.5);
        approx::assert_relative_eq!(r.position_noise.coords.norm(), 13.5, epsilon = 1e-12);
        approx::assert_relative_eq!(
            r.position_noise.coords.normalize(),
            r.position.coords.normalize(),
            epsilon = 1e-12
        );
        assert_eq!(r.point_index, 5);
    }

    #[test]
    fn world_output_moves_both_points() {
        let pose = Isometry3::translation(1.0, 2.0, 3.0);
        let h = hit(Point3::new(0.0, 0.0, -2.0));
        let r = record_along_beam(&h, &sample(0), 2.0, &OutputFrame::World(pose)).unwrap();
        assert_eq!(r.position, Point3::new(1.0, 2.0, 1.0));
        assert_eq!(r.position_noise, r.position);
    }

    #[test]
    fn hit_at_origin_is_dropped() {
        assert!(record_along_beam(&hit(Point3::origin()), &sample(0), 1.0, &OutputFrame::Local).is_none());
    }

    #[test]
    fn out_of_batch_hits_are_a_geometry_error() {
        struct Liar;
        impl RayCaster for Liar {
            fn cast_rays(&self, _: &[SensorRay], _: f64, _: AxisInversion) -> Result<Vec<RayHit>> {
                Ok(vec![RayHit {
                    ray_id: 9,
                    distance: 1.0,
                    point: Point3::new(0.0, 0.0, -1.0),
                    object_id: 0,
                    color: [0.0; 3],
                }])
            }
        }
        let rays = vec![SensorRay::from_sensor(0, -Vector3::z())];
        let err = cast_checked(&Liar, &rays, 10.0, AxisInversion::NONE).unwrap_err();
        assert!(matches!(err, ScanError::GeometryQuery(_)));
    }

    #[test]
    fn hits_come_back_sorted() {
        let wall = WallCaster {
            distance: 5.0,
            object_id: 1,
        };
        let rays: Vec<SensorRay> = (0..4)
            .map(|i| SensorRay::from_sensor(i, Vector3::new(0.1 * i as f64, 0.0, -1.0)))
            .collect();
        let hits = cast_checked(&wall, &rays, 100.0, AxisInversion::NONE).unwrap();
        let ids: Vec<usize> = hits.iter().map(|h| h.ray_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_batch_skips_the_provider() {
        let hits = cast_checked(&BrokenCaster, &[], 10.0, AxisInversion::NONE).unwrap();
        assert!(hits.is_empty());
    }
}
