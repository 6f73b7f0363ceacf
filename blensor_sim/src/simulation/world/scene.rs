// blensor_sim/src/simulation/world/scene.rs

use crate::error::SimError;
use crate::simulation::config::structs::{ObjectConfig, ScenarioConfig, ShapeConfig};
use crate::simulation::core::transforms::SensorFrame;
use blensor_core::prelude::{
    AnimatedScene, AxisInversion, Color, ObjectId, RayCaster, RayHit, SensorRay,
};
use nalgebra::{Isometry3, Point3, Unit, Vector3};
use parry3d_f64::query::{Ray, RayCast};
use parry3d_f64::shape::{Ball, Cuboid, Cylinder, HalfSpace};
use tracing::{debug, info, trace};

// =========================================================================
// == Geometry ==
// =========================================================================

/// A collision shape in its object's local frame.
#[derive(Debug, Clone)]
pub enum Geometry {
    Plane(HalfSpace),
    Box(Cuboid),
    Sphere(Ball),
    /// Axis along local Y.
    Cylinder(Cylinder),
}

impl Geometry {
    pub fn from_config(shape: &ShapeConfig) -> Result<Self, SimError> {
        shape.validate().map_err(SimError::Invalid)?;
        Ok(match shape {
            ShapeConfig::Plane { normal } => {
                let normal = Unit::try_new(Vector3::from(*normal), 1e-12)
                    .ok_or_else(|| SimError::invalid("plane normal must be non-zero"))?;
                Geometry::Plane(HalfSpace::new(normal))
            }
            ShapeConfig::Box { size } => Geometry::Box(Cuboid::new(Vector3::from(*size) / 2.0)),
            ShapeConfig::Sphere { radius } => Geometry::Sphere(Ball::new(*radius)),
            ShapeConfig::Cylinder { radius, height } => {
                Geometry::Cylinder(Cylinder::new(height / 2.0, *radius))
            }
        })
    }

    /// Time of impact of `ray` against the shape placed at `pose`. With a unit
    /// direction this is the distance.
    pub fn cast(&self, pose: &Isometry3<f64>, ray: &Ray, max_toi: f64) -> Option<f64> {
        match self {
            Geometry::Plane(s) => s.cast_ray(pose, ray, max_toi, false),
            Geometry::Box(s) => s.cast_ray(pose, ray, max_toi, false),
            Geometry::Sphere(s) => s.cast_ray(pose, ray, max_toi, false),
            Geometry::Cylinder(s) => s.cast_ray(pose, ray, max_toi, false),
        }
    }
}

// =========================================================================
// == Scene Objects ==
// =========================================================================

#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub id: ObjectId,
    pub color: Color,
    pub geometry: Geometry,
    /// Current world pose.
    pub pose: Isometry3<f64>,
    /// World-frame velocity, m/s.
    pub velocity: Vector3<f64>,
    /// Pose at elapsed time zero.
    initial_pose: Isometry3<f64>,
}

impl SceneObject {
    pub fn from_config(config: &ObjectConfig) -> Result<Self, SimError> {
        let geometry = Geometry::from_config(&config.shape)
            .map_err(|e| SimError::invalid(format!("object '{}': {e}", config.name)))?;
        let pose = config.pose.to_isometry();
        Ok(Self {
            name: config.name.clone(),
            id: config.id,
            color: config.color,
            geometry,
            pose,
            velocity: Vector3::from(config.velocity),
            initial_pose: pose,
        })
    }

    fn place_at(&mut self, elapsed: f64) {
        self.pose = self.initial_pose;
        self.pose.translation.vector += self.velocity * elapsed;
    }
}

// =========================================================================
// == Scene ==
// =========================================================================

/// Every object of a scenario plus the sensor looking at them.
#[derive(Debug, Clone)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
    pub sensor: SensorFrame,
    /// Seconds since the first frame.
    pub elapsed: f64,
}

impl Scene {
    pub fn new(sensor: SensorFrame, objects: Vec<SceneObject>) -> Self {
        Self {
            objects,
            sensor,
            elapsed: 0.0,
        }
    }

    pub fn from_config(config: &ScenarioConfig) -> Result<Self, SimError> {
        let objects = config
            .objects
            .iter()
            .map(SceneObject::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        for object in &objects {
            debug!(name = %object.name, id = object.id, "added scene object");
        }
        info!(objects = objects.len(), "scene built");
        Ok(Self::new(
            SensorFrame::new(config.sensor.pose.to_isometry()),
            objects,
        ))
    }

    /// The closest object along a world ray, with its distance.
    fn nearest(&self, ray: &Ray, max_distance: f64) -> Option<(f64, &SceneObject)> {
        self.objects
            .iter()
            .filter_map(|o| o.geometry.cast(&o.pose, ray, max_distance).map(|t| (t, o)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }
}

impl RayCaster for Scene {
    fn cast_rays(
        &self,
        rays: &[SensorRay],
        max_distance: f64,
        inversion: AxisInversion,
    ) -> blensor_core::prelude::Result<Vec<RayHit>> {
        let mut hits = Vec::with_capacity(rays.len());
        for (ray_id, sensor_ray) in rays.iter().enumerate() {
            let Some((origin, direction)) = self.sensor.world_ray(sensor_ray, inversion) else {
                continue;
            };
            let ray = Ray::new(origin, direction);
            if let Some((distance, object)) = self.nearest(&ray, max_distance) {
                let world: Point3<f64> = ray.point_at(distance);
                hits.push(RayHit {
                    ray_id,
                    distance,
                    point: self.sensor.to_sensor_point(&world),
                    object_id: object.id,
                    color: object.color,
                });
            }
        }
        trace!(rays = rays.len(), hits = hits.len(), "cast ray batch");
        Ok(hits)
    }
}

impl AnimatedScene for Scene {
    fn advance_to(&mut self, frame: u32, elapsed: f64) -> blensor_core::prelude::Result<()> {
        self.elapsed = elapsed;
        for object in &mut self.objects {
            object.place_at(elapsed);
        }
        debug!(frame, elapsed, "scene advanced");
        Ok(())
    }

    fn as_caster(&self) -> &dyn RayCaster {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::structs::Pose;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    fn object(id: ObjectId, shape: ShapeConfig, at: [f64; 3]) -> SceneObject {
        SceneObject::from_config(&ObjectConfig {
            name: format!("object{id}"),
            id,
            color: [0.2, 0.4, 0.6],
            shape,
            pose: Pose {
                translation: Vector3::from(at),
                ..Pose::default()
            },
            velocity: [0.0, 0.0, -1.0],
        })
        .unwrap()
    }

    /// Sensor 2 m above a ground plane with a unit sphere 5 m ahead.
    fn street() -> Scene {
        Scene::new(
            SensorFrame::new(Isometry3::from_parts(
                Translation3::new(0.0, 2.0, 0.0),
                UnitQuaternion::identity(),
            )),
            vec![
                object(1, ShapeConfig::Plane { normal: [0.0, 1.0, 0.0] }, [0.0; 3]),
                object(2, ShapeConfig::Sphere { radius: 1.0 }, [0.0, 2.0, -5.0]),
            ],
        )
    }

    #[test]
    fn nearest_object_wins() {
        let scene = street();
        let rays = [
            SensorRay::from_sensor(0, Vector3::new(0.0, 0.0, -1.0)),
            SensorRay::from_sensor(1, Vector3::new(0.0, -1.0, 0.0)),
            SensorRay::from_sensor(2, Vector3::new(0.0, 1.0, 0.0)),
        ];
        let hits = scene.cast_rays(&rays, 100.0, AxisInversion::NONE).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].ray_id, 0);
        assert_eq!(hits[0].object_id, 2);
        assert_relative_eq!(hits[0].distance, 4.0, epsilon = 1e-9);
        assert_relative_eq!(hits[0].point, Point3::new(0.0, 0.0, -4.0), epsilon = 1e-9);
        assert_eq!(hits[0].color, [0.2, 0.4, 0.6]);
        assert_eq!(hits[1].object_id, 1);
        assert_relative_eq!(hits[1].point, Point3::new(0.0, -2.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn hits_beyond_max_distance_are_dropped() {
        let scene = street();
        let rays = [SensorRay::from_sensor(0, Vector3::new(0.0, 0.0, -1.0))];
        assert!(scene
            .cast_rays(&rays, 3.5, AxisInversion::NONE)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn inverted_z_looks_backwards() {
        let scene = street();
        let rays = [SensorRay::from_sensor(0, Vector3::new(0.0, 0.0, -1.0))];
        let hits = scene
            .cast_rays(&rays, 100.0, AxisInversion::new(false, false, true))
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn advancing_moves_objects_along_their_velocity() {
        let mut scene = street();
        scene.advance_to(3, 2.0).unwrap();
        assert_relative_eq!(
            scene.objects[1].pose.translation.vector,
            Vector3::new(0.0, 2.0, -7.0),
            epsilon = 1e-12
        );
        // poses are absolute in elapsed time, not cumulative
        scene.advance_to(1, 1.0).unwrap();
        assert_relative_eq!(
            scene.objects[1].pose.translation.vector,
            Vector3::new(0.0, 2.0, -6.0),
            epsilon = 1e-12
        );
        let rays = [SensorRay::from_sensor(0, Vector3::new(0.0, 0.0, -1.0))];
        let hits = scene.as_caster().cast_rays(&rays, 100.0, AxisInversion::NONE).unwrap();
        assert_relative_eq!(hits[0].distance, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn boxes_and_cylinders_are_hit_on_their_faces() {
        let scene = Scene::new(
            SensorFrame::default(),
            vec![
                object(1, ShapeConfig::Box { size: [2.0, 2.0, 2.0] }, [0.0, 0.0, -10.0]),
                object(
                    2,
                    ShapeConfig::Cylinder {
                        radius: 0.5,
                        height: 4.0,
                    },
                    [3.0, 0.0, 0.0],
                ),
            ],
        );
        let rays = [
            SensorRay::from_sensor(0, Vector3::new(0.0, 0.0, -2.0)),
            SensorRay::from_sensor(1, Vector3::new(1.0, 0.0, 0.0)),
        ];
        let hits = scene.cast_rays(&rays, 50.0, AxisInversion::NONE).unwrap();
        assert_relative_eq!(hits[0].distance, 9.0, epsilon = 1e-9);
        assert_eq!(hits[1].object_id, 2);
        assert_relative_eq!(hits[1].distance, 2.5, epsilon = 1e-6);
    }
}
