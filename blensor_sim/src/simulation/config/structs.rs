// blensor_sim/src/simulation/config/structs.rs

use crate::error::SimError;
use crate::simulation::utils::serde_helpers;
use blensor_core::prelude::{AxisInversion, ObjectId, SensorKind, SentinelPolicy};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::Deserialize;
use std::path::PathBuf;

// =========================================================================
// == Top-Level Scenario Configuration ==
// =========================================================================

/// This struct is the root of the data parsed from a `scenario.toml` file,
/// after every `from = "..."` reference has been resolved.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct ScenarioConfig {
    #[serde(default)] // Use default if the [simulation] section is missing
    pub simulation: Simulation,
    pub sensor: SensorConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub output: OutputConfig,
    // The TOML has `[[objects]]`, which becomes a Vec of ObjectConfig structs.
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
}

impl ScenarioConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.objects.is_empty() {
            return Err(SimError::invalid("scenario has no objects to scan"));
        }
        for object in &self.objects {
            object.shape.validate().map_err(|e| {
                SimError::invalid(format!("object '{}': {e}", object.name))
            })?;
        }
        if let Some(range) = &self.scan.range {
            if range.last_frame < range.first_frame || !(range.fps > 0.0) {
                return Err(SimError::invalid(format!(
                    "range scan {}..={} at {} fps is empty",
                    range.first_frame, range.last_frame, range.fps
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Simulation {
    /// Seed of the simulation generator; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

// =========================================================================
// == Sensor ==
// =========================================================================

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_name")]
    pub name: String,
    /// World pose of the sensor origin.
    #[serde(default)]
    pub pose: Pose,
    /// The sensor engine and its parameters, typically `from` a catalog preset.
    pub device: SensorKind,
    /// Redraw the sensor's per-beam bias table before scanning.
    #[serde(default)]
    pub bias: Option<BiasConfig>,
}

fn default_sensor_name() -> String {
    "scan".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BiasConfig {
    #[serde(default)]
    pub mu: f64,
    pub sigma: f64,
    #[serde(default = "default_distribution")]
    pub distribution: String,
}

fn default_distribution() -> String {
    "gaussian".to_string()
}

// =========================================================================
// == Scan Options ==
// =========================================================================

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    /// Emit points in world coordinates instead of sensor-local ones.
    #[serde(default)]
    pub world_output: bool,
    #[serde(default)]
    pub invert: AxisInversion,
    /// Scan an animation instead of a single frame.
    #[serde(default)]
    pub range: Option<RangeConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RangeConfig {
    pub first_frame: u32,
    pub last_frame: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default)]
    pub sentinel: SentinelConfig,
}

fn default_fps() -> f64 {
    24.0
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SentinelConfig {
    #[default]
    OnLastFrame,
    Always,
}

impl From<SentinelConfig> for SentinelPolicy {
    fn from(c: SentinelConfig) -> Self {
        match c {
            SentinelConfig::OnLastFrame => SentinelPolicy::OnLastFrame,
            SentinelConfig::Always => SentinelPolicy::Always,
        }
    }
}

// =========================================================================
// == Output ==
// =========================================================================

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Record file; the extension picks the format.
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    /// Object-id labels in `.pcd` output.
    #[serde(default = "default_true")]
    pub labels: bool,
    /// Also write the points of a single scan as a `.ply` mesh.
    #[serde(default)]
    pub mesh: Option<PathBuf>,
    /// Whether the mesh shows the noisy or the clean points.
    #[serde(default = "default_true")]
    pub noisy_mesh: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            labels: true,
            mesh: None,
            noisy_mesh: true,
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from("scan.evd")
}

fn default_true() -> bool {
    true
}

// =========================================================================
// == Scene Objects ==
// =========================================================================

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ObjectConfig {
    pub name: String,
    /// Reported as the object id of every hit on this object.
    pub id: ObjectId,
    #[serde(default = "default_color")]
    pub color: [f64; 3],
    pub shape: ShapeConfig,
    #[serde(default)]
    pub pose: Pose,
    /// Constant world-frame velocity applied during range scans, m/s.
    #[serde(default)]
    pub velocity: [f64; 3],
}

fn default_color() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")] // This tells serde to use the "type" field to decide which enum variant to parse
#[serde(rename_all = "PascalCase")] // e.g., "Sphere" in TOML maps to `Sphere` variant
pub enum ShapeConfig {
    /// Infinite ground plane through the pose origin.
    Plane {
        #[serde(default = "default_up")]
        normal: [f64; 3],
    },
    Box {
        /// Full edge lengths.
        size: [f64; 3],
    },
    Sphere {
        radius: f64,
    },
    /// Axis along the object's local Y.
    Cylinder {
        radius: f64,
        height: f64,
    },
}

fn default_up() -> [f64; 3] {
    [0.0, 1.0, 0.0]
}

impl ShapeConfig {
    pub fn validate(&self) -> Result<(), String> {
        let positive = |name: &str, v: f64| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(format!("{name} must be positive, got {v}"))
            }
        };
        match self {
            ShapeConfig::Plane { normal } => {
                if Vector3::from(*normal).norm() > 1e-9 {
                    Ok(())
                } else {
                    Err("plane normal must be non-zero".to_string())
                }
            }
            ShapeConfig::Box { size } => size.iter().try_for_each(|s| positive("box size", *s)),
            ShapeConfig::Sphere { radius } => positive("sphere radius", *radius),
            ShapeConfig::Cylinder { radius, height } => {
                positive("cylinder radius", *radius)?;
                positive("cylinder height", *height)
            }
        }
    }
}

// =========================================================================
// == Helper Structs for Nested Configuration ==
// =========================================================================

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct Pose {
    #[serde(with = "serde_helpers::vec3_from_array", default)]
    pub translation: Vector3<f64>,

    /// `[roll, pitch, yaw]` in degrees.
    #[serde(with = "serde_helpers::quat_from_euler_deg", default)]
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }
}

impl Pose {
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }
}
