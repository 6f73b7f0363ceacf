// blensor_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::models::perception::{RayCaster, RaycastingSensorModel};
pub use crate::range::AnimatedScene;
pub use crate::types::MeshBuilder;

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::error::{Result, ScanError};
pub use crate::evd::{EvdStore, ImageShape, OutputFormat};
pub use crate::messages::{DepthMap, PointRecord};
pub use crate::models::perception::{RayHit, ScanContext, SensorRay};
pub use crate::types::{AxisInversion, Color, ObjectId, OutputFrame, NO_OBJECT};

// --- Scanning Entry Points ---
pub use crate::range::{CancelToken, RangeScan, RangeScanReport, SentinelPolicy};
pub use crate::scanner::{BiasFamily, PreparedSensor, ScanOutput, Scanner, SensorKind};

// --- Concrete Sensor Parameters (Export common ones for convenience) ---
pub use crate::models::noise::{BiasTable, DistanceTable, ErrorModel, GaussianNoise};
pub use crate::models::perception::depthmap::DepthMapParams;
pub use crate::models::perception::generic::{BeamParsing, GenericLidarParams};
pub use crate::models::perception::ibeo::IbeoParams;
pub use crate::models::perception::kinect::KinectParams;
pub use crate::models::perception::tof::TofParams;
pub use crate::models::perception::velodyne::{VelodyneModel, VelodyneParams};
