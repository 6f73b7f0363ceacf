// blensor_sim/src/prelude.rs

// Re-export the entire blensor_core prelude so you can easily access
// pure types like `SensorKind`, `Scanner`, `RayCaster`, etc.
pub use blensor_core::prelude::*;

pub use crate::error::SimError;

// Re-export common simulation-specific types for easy access.
pub use crate::simulation::config::structs::*;
pub use crate::simulation::config::{load_catalog_from_disk, load_scenario, PrefabCatalog};
pub use crate::simulation::core::{prng::SimulationRng, transforms::SensorFrame};
pub use crate::simulation::mesh::PlyWriter;
pub use crate::simulation::runner::{run_scenario, summarize_evd, EvdSummary, RunOptions, RunSummary};
pub use crate::simulation::world::{Geometry, Scene, SceneObject};
