// blensor_sim/src/simulation/world/mod.rs

//! The analytic scene the sensors look at.

pub mod scene;

pub use scene::{Geometry, Scene, SceneObject};
