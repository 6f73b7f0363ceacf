// blensor_core/src/models/mod.rs

pub mod noise;
pub mod perception;
