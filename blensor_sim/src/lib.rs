// blensor_sim/src/lib.rs

//! Scenario runner for the `blensor_core` sensor engines: loads TOML
//! scenarios, builds an analytic scene and flushes the scans.

// This prelude is for convenience for other files WITHIN the blensor_sim crate.
pub mod prelude;

pub mod cli;
pub mod error;
pub mod simulation;
