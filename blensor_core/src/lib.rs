// blensor_core/src/lib.rs

// This file defines the public modules of the library.
pub mod error;
pub mod evd;
pub mod messages;
pub mod models;
pub mod prelude;
pub mod range;
pub mod scanner;
pub mod types;
