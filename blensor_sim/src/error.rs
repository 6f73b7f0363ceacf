// blensor_sim/src/error.rs

use blensor_core::error::ScanError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop the runner.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The scenario or a catalog file could not be parsed into its structs.
    #[error("failed to load configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("scenario file {0:?} does not exist")]
    MissingScenario(PathBuf),

    /// A `from = "..."` reference could not be resolved against the catalog.
    #[error("prefab resolution failed: {0}")]
    Prefab(String),

    /// The scenario parsed but describes something that cannot be simulated.
    #[error("invalid scenario: {0}")]
    Invalid(String),

    #[error("failed to render {what}: {source}")]
    Render {
        what: &'static str,
        #[source]
        source: toml::ser::Error,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<figment::Error> for SimError {
    fn from(e: figment::Error) -> Self {
        SimError::Config(Box::new(e))
    }
}

impl SimError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SimError::Invalid(msg.into())
    }
}
