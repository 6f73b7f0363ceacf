// blensor_core/src/error.rs

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure a scan, a noise model or the point-record sink can report.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Invalid or unparsable sensor parameters. Raised before any ray batch is built.
    #[error("invalid sensor configuration: {0}")]
    Configuration(String),

    /// A bias randomization asked for a distribution we do not know how to draw from.
    #[error("unsupported noise distribution '{0}' (expected 'gaussian' or 'laplace')")]
    UnsupportedDistribution(String),

    /// The ray-intersection provider itself failed.
    #[error("geometry query failed: {0}")]
    GeometryQuery(String),

    /// I/O failure while writing or reading point-record output.
    #[error("failed to write point records to {path:?}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    pub fn config(msg: impl Into<String>) -> Self {
        ScanError::Configuration(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ScanError::Serialization {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
