// blensor_core/src/evd/mod.rs

//! The point-record sink. Every scan fills one [`EvdStore`]; the store is then
//! flushed to a file (format picked by extension) or handed to a
//! [`MeshBuilder`].

pub mod binary;
pub mod text;

pub use binary::{read_evd, EvdRecord, EvdStream};

use crate::error::{Result, ScanError};
use crate::messages::PointRecord;
use crate::types::MeshBuilder;
use nalgebra::Point3;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Dense image layout of sensors whose samples form a regular grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageShape {
    pub width: usize,
    pub height: usize,
    /// Depth that maps to full scale in greyscale exports.
    pub max_depth: f64,
}

impl ImageShape {
    pub fn new(width: usize, height: usize, max_depth: f64) -> Self {
        Self {
            width,
            height,
            max_depth,
        }
    }

    pub fn cells(&self) -> usize {
        self.width * self.height
    }
}

/// File layout of a flushed store, chosen by the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Binary count-prefixed record blocks (any unrecognized extension).
    #[default]
    Evd,
    /// ASCII point cloud (`.pcd`).
    Pcd,
    /// ASCII greyscale depth image (`.pgm`).
    Pgm,
    /// Whitespace-separated numeric table (`.numpy`).
    Numpy,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pcd") => OutputFormat::Pcd,
            Some("pgm") => OutputFormat::Pgm,
            Some("numpy") => OutputFormat::Numpy,
            _ => OutputFormat::Evd,
        }
    }

    /// Text formats write one file per frame; EVD appends blocks to one stream.
    pub fn is_per_frame(&self) -> bool {
        !matches!(self, OutputFormat::Evd)
    }
}

/// `scan.pcd` + frame 12 -> `scan00012.pcd`.
pub fn frame_path(path: &Path, frame: u32) -> PathBuf {
    let stem = path.file_stem().and_then(OsStr::to_str).unwrap_or("scan");
    let name = match path.extension().and_then(OsStr::to_str) {
        Some(ext) => format!("{stem}{frame:05}.{ext}"),
        None => format!("{stem}{frame:05}"),
    };
    path.with_file_name(name)
}

/// `scan.pcd` -> `scan_noisy.pcd`.
pub fn noisy_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(OsStr::to_str).unwrap_or("scan");
    let name = match path.extension().and_then(OsStr::to_str) {
        Some(ext) => format!("{stem}_noisy.{ext}"),
        None => format!("{stem}_noisy"),
    };
    path.with_file_name(name)
}

/// Dense per-pixel copies of the range fields, kept for image-shaped sensors.
#[derive(Debug, Clone, PartialEq)]
struct DenseGrids {
    distance: Vec<f64>,
    distance_noise: Vec<f64>,
}

/// Ordered, append-only buffer of the records produced by one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct EvdStore {
    records: Vec<PointRecord>,
    shape: Option<ImageShape>,
    grids: Option<DenseGrids>,
    labels: bool,
}

impl Default for EvdStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EvdStore {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            shape: None,
            grids: None,
            labels: true,
        }
    }

    pub fn with_image_shape(shape: ImageShape) -> Self {
        let cells = shape.cells();
        Self {
            shape: Some(shape),
            grids: Some(DenseGrids {
                distance: vec![f64::NAN; cells],
                distance_noise: vec![f64::NAN; cells],
            }),
            ..Self::new()
        }
    }

    /// Whether `.pcd` exports carry the object id as an integer label.
    pub fn set_labels(&mut self, labels: bool) {
        self.labels = labels;
    }

    pub fn labels(&self) -> bool {
        self.labels
    }

    pub fn add_entry(&mut self, record: PointRecord) {
        if let Some(grids) = self.grids.as_mut() {
            if record.point_index < grids.distance.len() {
                grids.distance[record.point_index] = record.distance;
                grids.distance_noise[record.point_index] = record.distance_noise;
            }
        }
        self.records.push(record);
    }

    pub fn records(&self) -> &[PointRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn image_shape(&self) -> Option<ImageShape> {
        self.shape
    }

    /// Clean distances by grid cell, `NaN` where no record landed.
    pub fn distance_grid(&self) -> Option<&[f64]> {
        self.grids.as_ref().map(|g| g.distance.as_slice())
    }

    pub fn noisy_distance_grid(&self) -> Option<&[f64]> {
        self.grids.as_ref().map(|g| g.distance_noise.as_slice())
    }

    /// Positions of the records that carry a measurement.
    pub fn points(&self, noisy: bool) -> Vec<Point3<f64>> {
        self.records
            .iter()
            .filter(|r| r.is_valid())
            .map(|r| if noisy { r.position_noise } else { r.position })
            .collect()
    }

    /// Appends the buffer as one count-prefixed EVD block.
    pub fn append_to_file(&self, path: &Path) -> Result<()> {
        binary::append_block(path, &self.records)?;
        debug!(path = %path.display(), records = self.records.len(), "appended EVD block");
        Ok(())
    }

    /// Flushes the buffer as the last EVD block and marks the end of the
    /// capture.
    pub fn finalize(&self, path: &Path) -> Result<()> {
        self.append_to_file(path)?;
        binary::append_end_of_capture(path)
    }

    /// Flushes the buffer in the format implied by `path`'s extension. Text
    /// formats get the frame number spliced into the file name when `frame`
    /// is given; EVD always appends to `path` itself.
    pub fn write(&self, path: &Path, frame: Option<u32>) -> Result<()> {
        let format = OutputFormat::from_path(path);
        let target = match (format.is_per_frame(), frame) {
            (true, Some(frame)) => frame_path(path, frame),
            _ => path.to_path_buf(),
        };
        match format {
            OutputFormat::Evd => self.append_to_file(&target)?,
            OutputFormat::Pcd => {
                text::write_pcd(&target, self, false)?;
                text::write_pcd(&noisy_path(&target), self, true)?;
            }
            OutputFormat::Pgm => {
                let shape = self.shape.ok_or_else(|| {
                    ScanError::config("greyscale depth export needs an image-shaped sensor")
                })?;
                let grids = self.grids.as_ref().ok_or_else(|| {
                    ScanError::config("greyscale depth export needs dense range grids")
                })?;
                text::write_pgm(&target, &shape, &grids.distance)?;
                text::write_pgm(&noisy_path(&target), &shape, &grids.distance_noise)?;
            }
            OutputFormat::Numpy => text::write_table(&target, &self.records)?,
        }
        info!(path = %target.display(), ?format, records = self.records.len(), "flushed scan");
        Ok(())
    }

    /// Hands the points, already in the output frame, to a mesh builder.
    pub fn deliver(&self, builder: &mut dyn MeshBuilder, name: &str, noisy: bool) -> Result<()> {
        let valid: Vec<PointRecord> = self.records.iter().copied().filter(|r| r.is_valid()).collect();
        let points: Vec<Point3<f64>> = valid
            .iter()
            .map(|r| if noisy { r.position_noise } else { r.position })
            .collect();
        builder.build_mesh(name, &points, &valid)
    }
}
