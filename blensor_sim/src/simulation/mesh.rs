// blensor_sim/src/simulation/mesh.rs

//! Hands finished scans to an ASCII PLY file, the stand-in for an in-scene
//! point mesh.

use blensor_core::error::{Result, ScanError};
use blensor_core::evd::binary::quantize_color;
use blensor_core::prelude::{MeshBuilder, PointRecord};
use nalgebra::Point3;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes every delivered scan to one `.ply` file as colored vertices.
#[derive(Debug, Clone)]
pub struct PlyWriter {
    path: PathBuf,
    vertices_written: usize,
}

impl PlyWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            vertices_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Vertices in the last mesh written.
    pub fn vertices_written(&self) -> usize {
        self.vertices_written
    }
}

fn encode_ply<W: Write>(
    w: &mut W,
    name: &str,
    points: &[Point3<f64>],
    records: &[PointRecord],
) -> io::Result<()> {
    writeln!(w, "ply")?;
    writeln!(w, "format ascii 1.0")?;
    writeln!(w, "comment {name}")?;
    writeln!(w, "element vertex {}", points.len())?;
    writeln!(w, "property double x")?;
    writeln!(w, "property double y")?;
    writeln!(w, "property double z")?;
    writeln!(w, "property uchar red")?;
    writeln!(w, "property uchar green")?;
    writeln!(w, "property uchar blue")?;
    writeln!(w, "end_header")?;
    for (i, p) in points.iter().enumerate() {
        let [r, g, b] = records
            .get(i)
            .map(|rec| rec.color.map(|c| quantize_color(c) as u8))
            .unwrap_or([255; 3]);
        writeln!(w, "{} {} {} {r} {g} {b}", p.x, p.y, p.z)?;
    }
    w.flush()
}

impl MeshBuilder for PlyWriter {
    fn build_mesh(
        &mut self,
        name: &str,
        points: &[Point3<f64>],
        records: &[PointRecord],
    ) -> Result<()> {
        let file = File::create(&self.path).map_err(|e| ScanError::io(&self.path, e))?;
        let mut w = BufWriter::new(file);
        encode_ply(&mut w, name, points, records).map_err(|e| ScanError::io(&self.path, e))?;
        self.vertices_written = points.len();
        info!(path = %self.path.display(), vertices = points.len(), "wrote point mesh");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn vertices_carry_quantized_colors() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PlyWriter::new(dir.path().join("scan.ply"));
        let mut record = PointRecord::no_data(0, 0.0, 0.0, 0.0);
        record.color = [1.0, 0.5, 0.0];
        let points = [Point3::new(1.0, 2.0, -3.5), Point3::new(0.0, 0.0, -1.0)];
        writer.build_mesh("roof", &points, &[record]).unwrap();

        let text = fs::read_to_string(writer.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2], "comment roof");
        assert_eq!(lines[3], "element vertex 2");
        let body: Vec<&str> = text.split("end_header\n").nth(1).unwrap().lines().collect();
        assert_eq!(body, vec!["1 2 -3.5 255 127 0", "0 0 -1 255 255 255"]);
        assert_eq!(writer.vertices_written(), 2);
    }
}
