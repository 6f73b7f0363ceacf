// blensor_core/src/evd/text.rs

//! Text exports of a store: PCD point clouds, PGM depth images and a plain
//! numeric table.

use super::binary::{quantize_color, serialize_object_id};
use super::{EvdStore, ImageShape};
use crate::error::{Result, ScanError};
use crate::messages::PointRecord;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Largest grey level of the 16-bit depth images.
pub const PGM_MAX_GREY: u32 = 65535;

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| ScanError::io(path, e))?;
    Ok(BufWriter::new(file))
}

/// Packs a `[0, 1]` color into the single float PCD uses for `rgb`.
pub fn pack_rgb(color: &[f64; 3]) -> f32 {
    let [r, g, b] = color.map(|c| quantize_color(c) as u32);
    f32::from_bits((r << 16) | (g << 8) | b)
}

fn pcd_row<W: Write>(w: &mut W, record: &PointRecord, noisy: bool, labels: bool) -> io::Result<()> {
    let p = if noisy {
        record.position_noise
    } else {
        record.position
    };
    if record.is_valid() {
        write!(w, "{} {} {} {:e}", p.x, p.y, p.z, pack_rgb(&record.color))?;
    } else {
        write!(w, "nan nan nan 0")?;
    }
    if labels {
        write!(w, " {}", serialize_object_id(record.object_id))?;
    }
    writeln!(w)
}

fn encode_pcd<W: Write>(w: &mut W, store: &EvdStore, noisy: bool) -> io::Result<()> {
    let labels = store.labels();
    // Organized clouds keep one row per grid cell; sparse ones only valid points.
    let organized: Option<(ImageShape, Vec<Option<&PointRecord>>)> =
        store.image_shape().map(|shape| {
            let mut cells = vec![None; shape.cells()];
            for r in store.records() {
                if let Some(cell) = cells.get_mut(r.point_index) {
                    *cell = Some(r);
                }
            }
            (shape, cells)
        });
    let sparse: Vec<&PointRecord> = store.records().iter().filter(|r| r.is_valid()).collect();

    let (width, height, count) = match &organized {
        Some((shape, _)) => (shape.width, shape.height, shape.cells()),
        None => (sparse.len(), 1, sparse.len()),
    };

    writeln!(w, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(w, "VERSION 0.7")?;
    if labels {
        writeln!(w, "FIELDS x y z rgb label")?;
        writeln!(w, "SIZE 4 4 4 4 4")?;
        writeln!(w, "TYPE F F F F U")?;
        writeln!(w, "COUNT 1 1 1 1 1")?;
    } else {
        writeln!(w, "FIELDS x y z rgb")?;
        writeln!(w, "SIZE 4 4 4 4")?;
        writeln!(w, "TYPE F F F F")?;
        writeln!(w, "COUNT 1 1 1 1")?;
    }
    writeln!(w, "WIDTH {width}")?;
    writeln!(w, "HEIGHT {height}")?;
    writeln!(w, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(w, "POINTS {count}")?;
    writeln!(w, "DATA ascii")?;

    match organized {
        Some((_, cells)) => {
            let empty = PointRecord::no_data(0, 0.0, 0.0, 0.0);
            for cell in cells {
                pcd_row(w, cell.unwrap_or(&empty), noisy, labels)?;
            }
        }
        None => {
            for r in sparse {
                pcd_row(w, r, noisy, labels)?;
            }
        }
    }
    Ok(())
}

pub fn write_pcd(path: &Path, store: &EvdStore, noisy: bool) -> Result<()> {
    let mut writer = create(path)?;
    encode_pcd(&mut writer, store, noisy)
        .and_then(|_| writer.flush())
        .map_err(|e| ScanError::io(path, e))
}

/// Grey level of one depth cell; missing cells are black.
pub fn grey_level(depth: f64, max_depth: f64) -> u32 {
    if !depth.is_finite() || !(max_depth > 0.0) {
        return 0;
    }
    let scaled = (depth / max_depth * PGM_MAX_GREY as f64).round();
    scaled.clamp(0.0, PGM_MAX_GREY as f64) as u32
}

fn encode_pgm<W: Write>(w: &mut W, shape: &ImageShape, grid: &[f64]) -> io::Result<()> {
    writeln!(w, "P2")?;
    writeln!(w, "{} {}", shape.width, shape.height)?;
    writeln!(w, "{PGM_MAX_GREY}")?;
    for row in grid.chunks(shape.width.max(1)).take(shape.height) {
        let line: Vec<String> = row
            .iter()
            .map(|d| grey_level(*d, shape.max_depth).to_string())
            .collect();
        writeln!(w, "{}", line.join(" "))?;
    }
    Ok(())
}

pub fn write_pgm(path: &Path, shape: &ImageShape, grid: &[f64]) -> Result<()> {
    if grid.len() != shape.cells() {
        return Err(ScanError::config(format!(
            "depth grid has {} cells, image shape {}x{} needs {}",
            grid.len(),
            shape.width,
            shape.height,
            shape.cells()
        )));
    }
    let mut writer = create(path)?;
    encode_pgm(&mut writer, shape, grid)
        .and_then(|_| writer.flush())
        .map_err(|e| ScanError::io(path, e))
}

/// Column order of the numeric table.
pub const TABLE_COLUMNS: &str = "timestamp yaw pitch distance distance_noise x y z \
x_noise y_noise z_noise r g b object_id point_index";

fn encode_table<W: Write>(w: &mut W, records: &[PointRecord]) -> io::Result<()> {
    writeln!(w, "# {TABLE_COLUMNS}")?;
    for r in records {
        writeln!(
            w,
            "{} {} {} {} {} {} {} {} {} {} {} {} {} {} {} {}",
            r.timestamp,
            r.yaw,
            r.pitch,
            r.distance,
            r.distance_noise,
            r.position.x,
            r.position.y,
            r.position.z,
            r.position_noise.x,
            r.position_noise.y,
            r.position_noise.z,
            quantize_color(r.color[0]),
            quantize_color(r.color[1]),
            quantize_color(r.color[2]),
            serialize_object_id(r.object_id),
            r.point_index
        )?;
    }
    Ok(())
}

pub fn write_table(path: &Path, records: &[PointRecord]) -> Result<()> {
    let mut writer = create(path)?;
    encode_table(&mut writer, records)
        .and_then(|_| writer.flush())
        .map_err(|e| ScanError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn hit(index: usize, z: f64) -> PointRecord {
        PointRecord {
            timestamp: 0.5,
            yaw: 0.0,
            pitch: 0.0,
            distance: z,
            distance_noise: z,
            position: Point3::new(1.0, 2.0, -z),
            position_noise: Point3::new(1.0, 2.0, -z),
            object_id: 7,
            color: [1.0, 0.0, 0.0],
            point_index: index,
        }
    }

    #[test]
    fn rgb_packs_into_float_bits() {
        assert_eq!(pack_rgb(&[1.0, 0.0, 0.0]).to_bits(), 0x00ff_0000);
        assert_eq!(pack_rgb(&[0.0, 1.0, 1.0]).to_bits(), 0x0000_ffff);
    }

    #[test]
    fn sparse_pcd_lists_only_valid_points() {
        let mut store = EvdStore::new();
        store.add_entry(hit(0, 3.0));
        store.add_entry(PointRecord::no_data(1, 0.0, 0.0, 0.0));
        let mut buf = Vec::new();
        encode_pcd(&mut buf, &store, false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("FIELDS x y z rgb label\n"));
        assert!(text.contains("WIDTH 1\nHEIGHT 1\n"));
        assert!(text.contains("POINTS 1\n"));
        let last = text.lines().last().unwrap();
        assert!(last.starts_with("1 2 -3 "));
        assert!(last.ends_with(" 7"));
    }

    #[test]
    fn organized_pcd_fills_missing_cells() {
        let mut store = EvdStore::with_image_shape(ImageShape::new(2, 2, 10.0));
        store.set_labels(false);
        store.add_entry(hit(3, 4.0));
        let mut buf = Vec::new();
        encode_pcd(&mut buf, &store, true).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("FIELDS x y z rgb\n"));
        assert!(text.contains("WIDTH 2\nHEIGHT 2\n"));
        let rows: Vec<&str> = text.lines().skip_while(|l| *l != "DATA ascii").skip(1).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], "nan nan nan 0");
        assert!(rows[3].starts_with("1 2 -4 "));
    }

    #[test]
    fn pgm_scales_to_sixteen_bits() {
        assert_eq!(grey_level(5.0, 10.0), 32768);
        assert_eq!(grey_level(10.0, 10.0), PGM_MAX_GREY);
        assert_eq!(grey_level(25.0, 10.0), PGM_MAX_GREY);
        assert_eq!(grey_level(f64::NAN, 10.0), 0);

        let shape = ImageShape::new(2, 1, 10.0);
        let mut buf = Vec::new();
        encode_pgm(&mut buf, &shape, &[0.0, 10.0]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "P2\n2 1\n65535\n0 65535\n");
    }

    #[test]
    fn table_rows_follow_column_order() {
        let mut buf = Vec::new();
        encode_table(&mut buf, &[hit(4, 2.0)]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let row: Vec<&str> = text.lines().nth(1).unwrap().split(' ').collect();
        assert_eq!(row.len(), 16);
        assert_eq!(row[0], "0.5");
        assert_eq!(row[3], "2");
        assert_eq!(row[11], "255");
        assert_eq!(row[14], "7");
        assert_eq!(row[15], "4");
    }

    #[test]
    fn pcd_and_pgm_files_are_written_in_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EvdStore::with_image_shape(ImageShape::new(1, 1, 5.0));
        store.add_entry(hit(0, 2.5));
        store.write(&dir.path().join("cam.pcd"), Some(3)).unwrap();
        store.write(&dir.path().join("cam.pgm"), None).unwrap();
        for name in ["cam00003.pcd", "cam00003_noisy.pcd", "cam.pgm", "cam_noisy.pgm"] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }
        let pgm = std::fs::read_to_string(dir.path().join("cam.pgm")).unwrap();
        assert_eq!(pgm, "P2\n1 1\n65535\n32768\n");
    }
}
