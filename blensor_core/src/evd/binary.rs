// blensor_core/src/evd/binary.rs

//! The EVD binary stream.
//!
//! A stream is a sequence of blocks. Each block starts with a little-endian
//! `i32` record count followed by that many fixed-size records:
//!
//! - 14 little-endian `f64`: timestamp, yaw, pitch, distance, distance_noise,
//!   x, y, z, x_noise, y_noise, z_noise, color_r, color_g, color_b
//!   (colors hold values in `[0, 255]`)
//! - one little-endian `u64`: the object id, clamped to `>= 0`
//!
//! A block whose count is `-1` marks the end of a capture.

use crate::error::{Result, ScanError};
use crate::messages::PointRecord;
use crate::types::ObjectId;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Size in bytes of one encoded record.
pub const RECORD_SIZE: usize = 14 * 8 + 8;
/// Count value that terminates a capture.
pub const END_OF_CAPTURE: i32 = -1;

/// Maps a `[0, 1]` color channel to the `[0, 255]` integer grid used on disk.
pub fn quantize_color(channel: f64) -> f64 {
    (255.0 * channel).clamp(0.0, 255.0).trunc()
}

/// The on-disk object id field is unsigned; "no object" sentinels become 0.
pub fn serialize_object_id(id: ObjectId) -> u64 {
    id.max(0) as u64
}

pub(crate) fn encode_record<W: Write>(w: &mut W, r: &PointRecord) -> io::Result<()> {
    let fields = [
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
    ];
    for f in fields {
        w.write_all(&f.to_le_bytes())?;
    }
    w.write_all(&serialize_object_id(r.object_id).to_le_bytes())
}

/// Writes one count-prefixed block.
pub fn write_block<W: Write>(w: &mut W, records: &[PointRecord]) -> io::Result<()> {
    let count = i32::try_from(records.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} records do not fit in one EVD block", records.len()),
        )
    })?;
    w.write_all(&count.to_le_bytes())?;
    for r in records {
        encode_record(w, r)?;
    }
    Ok(())
}

fn open_for_append(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ScanError::io(path, e))?;
    Ok(BufWriter::new(file))
}

/// Appends one block to `path`, creating the file if it does not exist.
pub fn append_block(path: &Path, records: &[PointRecord]) -> Result<()> {
    let mut writer = open_for_append(path)?;
    write_block(&mut writer, records)
        .and_then(|_| writer.flush())
        .map_err(|e| ScanError::io(path, e))
}

/// Appends the end-of-capture marker to `path`.
pub fn append_end_of_capture(path: &Path) -> Result<()> {
    let mut writer = open_for_append(path)?;
    writer
        .write_all(&END_OF_CAPTURE.to_le_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| ScanError::io(path, e))
}

// =========================================================================
// == Reading ==
// =========================================================================

/// One record as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvdRecord {
    pub timestamp: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub distance: f64,
    pub distance_noise: f64,
    pub position: [f64; 3],
    pub position_noise: [f64; 3],
    /// Channels in `[0, 255]`.
    pub color: [f64; 3],
    pub object_id: u64,
}

/// A decoded stream: one entry per block, in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvdStream {
    pub frames: Vec<Vec<EvdRecord>>,
    /// Whether the stream ended with the end-of-capture marker.
    pub terminated: bool,
}

impl EvdStream {
    pub fn record_count(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }
}

/// Reads a block count. `None` on a clean end of input.
fn read_count<R: Read>(r: &mut R) -> io::Result<Option<i32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated EVD block header",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Some(i32::from_le_bytes(buf)))
}

fn decode_record(bytes: &[u8; RECORD_SIZE]) -> EvdRecord {
    let f = |i: usize| {
        let mut b = [0u8; 8];
        b.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
        f64::from_le_bytes(b)
    };
    let mut id = [0u8; 8];
    id.copy_from_slice(&bytes[14 * 8..]);
    EvdRecord {
        timestamp: f(0),
        yaw: f(1),
        pitch: f(2),
        distance: f(3),
        distance_noise: f(4),
        position: [f(5), f(6), f(7)],
        position_noise: [f(8), f(9), f(10)],
        color: [f(11), f(12), f(13)],
        object_id: u64::from_le_bytes(id),
    }
}

/// Decodes blocks until the end-of-capture marker or the end of input.
pub fn read_stream<R: Read>(r: &mut R) -> io::Result<EvdStream> {
    let mut stream = EvdStream::default();
    while let Some(count) = read_count(r)? {
        if count == END_OF_CAPTURE {
            stream.terminated = true;
            break;
        }
        let count = usize::try_from(count).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid EVD block count {count}"),
            )
        })?;
        // the count is untrusted until the records actually arrive
        let mut frame = Vec::with_capacity(count.min(1 << 16));
        let mut bytes = [0u8; RECORD_SIZE];
        for _ in 0..count {
            r.read_exact(&mut bytes)?;
            frame.push(decode_record(&bytes));
        }
        stream.frames.push(frame);
    }
    Ok(stream)
}

pub fn read_evd(path: &Path) -> Result<EvdStream> {
    let file = File::open(path).map_err(|e| ScanError::io(path, e))?;
    let mut reader = BufReader::new(file);
    read_stream(&mut reader).map_err(|e| ScanError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NO_OBJECT;
    use nalgebra::Point3;
    use std::io::Cursor;

    fn record(i: usize) -> PointRecord {
        let k = i as f64;
        PointRecord {
            timestamp: 0.001 * k,
            yaw: 0.1 + k,
            pitch: -0.2,
            distance: 10.0 / 3.0 + k,
            distance_noise: 10.0 / 3.0 + k + 1e-3,
            position: Point3::new(1.0 / 7.0, 2.0 + k, -3.5),
            position_noise: Point3::new(1.0 / 7.0 + 1e-9, 2.0 + k, -3.5),
            object_id: if i % 2 == 0 { i as i64 } else { NO_OBJECT },
            color: [1.0, 0.5, 0.0],
            point_index: i,
        }
    }

    #[test]
    fn record_layout_is_fixed_width() {
        let mut buf = Vec::new();
        write_block(&mut buf, &[record(0), record(1)]).unwrap();
        assert_eq!(buf.len(), 4 + 2 * RECORD_SIZE);
        assert_eq!(&buf[..4], &2i32.to_le_bytes());
        // object id of the second record is the last 8 bytes
        assert_eq!(&buf[buf.len() - 8..], &0u64.to_le_bytes());
    }

    #[test]
    fn round_trip_preserves_fields() {
        let records: Vec<PointRecord> = (0..5).map(record).collect();
        let mut buf = Vec::new();
        write_block(&mut buf, &records).unwrap();
        buf.extend_from_slice(&END_OF_CAPTURE.to_le_bytes());

        let stream = read_stream(&mut Cursor::new(buf)).unwrap();
        assert!(stream.terminated);
        assert_eq!(stream.frames.len(), 1);
        for (orig, back) in records.iter().zip(&stream.frames[0]) {
            assert_eq!(back.timestamp, orig.timestamp);
            assert_eq!(back.yaw, orig.yaw);
            assert_eq!(back.pitch, orig.pitch);
            assert_eq!(back.distance, orig.distance);
            assert_eq!(back.distance_noise, orig.distance_noise);
            assert_eq!(back.position, [orig.position.x, orig.position.y, orig.position.z]);
            assert_eq!(
                back.position_noise,
                [orig.position_noise.x, orig.position_noise.y, orig.position_noise.z]
            );
            assert_eq!(back.color, [255.0, 127.0, 0.0]);
            assert_eq!(back.object_id, orig.object_id.max(0) as u64);
        }
    }

    #[test]
    fn unterminated_stream_reads_to_eof() {
        let mut buf = Vec::new();
        write_block(&mut buf, &[record(2)]).unwrap();
        write_block(&mut buf, &[]).unwrap();
        let stream = read_stream(&mut Cursor::new(buf)).unwrap();
        assert!(!stream.terminated);
        assert_eq!(stream.frames.len(), 2);
        assert_eq!(stream.record_count(), 1);
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut buf = Vec::new();
        write_block(&mut buf, &[record(0)]).unwrap();
        buf.truncate(buf.len() - 3);
        let err = read_stream(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn huge_count_without_records_is_an_error() {
        let buf = 0x7fff_ffffi32.to_le_bytes();
        let err = read_stream(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn color_quantization_truncates_and_clamps() {
        assert_eq!(quantize_color(1.0), 255.0);
        assert_eq!(quantize_color(0.999), 254.0);
        assert_eq!(quantize_color(-0.3), 0.0);
        assert_eq!(quantize_color(1.7), 255.0);
    }
}
