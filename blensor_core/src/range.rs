// blensor_core/src/range.rs

//! Range scans: one scan per animation frame, flushed frame by frame.

use crate::error::{Result, ScanError};
use crate::evd::{binary, OutputFormat};
use crate::models::perception::{RayCaster, ScanContext};
use crate::scanner::{Scanner, SensorKind};
use rand::RngCore;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A scene that can be stepped through an animation.
pub trait AnimatedScene {
    /// Moves the scene to `frame`, `elapsed` seconds after the first frame.
    fn advance_to(&mut self, frame: u32, elapsed: f64) -> Result<()>;

    fn as_caster(&self) -> &dyn RayCaster;
}

/// When the end-of-capture marker is appended to an EVD stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SentinelPolicy {
    /// Only when the last configured frame was flushed.
    #[default]
    OnLastFrame,
    /// Also after a failed or cancelled capture.
    Always,
}

/// Cooperative cancellation, checked once before every frame.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How far a range scan got.
#[derive(Debug, Default)]
pub struct RangeScanReport {
    pub frames_completed: u32,
    /// Records flushed over all completed frames.
    pub records_written: usize,
    pub sentinel_written: bool,
    pub cancelled: bool,
    /// The failure that stopped the capture, if any. Frames flushed before it
    /// stay on disk.
    pub error: Option<ScanError>,
}

impl RangeScanReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }

    /// Turns a failed capture into its error.
    pub fn into_result(self) -> Result<u32> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.frames_completed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeScan {
    pub first_frame: u32,
    /// Inclusive.
    pub last_frame: u32,
    pub fps: f64,
    pub sentinel: SentinelPolicy,
}

impl RangeScan {
    pub fn new(first_frame: u32, last_frame: u32, fps: f64) -> Self {
        Self {
            first_frame,
            last_frame,
            fps,
            sentinel: SentinelPolicy::default(),
        }
    }

    pub fn with_sentinel(mut self, sentinel: SentinelPolicy) -> Self {
        self.sentinel = sentinel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fps > 0.0) || !self.fps.is_finite() {
            return Err(ScanError::config(format!(
                "frames per second must be positive, got {}",
                self.fps
            )));
        }
        if self.last_frame < self.first_frame {
            return Err(ScanError::config(format!(
                "frame range {}..={} is empty",
                self.first_frame, self.last_frame
            )));
        }
        Ok(())
    }

    pub fn frame_count(&self) -> u32 {
        self.last_frame.saturating_sub(self.first_frame) + 1
    }

    /// Scans every frame in order and flushes each to `output`. Stops at the
    /// first failure or when `cancel` fires.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        scanner: &Scanner,
        sensor: &SensorKind,
        ctx: &ScanContext,
        scene: &mut dyn AnimatedScene,
        output: &Path,
        rng: &mut dyn RngCore,
        cancel: &CancelToken,
    ) -> RangeScanReport {
        let mut report = RangeScanReport::default();
        let prepared = match self.validate().and_then(|_| sensor.prepare()) {
            Ok(p) => p,
            Err(e) => {
                error!(%e, "range scan rejected");
                report.error = Some(e);
                return report;
            }
        };
        let duration = 1.0 / self.fps;

        for frame in self.first_frame..=self.last_frame {
            if cancel.is_cancelled() {
                warn!(frame, "range scan cancelled");
                report.cancelled = true;
                break;
            }
            let elapsed = (frame - self.first_frame) as f64 * duration;
            let frame_ctx = ScanContext {
                time_offset: elapsed,
                ..*ctx
            };
            let result = scene.advance_to(frame, elapsed).and_then(|_| {
                let frame_sensor = prepared.for_frame(elapsed, duration);
                let out = scanner.scan_prepared(&frame_sensor, &frame_ctx, scene.as_caster(), rng)?;
                out.write(output, Some(frame))?;
                Ok(out.store.len())
            });
            match result {
                Ok(records) => {
                    report.frames_completed += 1;
                    report.records_written += records;
                    info!(frame, records, "frame scanned");
                }
                Err(e) => {
                    error!(frame, %e, "range scan aborted");
                    report.error = Some(e);
                    break;
                }
            }
        }

        let write_sentinel = match self.sentinel {
            SentinelPolicy::OnLastFrame => report.is_complete(),
            SentinelPolicy::Always => true,
        };
        if write_sentinel && !OutputFormat::from_path(output).is_per_frame() {
            match binary::append_end_of_capture(output) {
                Ok(()) => report.sentinel_written = true,
                Err(e) => {
                    if report.error.is_none() {
                        report.error = Some(e);
                    }
                }
            }
        }
        report
    }
}
