// blensor_core/src/models/perception/sweep.rs

//! Angle bookkeeping shared by the rotating sensors.

use crate::error::{Result, ScanError};
use nalgebra::{Rotation3, Vector3};
use std::f64::consts::{PI, TAU};

/// A horizontal sweep, all angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepParams {
    pub angle_resolution: f64,
    /// Revolutions per second.
    pub rotation_speed: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub max_distance: f64,
}

/// One horizontal step of a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepStep {
    /// Rotation about the vertical axis, radians, wrapped into `[0, 2π)`.
    pub rotation: f64,
    /// Seconds since the sweep angle 0.
    pub timestamp: f64,
    /// Recorded horizontal angle, `(rotation + π) mod 2π`.
    pub yaw: f64,
}

impl SweepParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.angle_resolution > 0.0) || !self.angle_resolution.is_finite() {
            return Err(ScanError::config(format!(
                "angle resolution must be positive, got {}",
                self.angle_resolution
            )));
        }
        if !(self.rotation_speed > 0.0) || !self.rotation_speed.is_finite() {
            return Err(ScanError::config(format!(
                "rotation speed must be positive, got {}",
                self.rotation_speed
            )));
        }
        if !self.start_angle.is_finite()
            || !self.end_angle.is_finite()
            || self.end_angle < self.start_angle
        {
            return Err(ScanError::config(format!(
                "sweep [{}, {}] is not a valid angle range",
                self.start_angle, self.end_angle
            )));
        }
        if !(self.max_distance > 0.0) {
            return Err(ScanError::config(format!(
                "max distance must be positive, got {}",
                self.max_distance
            )));
        }
        Ok(())
    }

    pub fn lines(&self) -> usize {
        ((self.end_angle - self.start_angle) / self.angle_resolution).floor() as usize
    }

    /// Rays in one sweep of `beams` beams. Ray ids are `u32`, so larger
    /// sweeps are a configuration error.
    pub fn ray_count(&self, beams: usize) -> Result<usize> {
        self.lines()
            .checked_mul(beams)
            .filter(|&n| u32::try_from(n).is_ok())
            .ok_or_else(|| {
                ScanError::config(format!(
                    "{} lines of {} beams at resolution {} is too many rays",
                    self.lines(),
                    beams,
                    self.angle_resolution
                ))
            })
    }

    /// Seconds the sensor needs to advance one `angle_resolution` step.
    pub fn time_per_step(&self) -> f64 {
        (1.0 / self.rotation_speed) / (360.0 / self.angle_resolution)
    }

    pub fn step(&self, line: usize) -> SweepStep {
        let rot = self.start_angle + line as f64 * self.angle_resolution + 180.0;
        let timestamp = ((rot - 180.0) / self.angle_resolution) * self.time_per_step();
        let rotation = rot.rem_euclid(360.0).to_radians();
        SweepStep {
            rotation,
            timestamp,
            yaw: (rotation + PI).rem_euclid(TAU),
        }
    }

    /// The part of the sweep covered during one frame of a range scan.
    pub fn for_frame(&self, elapsed: f64, duration: f64) -> Self {
        let degrees_per_second = 360.0 * self.rotation_speed;
        let span = (self.end_angle - self.start_angle).min(degrees_per_second * duration);
        let start_angle = self.start_angle + degrees_per_second * elapsed;
        Self {
            start_angle,
            end_angle: start_angle + span,
            ..*self
        }
    }
}

/// Direction of a rotating beam: the reference vector `(0, 0, length)` turned
/// by `-pitch` about the lateral axis, then by `rotation` about the vertical
/// axis. Rotation `π` with zero pitch points forward (`-Z`).
pub fn rotating_ray(length: f64, pitch: f64, rotation: f64) -> Vector3<f64> {
    let reference = Vector3::new(0.0, 0.0, length);
    let tilt = Rotation3::from_axis_angle(&Vector3::x_axis(), -pitch);
    let turn = Rotation3::from_axis_angle(&Vector3::y_axis(), rotation);
    turn * (tilt * reference)
}
