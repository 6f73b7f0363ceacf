// blensor_sim/src/simulation/runner.rs

//! Runs a resolved scenario end to end: builds the scene, configures the
//! scanner, scans one frame or an animation range and flushes the records.

use crate::error::SimError;
use crate::simulation::config::structs::ScenarioConfig;
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::mesh::PlyWriter;
use crate::simulation::world::Scene;
use blensor_core::evd::read_evd;
use blensor_core::prelude::{
    CancelToken, OutputFormat, RangeScan, ScanContext, Scanner,
};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Command-line overrides of a scenario.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub output: Option<PathBuf>,
    pub seed: Option<u64>,
    /// Checked once per frame of a range scan.
    pub cancel: CancelToken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub sensor: &'static str,
    pub output: PathBuf,
    pub frames: u32,
    pub records: usize,
    /// Whether an end-of-capture marker closed the EVD stream.
    pub sentinel_written: bool,
    pub cancelled: bool,
}

/// EVD streams are appended to, so a previous run's file is removed first.
fn remove_stale_output(path: &Path) -> Result<(), SimError> {
    if OutputFormat::from_path(path) == OutputFormat::Evd && path.exists() {
        fs::remove_file(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "removed previous EVD output");
    }
    Ok(())
}

pub fn run_scenario(config: &ScenarioConfig, options: &RunOptions) -> Result<RunSummary, SimError> {
    let output = options
        .output
        .clone()
        .unwrap_or_else(|| config.output.path.clone());
    let device = &config.sensor.device;
    let mut rng = SimulationRng::new(options.seed.or(config.simulation.seed));
    remove_stale_output(&output)?;

    // --- 1. Scanner and bias tables ---
    let mut scanner = Scanner::new().with_labels(config.output.labels);
    if let Some(bias) = &config.sensor.bias {
        let family = device.bias_family().ok_or_else(|| {
            SimError::invalid(format!(
                "sensor '{}' ({}) has no per-beam bias table to randomize",
                config.sensor.name,
                device.name()
            ))
        })?;
        scanner.randomize_bias(family, bias.mu, bias.sigma, &bias.distribution, &mut rng.0)?;
    }

    // --- 2. Scene and scan context ---
    let mut scene = Scene::from_config(config)?;
    let ctx = ScanContext {
        output: scene.sensor.output_frame(config.scan.world_output),
        inversion: config.scan.invert,
        time_offset: 0.0,
    };
    info!(
        sensor = %config.sensor.name,
        kind = device.name(),
        output = %output.display(),
        "starting scan"
    );

    // --- 3. Scan ---
    let summary = match &config.scan.range {
        Some(range) => {
            if config.output.mesh.is_some() {
                warn!("point meshes are only written for single-frame scans");
            }
            let report = RangeScan::new(range.first_frame, range.last_frame, range.fps)
                .with_sentinel(range.sentinel.into())
                .run(
                    &scanner,
                    device,
                    &ctx,
                    &mut scene,
                    &output,
                    &mut rng.0,
                    &options.cancel,
                );
            let summary = RunSummary {
                sensor: device.name(),
                output,
                frames: report.frames_completed,
                records: report.records_written,
                sentinel_written: report.sentinel_written,
                cancelled: report.cancelled,
            };
            if let Some(e) = report.error {
                return Err(e.into());
            }
            summary
        }
        None => {
            let scan = scanner.scan(device, &ctx, &scene, &mut rng.0)?;
            scan.finalize(&output)?;
            let evd = !OutputFormat::from_path(&output).is_per_frame();
            if let Some(mesh_path) = &config.output.mesh {
                let mut writer = PlyWriter::new(mesh_path);
                scan.deliver_to(&mut writer, &config.sensor.name, config.output.noisy_mesh)?;
            }
            RunSummary {
                sensor: device.name(),
                output,
                frames: 1,
                records: scan.store.len(),
                sentinel_written: evd,
                cancelled: false,
            }
        }
    };
    info!(
        frames = summary.frames,
        records = summary.records,
        "scenario finished"
    );
    Ok(summary)
}

// =========================================================================
// == Inspection ==
// =========================================================================

/// What an EVD file holds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvdSummary {
    pub frames: usize,
    pub records: usize,
    /// Records with a finite noisy distance.
    pub hits: usize,
    pub terminated: bool,
    /// Smallest and largest finite clean distance.
    pub distance_range: Option<(f64, f64)>,
    /// Hit count per object id.
    pub objects: BTreeMap<u64, usize>,
}

pub fn summarize_evd(path: &Path) -> Result<EvdSummary, SimError> {
    let stream = read_evd(path)?;
    let mut summary = EvdSummary {
        frames: stream.frames.len(),
        records: stream.record_count(),
        terminated: stream.terminated,
        ..EvdSummary::default()
    };
    for record in stream.frames.iter().flatten() {
        if !record.distance_noise.is_finite() {
            continue;
        }
        summary.hits += 1;
        *summary.objects.entry(record.object_id).or_default() += 1;
        if record.distance.is_finite() {
            let d = record.distance;
            summary.distance_range = Some(match summary.distance_range {
                Some((lo, hi)) => (lo.min(d), hi.max(d)),
                None => (d, d),
            });
        }
    }
    Ok(summary)
}

impl fmt::Display for EvdSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "frames:     {}", self.frames)?;
        writeln!(f, "records:    {}", self.records)?;
        writeln!(f, "hits:       {}", self.hits)?;
        writeln!(f, "terminated: {}", self.terminated)?;
        if let Some((lo, hi)) = self.distance_range {
            writeln!(f, "distance:   {lo:.3} .. {hi:.3}")?;
        }
        for (id, count) in &self.objects {
            writeln!(f, "object {id:>4}: {count} hits")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::{parse_scenario, PrefabCatalog};
    use approx::assert_abs_diff_eq;

    fn scenario(extra: &str, output: &Path) -> ScenarioConfig {
        let text = format!(
            r#"
            [simulation]
            seed = 11

            [sensor]
            name = "front"
            [sensor.device]
            kind = "Generic"
            angle_resolution = 1.0
            start_angle = -10.0
            end_angle = 10.0
            max_distance = 50.0
            beam_angles = "0"
            noise = {{ mu = 0.0, sigma = 0.0 }}

            [output]
            path = "{}"

            [[objects]]
            name = "wall"
            id = 9
            color = [0.0, 1.0, 0.0]
            shape = {{ type = "Box", size = [40.0, 10.0, 1.0] }}
            pose = {{ translation = [0.0, 0.0, -10.5] }}
            {extra}
            "#,
            output.display()
        );
        parse_scenario(&text, &PrefabCatalog::default()).unwrap()
    }

    #[test]
    fn single_scan_writes_a_terminated_evd_stream() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("scan.evd");
        let config = scenario("", &out);
        let summary = run_scenario(&config, &RunOptions::default()).unwrap();
        assert_eq!(summary.frames, 1);
        assert!(summary.sentinel_written);

        let evd = summarize_evd(&out).unwrap();
        assert!(evd.terminated);
        assert_eq!(evd.frames, 1);
        assert_eq!(evd.records, summary.records);
        assert!(evd.hits > 0);
        assert_eq!(evd.objects.keys().copied().collect::<Vec<_>>(), vec![9]);
        let (lo, _) = evd.distance_range.unwrap();
        assert_abs_diff_eq!(lo, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn reruns_replace_the_previous_stream() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("scan.evd");
        let config = scenario("", &out);
        run_scenario(&config, &RunOptions::default()).unwrap();
        let first = fs::read(&out).unwrap();
        run_scenario(&config, &RunOptions::default()).unwrap();
        assert_eq!(fs::read(&out).unwrap(), first);
    }

    #[test]
    fn range_scan_moves_the_scene() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("anim.evd");
        let mut config = scenario("velocity = [0.0, 0.0, -1.0]", &out);
        config.scan.range = Some(crate::simulation::config::structs::RangeConfig {
            first_frame: 1,
            last_frame: 3,
            fps: 1.0,
            sentinel: Default::default(),
        });
        let summary = run_scenario(&config, &RunOptions::default()).unwrap();
        assert_eq!(summary.frames, 3);
        assert!(summary.sentinel_written);

        let stream = read_evd(&out).unwrap();
        assert!(stream.terminated);
        let nearest: Vec<f64> = stream
            .frames
            .iter()
            .filter(|f| !f.is_empty())
            .map(|f| f.iter().map(|r| r.distance).fold(f64::INFINITY, f64::min))
            .collect();
        assert_eq!(nearest.len(), 3);
        assert_abs_diff_eq!(nearest[0], 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(nearest[2], 12.0, epsilon = 1e-6);
    }

    #[test]
    fn cancelled_range_scan_leaves_the_stream_open() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("anim.evd");
        let mut config = scenario("", &out);
        config.scan.range = Some(crate::simulation::config::structs::RangeConfig {
            first_frame: 0,
            last_frame: 4,
            fps: 10.0,
            sentinel: Default::default(),
        });
        let options = RunOptions::default();
        options.cancel.cancel();
        let summary = run_scenario(&config, &options).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.frames, 0);
        assert!(!summary.sentinel_written);
    }

    #[test]
    fn mesh_and_seed_overrides_are_honored() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = dir.path().join("front.ply");
        let mut config = scenario("", &dir.path().join("ignored.evd"));
        config.output.mesh = Some(mesh.clone());
        let options = RunOptions {
            output: Some(dir.path().join("scan.numpy")),
            seed: Some(5),
            ..RunOptions::default()
        };
        let summary = run_scenario(&config, &options).unwrap();
        assert!(!summary.sentinel_written);
        assert!(dir.path().join("scan.numpy").exists());
        assert!(!dir.path().join("ignored.evd").exists());
        let ply = fs::read_to_string(&mesh).unwrap();
        assert!(ply.starts_with("ply\n"));
    }

    #[test]
    fn bias_on_a_camera_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = scenario("", &dir.path().join("scan.evd"));
        config.sensor.device = blensor_core::prelude::SensorKind::Tof(Default::default());
        config.sensor.bias = Some(crate::simulation::config::structs::BiasConfig {
            mu: 0.0,
            sigma: 0.1,
            distribution: "gaussian".to_string(),
        });
        assert!(matches!(
            run_scenario(&config, &RunOptions::default()),
            Err(SimError::Invalid(_))
        ));
    }
}
