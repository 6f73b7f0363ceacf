// blensor_core/src/scanner.rs

//! The single scan entry point: a closed set of sensor kinds dispatched to
//! their engines, with the per-beam bias tables every scan reads.

use crate::error::{Result, ScanError};
use crate::evd::{frame_path, EvdStore, OutputFormat};
use crate::messages::DepthMap;
use crate::models::noise::{BiasTable, NoiseDistribution};
use crate::models::perception::depthmap::{self, DepthMapParams};
use crate::models::perception::generic::GenericLidarParams;
use crate::models::perception::ibeo::IbeoParams;
use crate::models::perception::kinect::{self, KinectParams};
use crate::models::perception::tof::TofParams;
use crate::models::perception::velodyne::{VelodyneModel, VelodyneParams};
use crate::models::perception::{run_raycasting_scan, RayCaster, RaycastingSensorModel, ScanContext};
use crate::types::MeshBuilder;
use rand::RngCore;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Every sensor the core can simulate, each with its parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "PascalCase")]
pub enum SensorKind {
    Velodyne(VelodyneParams),
    Ibeo(IbeoParams),
    Generic(GenericLidarParams),
    DepthMap(DepthMapParams),
    Tof(TofParams),
    Kinect(KinectParams),
}

impl SensorKind {
    pub fn name(&self) -> &'static str {
        match self {
            SensorKind::Velodyne(_) => "velodyne",
            SensorKind::Ibeo(_) => "ibeo",
            SensorKind::Generic(_) => "generic",
            SensorKind::DepthMap(_) => "depthmap",
            SensorKind::Tof(_) => "tof",
            SensorKind::Kinect(_) => "kinect",
        }
    }

    /// The bias table the sensor reads, if it has per-beam biases.
    pub fn bias_family(&self) -> Option<BiasFamily> {
        match self {
            SensorKind::Velodyne(p) => Some(match p.model {
                VelodyneModel::Hdl64e => BiasFamily::Hdl64e,
                VelodyneModel::Hdl32e => BiasFamily::Hdl32e,
                VelodyneModel::Vlp16 => BiasFamily::Vlp16,
            }),
            SensorKind::Ibeo(_) => Some(BiasFamily::Ibeo),
            SensorKind::Generic(p) => Some(BiasFamily::Generic(p.beam_count())),
            SensorKind::DepthMap(_) | SensorKind::Tof(_) | SensorKind::Kinect(_) => None,
        }
    }

    /// Validates the parameters and resolves the engine that will run them.
    pub fn prepare(&self) -> Result<PreparedSensor> {
        let model: Box<dyn RaycastingSensorModel> = match self {
            SensorKind::Velodyne(p) => {
                p.validate()?;
                Box::new(p.clone())
            }
            SensorKind::Ibeo(p) => {
                p.validate()?;
                Box::new(p.clone())
            }
            SensorKind::Generic(p) => Box::new(p.prepare()?),
            SensorKind::Tof(p) => {
                p.validate()?;
                Box::new(p.clone())
            }
            SensorKind::DepthMap(p) => {
                p.validate()?;
                return Ok(PreparedSensor::DepthMap(p.clone()));
            }
            SensorKind::Kinect(p) => {
                p.validate()?;
                return Ok(PreparedSensor::Kinect(p.clone()));
            }
        };
        Ok(PreparedSensor::Raycasting {
            model,
            bias: self.bias_family(),
        })
    }
}

/// A sensor whose parameters have been checked and parsed.
#[derive(Debug, Clone)]
pub enum PreparedSensor {
    /// One batch of rays from the origin, perturbed per beam.
    Raycasting {
        model: Box<dyn RaycastingSensorModel>,
        bias: Option<BiasFamily>,
    },
    DepthMap(DepthMapParams),
    Kinect(KinectParams),
}

impl PreparedSensor {
    /// The sensor as configured for one frame of a range scan.
    pub fn for_frame(&self, elapsed: f64, duration: f64) -> Self {
        match self {
            PreparedSensor::Raycasting { model, bias } => PreparedSensor::Raycasting {
                model: model.for_frame(elapsed, duration),
                bias: *bias,
            },
            other => other.clone(),
        }
    }
}

/// Which long-lived bias table a sensor reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasFamily {
    Hdl64e,
    Hdl32e,
    Vlp16,
    Ibeo,
    /// The generic LIDAR's table, sized to its beam count.
    Generic(usize),
}

/// The per-beam bias tables of every sensor family.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasTables {
    hdl64e: BiasTable,
    hdl32e: BiasTable,
    vlp16: BiasTable,
    ibeo: BiasTable,
    generic: BiasTable,
}

impl Default for BiasTables {
    /// The checked-in tables; the generic LIDAR starts without bias.
    fn default() -> Self {
        Self {
            hdl64e: BiasTable::hdl64e(),
            hdl32e: BiasTable::hdl32e(),
            vlp16: BiasTable::vlp16(),
            ibeo: BiasTable::ibeo(),
            generic: BiasTable::default(),
        }
    }
}

impl BiasTables {
    pub fn get(&self, family: BiasFamily) -> &BiasTable {
        match family {
            BiasFamily::Hdl64e => &self.hdl64e,
            BiasFamily::Hdl32e => &self.hdl32e,
            BiasFamily::Vlp16 => &self.vlp16,
            BiasFamily::Ibeo => &self.ibeo,
            BiasFamily::Generic(_) => &self.generic,
        }
    }

    fn get_mut(&mut self, family: BiasFamily) -> &mut BiasTable {
        match family {
            BiasFamily::Hdl64e => &mut self.hdl64e,
            BiasFamily::Hdl32e => &mut self.hdl32e,
            BiasFamily::Vlp16 => &mut self.vlp16,
            BiasFamily::Ibeo => &mut self.ibeo,
            BiasFamily::Generic(beams) => {
                if self.generic.len() != beams {
                    self.generic = BiasTable::zeros(beams);
                }
                &mut self.generic
            }
        }
    }
}

/// The result of one scan: the record buffer plus, for depth cameras, the
/// depth map.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutput {
    pub store: EvdStore,
    pub depth_map: Option<DepthMap>,
}

impl ScanOutput {
    /// Where the depth map of a scan flushed to `path` goes.
    pub fn depth_map_path(path: &Path, frame: Option<u32>) -> PathBuf {
        let base = match frame {
            Some(frame) => frame_path(path, frame),
            None => path.to_path_buf(),
        };
        base.with_extension("depth")
    }

    /// Flushes the records (format by extension) and the depth map, if any.
    pub fn write(&self, path: &Path, frame: Option<u32>) -> Result<()> {
        self.store.write(path, frame)?;
        if let Some(map) = &self.depth_map {
            let target = Self::depth_map_path(path, frame);
            map.write(&target)?;
            debug!(path = %target.display(), "wrote depth map");
        }
        Ok(())
    }

    /// Flushes a single-shot scan. EVD output gets its block and the
    /// end-of-capture sentinel; other formats are written as by [`write`].
    ///
    /// [`write`]: ScanOutput::write
    pub fn finalize(&self, path: &Path) -> Result<()> {
        if OutputFormat::from_path(path).is_per_frame() {
            return self.write(path, None);
        }
        self.store.finalize(path)?;
        if let Some(map) = &self.depth_map {
            let target = Self::depth_map_path(path, None);
            map.write(&target)?;
            debug!(path = %target.display(), "wrote depth map");
        }
        Ok(())
    }

    pub fn deliver_to(&self, builder: &mut dyn MeshBuilder, name: &str, noisy: bool) -> Result<()> {
        self.store.deliver(builder, name, noisy)
    }
}

/// Runs scans and owns the bias tables they read.
///
/// Scans borrow the tables immutably; only [`Scanner::randomize_bias`] takes
/// `&mut self`. Share a scanner across threads behind an `RwLock`.
#[derive(Debug, Clone, PartialEq)]
pub struct Scanner {
    bias: BiasTables,
    labels: bool,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            bias: BiasTables::default(),
            labels: true,
        }
    }

    /// Whether `.pcd` output carries object-id labels.
    pub fn with_labels(mut self, labels: bool) -> Self {
        self.labels = labels;
        self
    }

    pub fn bias_tables(&self) -> &BiasTables {
        &self.bias
    }

    /// Redraws one family's bias table. `distribution` is a name such as
    /// `"gaussian"` or `"laplace"`; unknown names leave the table untouched.
    pub fn randomize_bias(
        &mut self,
        family: BiasFamily,
        mu: f64,
        sigma: f64,
        distribution: &str,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let distribution: NoiseDistribution = distribution.parse()?;
        if !mu.is_finite() || !(sigma >= 0.0) {
            return Err(ScanError::config(format!(
                "bias distribution needs finite mu and non-negative sigma, got mu={mu} sigma={sigma}"
            )));
        }
        self.bias
            .get_mut(family)
            .randomize_with(mu, sigma, distribution, rng);
        info!(?family, mu, sigma, ?distribution, "randomized bias table");
        Ok(())
    }

    /// Runs one scan of `sensor` against `caster`.
    pub fn scan(
        &self,
        sensor: &SensorKind,
        ctx: &ScanContext,
        caster: &dyn RayCaster,
        rng: &mut dyn RngCore,
    ) -> Result<ScanOutput> {
        let prepared = sensor.prepare()?;
        let output = self.scan_prepared(&prepared, ctx, caster, rng)?;
        debug!(
            sensor = sensor.name(),
            records = output.store.len(),
            "scan finished"
        );
        Ok(output)
    }

    /// Runs one scan of an already prepared sensor.
    pub fn scan_prepared(
        &self,
        sensor: &PreparedSensor,
        ctx: &ScanContext,
        caster: &dyn RayCaster,
        rng: &mut dyn RngCore,
    ) -> Result<ScanOutput> {
        let (mut store, depth_map) = match sensor {
            PreparedSensor::Raycasting { model, bias } => {
                let empty = BiasTable::default();
                let table = bias.map(|f| self.bias.get(f)).unwrap_or(&empty);
                (run_raycasting_scan(model.as_ref(), table, caster, ctx, rng)?, None)
            }
            PreparedSensor::DepthMap(params) => {
                let (store, map) = depthmap::scan(params, caster, ctx)?;
                (store, Some(map))
            }
            PreparedSensor::Kinect(params) => (kinect::scan(params, caster, ctx, rng)?, None),
        };
        store.set_labels(self.labels);
        Ok(ScanOutput { store, depth_map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evd::read_evd;
    use crate::models::noise::GaussianNoise;
    use crate::models::perception::test_support::{BrokenCaster, WallCaster};
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn wall(distance: f64) -> WallCaster {
        WallCaster {
            distance,
            object_id: 4,
        }
    }

    fn forward_beam() -> SensorKind {
        SensorKind::Generic(GenericLidarParams {
            angle_resolution: 1.0,
            start_angle: 0.0,
            end_angle: 1.0,
            beam_angles: "0".into(),
            noise: GaussianNoise::default(),
            ..Default::default()
        })
    }

    #[test]
    fn plane_ten_units_away_gives_one_exact_record() {
        let scanner = Scanner::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = scanner
            .scan(&forward_beam(), &ScanContext::default(), &wall(10.0), &mut rng)
            .unwrap();
        assert_eq!(out.store.len(), 1);
        let r = out.store.records()[0];
        assert_abs_diff_eq!(r.distance, 10.0, epsilon = 1e-9);
        assert_eq!(r.distance, r.distance_noise);
        assert_abs_diff_eq!(r.position, r.position_noise, epsilon = 1e-12);
        assert!(out.depth_map.is_none());
    }

    #[test]
    fn velodyne_reads_its_seeded_bias() {
        let scanner = Scanner::new();
        let sensor = SensorKind::Velodyne(VelodyneParams {
            model: VelodyneModel::Vlp16,
            start_angle: 0.0,
            end_angle: 0.2,
            noise: GaussianNoise::default(),
            ..VelodyneParams::preset(VelodyneModel::Vlp16)
        });
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = scanner
            .scan(&sensor, &ScanContext::default(), &wall(5.0), &mut rng)
            .unwrap();
        let bias = BiasTable::vlp16();
        assert!(!out.store.is_empty());
        for r in out.store.records() {
            let beam = r.point_index;
            assert_abs_diff_eq!(r.distance_noise - r.distance, bias.get(beam), epsilon = 1e-9);
        }
    }

    #[test]
    fn randomized_generic_bias_is_sized_to_the_beams() {
        let mut scanner = Scanner::new();
        let sensor = SensorKind::Generic(GenericLidarParams {
            beam_angles: "-1, 0, 1".into(),
            ..Default::default()
        });
        let family = sensor.bias_family().unwrap();
        assert_eq!(family, BiasFamily::Generic(3));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        scanner
            .randomize_bias(family, 0.25, 0.0, "gaussian", &mut rng)
            .unwrap();
        assert_eq!(scanner.bias_tables().get(family).values(), &[0.25; 3]);
        // other families keep their checked-in values
        assert_eq!(scanner.bias_tables().get(BiasFamily::Ibeo), &BiasTable::ibeo());
    }

    #[test]
    fn unknown_bias_distribution_is_reported() {
        let mut scanner = Scanner::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let err = scanner
            .randomize_bias(BiasFamily::Hdl64e, 0.0, 0.1, "uniform", &mut rng)
            .unwrap_err();
        assert!(matches!(err, ScanError::UnsupportedDistribution(_)));
        assert_eq!(scanner.bias_tables(), &BiasTables::default());
    }

    #[test]
    fn provider_failure_aborts_the_scan() {
        let scanner = Scanner::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = scanner
            .scan(&forward_beam(), &ScanContext::default(), &BrokenCaster, &mut rng)
            .unwrap_err();
        assert!(matches!(err, ScanError::GeometryQuery(_)));
    }

    #[test]
    fn depth_camera_writes_a_sibling_depth_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam.evd");
        let scanner = Scanner::new();
        let sensor = SensorKind::DepthMap(DepthMapParams {
            width: 4,
            height: 3,
            focal_length: 2.0,
            max_distance: 10.0,
        });
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = scanner
            .scan(&sensor, &ScanContext::default(), &wall(3.0), &mut rng)
            .unwrap();
        out.write(&path, None).unwrap();
        let map = DepthMap::read(&dir.path().join("cam.depth")).unwrap();
        assert_eq!((map.width, map.height), (4, 3));
        assert_eq!(read_evd(&path).unwrap().record_count(), 12);
        assert_eq!(
            ScanOutput::depth_map_path(&path, Some(7)),
            dir.path().join("cam00007.depth")
        );
    }

    #[test]
    fn finalized_depth_scan_is_one_terminated_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.evd");
        let sensor = SensorKind::DepthMap(DepthMapParams {
            width: 4,
            height: 3,
            focal_length: 2.0,
            max_distance: 10.0,
        });
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = Scanner::new()
            .scan(&sensor, &ScanContext::default(), &wall(3.0), &mut rng)
            .unwrap();
        out.finalize(&path).unwrap();
        let stream = read_evd(&path).unwrap();
        assert!(stream.terminated);
        assert_eq!(stream.frames.len(), 1);
        assert_eq!(stream.record_count(), 12);
        assert!(dir.path().join("shot.depth").exists());
    }

    #[test]
    fn prepared_sensors_clone_per_frame() {
        let prepared = forward_beam().prepare().unwrap();
        let copy = prepared.clone();
        let shifted = copy.for_frame(0.5, 0.1);
        match (prepared, shifted) {
            (
                PreparedSensor::Raycasting { model: a, .. },
                PreparedSensor::Raycasting { model: b, .. },
            ) => {
                let (ra, rb) = (a.generate_rays().unwrap(), b.generate_rays().unwrap());
                assert_eq!(ra.len(), rb.len());
                assert_abs_diff_eq!(rb.samples[0].timestamp - ra.samples[0].timestamp, 0.5, epsilon = 1e-9);
            }
            _ => panic!("generic lidar should prepare as a ray-batch sensor"),
        }
    }

    #[test]
    fn invalid_parameters_fail_before_casting() {
        let sensor = SensorKind::Tof(TofParams {
            width: 0,
            ..Default::default()
        });
        let err = Scanner::new()
            .scan(
                &sensor,
                &ScanContext::default(),
                &BrokenCaster,
                &mut ChaCha8Rng::seed_from_u64(0),
            )
            .unwrap_err();
        assert!(matches!(err, ScanError::Configuration(_)));
    }
}
