// blensor_core/src/models/perception/generic.rs

//! Generic rotating LIDAR with caller-supplied vertical beam angles and
//! optional per-beam calibration tables.

use super::sweep::{rotating_ray, SweepParams};
use super::{BeamSample, RayBatch, RaycastingSensorModel};
use crate::error::{Result, ScanError};
use crate::evd::ImageShape;
use crate::models::noise::{BiasTable, ErrorModel, GaussianNoise};
use rand::RngCore;
use serde::Deserialize;
use tracing::warn;

/// How a malformed beam-angle list is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeamParsing {
    /// Reject the list with a configuration error.
    #[default]
    Strict,
    /// Fall back to an empty beam set: the scan runs and records nothing.
    Legacy,
}

/// Parses a comma-separated list of vertical angles in degrees.
pub fn parse_beam_angles(list: &str, mode: BeamParsing) -> Result<Vec<f64>> {
    let parsed: std::result::Result<Vec<f64>, String> = list
        .split(',')
        .map(str::trim)
        .map(|field| match field.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(field.to_string()),
        })
        .collect();
    match (parsed, mode) {
        (Ok(angles), _) => Ok(angles),
        (Err(field), BeamParsing::Strict) => Err(ScanError::config(format!(
            "beam angle list '{list}' has an unparsable entry '{field}'"
        ))),
        (Err(field), BeamParsing::Legacy) => {
            warn!(list, field, "unparsable beam angle list, scanning with no beams");
            Ok(Vec::new())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenericLidarParams {
    pub angle_resolution: f64,
    pub rotation_speed: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub max_distance: f64,
    /// Comma-separated vertical angles, degrees.
    pub beam_angles: String,
    pub beam_parsing: BeamParsing,
    pub noise: GaussianNoise,
    /// Distance tables (`distance,mu,sigma;...`): none, one shared by all beams,
    /// or one per beam.
    pub calibration: Vec<String>,
}

impl Default for GenericLidarParams {
    fn default() -> Self {
        Self {
            angle_resolution: 0.25,
            rotation_speed: 10.0,
            start_angle: -90.0,
            end_angle: 90.0,
            max_distance: 30.0,
            beam_angles: "0".to_string(),
            beam_parsing: BeamParsing::Strict,
            noise: GaussianNoise {
                mu: 0.0,
                sigma: 0.01,
            },
            calibration: Vec::new(),
        }
    }
}

impl GenericLidarParams {
    pub fn sweep(&self) -> SweepParams {
        SweepParams {
            angle_resolution: self.angle_resolution,
            rotation_speed: self.rotation_speed,
            start_angle: self.start_angle,
            end_angle: self.end_angle,
            max_distance: self.max_distance,
        }
    }

    /// Number of beams the angle list describes, zero when it does not parse.
    pub fn beam_count(&self) -> usize {
        parse_beam_angles(&self.beam_angles, BeamParsing::Legacy)
            .map(|a| a.len())
            .unwrap_or(0)
    }

    /// Parses the beam list and builds one error model per beam.
    pub fn prepare(&self) -> Result<GenericLidar> {
        self.sweep().validate()?;
        let noise = GaussianNoise::new(self.noise.mu, self.noise.sigma)?;
        let beams = parse_beam_angles(&self.beam_angles, self.beam_parsing)?;
        let error_models = match self.calibration.as_slice() {
            [] => vec![ErrorModel::Gaussian(noise); beams.len()],
            [shared] => {
                let model = ErrorModel::from_calibration(Some(shared.as_str()), noise)?;
                vec![model; beams.len()]
            }
            per_beam if per_beam.len() == beams.len() => per_beam
                .iter()
                .map(|c| ErrorModel::from_calibration(Some(c.as_str()), noise))
                .collect::<Result<Vec<_>>>()?,
            per_beam => {
                return Err(ScanError::config(format!(
                    "{} calibration tables given for {} beams",
                    per_beam.len(),
                    beams.len()
                )))
            }
        };
        Ok(GenericLidar {
            sweep: self.sweep(),
            beams,
            error_models,
        })
    }
}

/// A generic LIDAR ready to scan: beams parsed, error models built.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericLidar {
    sweep: SweepParams,
    beams: Vec<f64>,
    error_models: Vec<ErrorModel>,
}

impl GenericLidar {
    pub fn beams(&self) -> &[f64] {
        &self.beams
    }

    pub fn error_model(&self, beam: usize) -> Option<&ErrorModel> {
        self.error_models.get(beam)
    }
}

impl RaycastingSensorModel for GenericLidar {
    fn generate_rays(&self) -> Result<RayBatch> {
        let lines = self.sweep.lines();
        let mut batch = RayBatch::with_capacity(self.sweep.ray_count(self.beams.len())?);
        for line in 0..lines {
            let step = self.sweep.step(line);
            for (beam, angle) in self.beams.iter().enumerate() {
                let pitch = angle.to_radians();
                batch.push(
                    rotating_ray(self.sweep.max_distance, pitch, step.rotation),
                    BeamSample {
                        beam,
                        yaw: step.yaw,
                        pitch,
                        timestamp: step.timestamp,
                        point_index: beam * lines + line,
                    },
                );
            }
        }
        Ok(batch)
    }

    fn noisy_distance(
        &self,
        sample: &BeamSample,
        distance: f64,
        bias: &BiasTable,
        rng: &mut dyn RngCore,
    ) -> f64 {
        let offset = self
            .error_models
            .get(sample.beam)
            .map(|m| m.sample(distance, rng))
            .unwrap_or(0.0);
        distance + bias.get(sample.beam) + offset
    }

    fn get_max_range(&self) -> f64 {
        self.sweep.max_distance
    }

    fn image_shape(&self) -> Option<ImageShape> {
        if self.beams.is_empty() {
            return None;
        }
        Some(ImageShape::new(
            self.sweep.lines(),
            self.beams.len(),
            self.sweep.max_distance,
        ))
    }

    fn for_frame(&self, elapsed: f64, duration: f64) -> Box<dyn RaycastingSensorModel> {
        Box::new(Self {
            sweep: self.sweep.for_frame(elapsed, duration),
            ..self.clone()
        })
    }

    fn uses_time_offset(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::perception::test_support::WallCaster;
    use crate::models::perception::{run_raycasting_scan, ScanContext};
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn single_beam() -> GenericLidarParams {
        GenericLidarParams {
            angle_resolution: 1.0,
            start_angle: 0.0,
            end_angle: 1.0,
            max_distance: 100.0,
            noise: GaussianNoise::default(),
            ..Default::default()
        }
    }

    #[test]
    fn beam_lists_parse_with_whitespace() {
        assert_eq!(
            parse_beam_angles(" -1.5, 0 ,2", BeamParsing::Strict).unwrap(),
            vec![-1.5, 0.0, 2.0]
        );
    }

    #[test]
    fn malformed_beam_list_strict_vs_legacy() {
        assert!(matches!(
            parse_beam_angles("1,,x", BeamParsing::Strict),
            Err(ScanError::Configuration(_))
        ));
        assert!(parse_beam_angles("1,,x", BeamParsing::Legacy)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn legacy_mode_scans_nothing() {
        let params = GenericLidarParams {
            beam_angles: "oops".into(),
            beam_parsing: BeamParsing::Legacy,
            ..single_beam()
        };
        let lidar = params.prepare().unwrap();
        assert!(lidar.generate_rays().unwrap().is_empty());
        assert!(lidar.image_shape().is_none());
    }

    #[test]
    fn absurd_resolution_is_a_configuration_error() {
        let lidar = GenericLidarParams {
            angle_resolution: 1e-300,
            beam_angles: "-1,0,1".into(),
            ..single_beam()
        }
        .prepare()
        .unwrap();
        assert!(matches!(lidar.generate_rays(), Err(ScanError::Configuration(_))));
    }

    #[test]
    fn plane_ten_units_away_gives_one_exact_record() {
        let lidar = single_beam().prepare().unwrap();
        let wall = WallCaster {
            distance: 10.0,
            object_id: 1,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let store = run_raycasting_scan(
            &lidar,
            &BiasTable::zeros(1),
            &wall,
            &ScanContext::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(store.len(), 1);
        let r = store.records()[0];
        assert_abs_diff_eq!(r.distance, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(r.distance_noise, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(r.position_noise, r.position, epsilon = 1e-9);
        assert_eq!(r.object_id, 1);
    }

    #[test]
    fn calibration_strings_pick_per_beam_models() {
        let shared = GenericLidarParams {
            beam_angles: "-1,1".into(),
            calibration: vec!["0,0.5,0".into()],
            ..single_beam()
        };
        let lidar = shared.prepare().unwrap();
        assert_eq!(lidar.error_model(1).unwrap().params(3.0), (0.5, 0.0));

        let per_beam = GenericLidarParams {
            calibration: vec!["0,0.5,0".into(), "0,0.25,0".into()],
            ..shared.clone()
        };
        let lidar = per_beam.prepare().unwrap();
        assert_eq!(lidar.error_model(1).unwrap().params(3.0), (0.25, 0.0));

        let mismatched = GenericLidarParams {
            beam_angles: "-1,0,1".into(),
            ..per_beam
        };
        assert!(matches!(
            mismatched.prepare(),
            Err(ScanError::Configuration(_))
        ));
    }

    #[test]
    fn table_offset_is_applied_along_the_beam() {
        let params = GenericLidarParams {
            calibration: vec!["0,0.5,0;50,1.5,0".into()],
            ..single_beam()
        };
        let lidar = params.prepare().unwrap();
        let wall = WallCaster {
            distance: 10.0,
            object_id: 1,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let store = run_raycasting_scan(
            &lidar,
            &BiasTable::zeros(1),
            &wall,
            &ScanContext::default(),
            &mut rng,
        )
        .unwrap();
        let r = store.records()[0];
        assert_abs_diff_eq!(r.distance_noise, 10.7, epsilon = 1e-9);
        assert_abs_diff_eq!(r.position_noise.z, -10.7, epsilon = 1e-9);
    }
}
