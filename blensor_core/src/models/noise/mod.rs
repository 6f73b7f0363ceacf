// blensor_core/src/models/noise/mod.rs

pub mod bias;
pub mod gaussian;
pub mod table;

pub use bias::{BiasTable, NoiseDistribution};
pub use gaussian::GaussianNoise;
pub use table::DistanceTable;

use crate::error::Result;
use rand::RngCore;

/// A range error model: given the true distance of a return, produce the
/// offset to add to it.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorModel {
    Gaussian(GaussianNoise),
    Table(DistanceTable),
}

impl ErrorModel {
    /// Picks the model for one beam: a distance table when a calibration string
    /// is given, the plain Gaussian otherwise.
    pub fn from_calibration(calibration: Option<&str>, fallback: GaussianNoise) -> Result<Self> {
        match calibration.map(str::trim) {
            Some(text) if !text.is_empty() => Ok(ErrorModel::Table(DistanceTable::parse(text)?)),
            _ => Ok(ErrorModel::Gaussian(fallback)),
        }
    }

    /// `(mu, sigma)` in effect at `distance`.
    pub fn params(&self, distance: f64) -> (f64, f64) {
        match self {
            ErrorModel::Gaussian(g) => (g.mu, g.sigma),
            ErrorModel::Table(t) => t.params(distance),
        }
    }

    pub fn sample(&self, distance: f64, rng: &mut dyn RngCore) -> f64 {
        match self {
            ErrorModel::Gaussian(g) => g.sample(rng),
            ErrorModel::Table(t) => t.sample(distance, rng),
        }
    }
}

impl From<GaussianNoise> for ErrorModel {
    fn from(g: GaussianNoise) -> Self {
        ErrorModel::Gaussian(g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_calibration_falls_back_to_gaussian() {
        let g = GaussianNoise::new(0.1, 0.2).unwrap();
        assert_eq!(
            ErrorModel::from_calibration(None, g).unwrap(),
            ErrorModel::Gaussian(g)
        );
        assert_eq!(
            ErrorModel::from_calibration(Some("   "), g).unwrap(),
            ErrorModel::Gaussian(g)
        );
    }

    #[test]
    fn calibration_string_selects_the_table() {
        let g = GaussianNoise::default();
        let model = ErrorModel::from_calibration(Some("0,0,0.01;100,0.5,0.1"), g).unwrap();
        assert!(matches!(model, ErrorModel::Table(_)));
        assert_eq!(model.params(200.0), (0.5, 0.1));
    }

    #[test]
    fn broken_calibration_is_a_configuration_error() {
        let g = GaussianNoise::default();
        assert!(ErrorModel::from_calibration(Some("1;2;3"), g).is_err());
    }
}
