// blensor_core/src/models/noise/gaussian.rs

use crate::error::{Result, ScanError};
use rand::RngCore;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

/// Standard deviations below this are treated as "no noise": the mean is
/// returned without drawing.
pub const MIN_SIGMA: f64 = 1e-7;

/// Draws one sample from Normal(mu, sigma), or returns `mu` for a degenerate sigma.
pub(crate) fn draw_normal(mu: f64, sigma: f64, rng: &mut dyn RngCore) -> f64 {
    if !(sigma >= MIN_SIGMA) {
        return mu;
    }
    match Normal::new(mu, sigma) {
        Ok(dist) => dist.sample(rng),
        Err(_) => mu,
    }
}

/// Distance-independent Gaussian range noise.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct GaussianNoise {
    pub mu: f64,
    pub sigma: f64,
}

impl GaussianNoise {
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        if !mu.is_finite() || !sigma.is_finite() || sigma < 0.0 {
            return Err(ScanError::config(format!(
                "gaussian noise needs finite mu and non-negative sigma, got mu={mu} sigma={sigma}"
            )));
        }
        Ok(Self { mu, sigma })
    }

    pub fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        draw_normal(self.mu, self.sigma, rng)
    }
}
