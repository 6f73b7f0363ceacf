// blensor_core/src/models/noise/table.rs

//! The "advanced" error model: range noise whose mean and spread depend on the
//! measured distance, interpolated from a calibration table.

use super::gaussian::draw_normal;
use crate::error::{Result, ScanError};
use rand::RngCore;
use std::str::FromStr;

/// Bracketing distances closer than this are treated as coincident.
const DISTANCE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableEntry {
    pub distance: f64,
    pub mu: f64,
    pub sigma: f64,
}

/// Piecewise-linear distance → (mu, sigma) lookup, sorted ascending by distance.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceTable {
    entries: Vec<TableEntry>,
}

impl DistanceTable {
    pub fn from_entries(triples: impl IntoIterator<Item = (f64, f64, f64)>) -> Result<Self> {
        let mut entries = Vec::new();
        for (distance, mu, sigma) in triples {
            if !distance.is_finite() || !mu.is_finite() || !sigma.is_finite() {
                return Err(ScanError::config(format!(
                    "error table entry ({distance}, {mu}, {sigma}) is not finite"
                )));
            }
            if distance < 0.0 || sigma < 0.0 {
                return Err(ScanError::config(format!(
                    "error table entry ({distance}, {mu}, {sigma}) has a negative distance or sigma"
                )));
            }
            entries.push(TableEntry {
                distance,
                mu,
                sigma,
            });
        }
        if entries.is_empty() {
            return Err(ScanError::config("error table has no entries"));
        }
        entries.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(Self { entries })
    }

    /// Parses `distance,mu,sigma` entries separated by `;` or newlines.
    pub fn parse(calibration: &str) -> Result<Self> {
        let mut triples = Vec::new();
        for raw in calibration.split([';', '\n']) {
            let entry = raw.trim();
            if entry.is_empty() {
                continue;
            }
            let fields: Vec<&str> = entry.split(',').map(str::trim).collect();
            if fields.len() != 3 {
                return Err(ScanError::config(format!(
                    "error table entry '{entry}' must have the form distance,mu,sigma"
                )));
            }
            let mut values = [0.0; 3];
            for (slot, field) in values.iter_mut().zip(&fields) {
                *slot = field.parse::<f64>().map_err(|e| {
                    ScanError::config(format!("error table entry '{entry}': {e}"))
                })?;
            }
            triples.push((values[0], values[1], values[2]));
        }
        Self::from_entries(triples)
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    /// Interpolated `(mu, sigma)` at `distance`. Outside the table the nearest
    /// end entry is used unchanged.
    pub fn params(&self, distance: f64) -> (f64, f64) {
        let below = self.entries.partition_point(|e| e.distance <= distance);
        if below == 0 {
            let first = self.entries[0];
            return (first.mu, first.sigma);
        }
        let lower = self.entries[below - 1];
        let Some(upper) = self.entries.get(below) else {
            return (lower.mu, lower.sigma);
        };

        let span = upper.distance - lower.distance;
        if span.abs() < DISTANCE_EPSILON {
            return (lower.mu, lower.sigma);
        }
        let t = (distance - lower.distance) / span;
        (
            lower.mu + t * (upper.mu - lower.mu),
            lower.sigma + t * (upper.sigma - lower.sigma),
        )
    }

    pub fn sample(&self, distance: f64, rng: &mut dyn RngCore) -> f64 {
        let (mu, sigma) = self.params(distance);
        draw_normal(mu, sigma, rng)
    }
}

impl FromStr for DistanceTable {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn table() -> DistanceTable {
        DistanceTable::from_entries([(10.0, 0.02, 0.04), (1.0, 0.0, 0.01), (5.0, 0.01, 0.02)])
            .unwrap()
    }

    #[test]
    fn entries_are_sorted_by_distance() {
        let d: Vec<f64> = table().entries().iter().map(|e| e.distance).collect();
        assert_eq!(d, vec![1.0, 5.0, 10.0]);
    }

    #[test]
    fn interpolation_is_a_convex_combination() {
        let t = table();
        for i in 1..40 {
            let d = 1.0 + 4.0 * i as f64 / 40.0;
            let (mu, sigma) = t.params(d);
            assert!(mu >= 0.0 && mu <= 0.01, "mu {mu} at {d}");
            assert!(sigma >= 0.01 && sigma <= 0.02, "sigma {sigma} at {d}");
        }
        let (mu, sigma) = t.params(7.5);
        assert_abs_diff_eq!(mu, 0.015, epsilon = 1e-12);
        assert_abs_diff_eq!(sigma, 0.03, epsilon = 1e-12);
    }

    #[test]
    fn no_extrapolation_past_last_entry() {
        let t = table();
        assert_eq!(t.params(10.0), (0.02, 0.04));
        assert_eq!(t.params(250.0), (0.02, 0.04));
    }

    #[test]
    fn below_first_entry_uses_first_entry() {
        assert_eq!(table().params(0.2), (0.0, 0.01));
    }

    #[test]
    fn exact_entry_distance_returns_entry() {
        assert_eq!(table().params(5.0), (0.01, 0.02));
    }

    #[test]
    fn parse_accepts_semicolons_newlines_and_whitespace() {
        let parsed = DistanceTable::parse(" 1, 0.0, 0.01 ;5,0.01,0.02\n10 ,0.02, 0.04;").unwrap();
        assert_eq!(parsed, table());
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for bad in ["1,2", "1,x,3", "1,0,-0.1", "  ;  ", "nan,0,0"] {
            assert!(
                matches!(DistanceTable::parse(bad), Err(ScanError::Configuration(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn zero_sigma_sample_is_the_interpolated_mean() {
        let t = DistanceTable::from_entries([(0.0, 0.0, 0.0), (10.0, 1.0, 0.0)]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_abs_diff_eq!(t.sample(2.5, &mut rng), 0.25, epsilon = 1e-12);
    }
}
