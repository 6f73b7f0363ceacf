// blensor_core/src/models/perception/kinect/disparity.rs

//! Disparity quantization and the 9×9 window consistency filter.

use super::perlin::Perlin;

/// Side of the consistency window.
pub const WINDOW: usize = 9;
const HALF: i64 = (WINDOW / 2) as i64;
/// Accepted values spread to neighbors up to this many pixels away.
pub const FILL_RADIUS: i64 = 3;

/// Illumination dots seen inside one window (1 = dot).
pub const DOT_PATTERN: [[u8; WINDOW]; WINDOW] = [
    [1, 0, 0, 1, 0, 1, 0, 0, 1],
    [0, 1, 0, 0, 1, 0, 0, 1, 0],
    [0, 0, 1, 0, 0, 0, 1, 0, 1],
    [1, 0, 0, 1, 0, 1, 0, 0, 0],
    [0, 1, 0, 0, 1, 0, 0, 1, 0],
    [0, 0, 0, 1, 0, 1, 0, 0, 1],
    [1, 0, 1, 0, 0, 0, 1, 0, 0],
    [0, 1, 0, 0, 1, 0, 0, 1, 0],
    [1, 0, 0, 1, 0, 1, 0, 0, 1],
];

/// Rounds to the sensor's 1/8 pixel steps.
pub fn quantize(value: f64) -> f64 {
    (value * 8.0).round() / 8.0
}

/// Per-pixel disparities, `NaN` where there is none.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityGrid {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f64>,
}

impl DisparityGrid {
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            values: vec![f64::NAN; width * height],
        }
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    /// Value at `(x, y)`, `None` outside the image or where empty.
    pub fn get(&self, x: i64, y: i64) -> Option<f64> {
        self.index(x, y)
            .map(|i| self.values[i])
            .filter(|v| v.is_finite())
    }

    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        if let Some(i) = self.index(x as i64, y as i64) {
            self.values[i] = value;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Largest distance from the window mean, in pixels, that counts as an inlier.
    pub inlier_threshold: f64,
    pub noise_scale: f64,
    pub noise_smoothness: f64,
}

fn window_weight(dx: i64, dy: i64) -> f64 {
    let r2 = dx * dx + dy * dy;
    if r2 == 0 {
        1.0
    } else {
        1.0 / r2 as f64
    }
}

/// Inverse-squared-distance weighted mean of the window around `(x, y)`.
pub fn window_mean(grid: &DisparityGrid, x: i64, y: i64) -> Option<f64> {
    let mut sum = 0.0;
    let mut weights = 0.0;
    for dy in -HALF..=HALF {
        for dx in -HALF..=HALF {
            if let Some(v) = grid.get(x + dx, y + dy) {
                let w = window_weight(dx, dy);
                sum += w * v;
                weights += w;
            }
        }
    }
    (weights > 0.0).then(|| sum / weights)
}

/// `(inliers, dots)`: how many in-image dot positions of the window hold a
/// value within `threshold` of `mean`, and how many in-image dots there are.
pub fn mask_coverage(grid: &DisparityGrid, x: i64, y: i64, mean: f64, threshold: f64) -> (usize, usize) {
    let mut inliers = 0;
    let mut dots = 0;
    for (row, dy) in DOT_PATTERN.iter().zip(-HALF..=HALF) {
        for (dot, dx) in row.iter().zip(-HALF..=HALF) {
            if *dot == 0 || grid.index(x + dx, y + dy).is_none() {
                continue;
            }
            dots += 1;
            if grid
                .get(x + dx, y + dy)
                .is_some_and(|v| (v - mean).abs() < threshold)
            {
                inliers += 1;
            }
        }
    }
    (inliers, dots)
}

/// Runs the consistency filter: windows whose dots agree on more than 2/3 of
/// their positions accept the center's own disparity plus Perlin noise, and
/// spread it to weaker neighbors.
pub fn filter(grid: &DisparityGrid, params: &FilterParams, perlin: &Perlin) -> DisparityGrid {
    let mut out = DisparityGrid::empty(grid.width, grid.height);
    let mut fill = vec![0.0f64; grid.values.len()];

    for y in 0..grid.height as i64 {
        for x in 0..grid.width as i64 {
            let Some(center) = grid.get(x, y) else {
                continue;
            };
            let Some(mean) = window_mean(grid, x, y) else {
                continue;
            };
            let (inliers, dots) = mask_coverage(grid, x, y, mean, params.inlier_threshold);
            if dots == 0 || 3 * inliers <= 2 * dots {
                continue;
            }
            let noise = params.noise_scale
                * perlin.noise(
                    x as f64 / params.noise_smoothness,
                    y as f64 / params.noise_smoothness,
                );
            let value = center + noise;

            if let Some(i) = out.index(x, y) {
                out.values[i] = value;
                fill[i] = f64::INFINITY;
            }
            for dy in -FILL_RADIUS..=FILL_RADIUS {
                for dx in -FILL_RADIUS..=FILL_RADIUS {
                    let r2 = dx * dx + dy * dy;
                    if r2 == 0 || r2 > FILL_RADIUS * FILL_RADIUS {
                        continue;
                    }
                    let Some(i) = out.index(x + dx, y + dy) else {
                        continue;
                    };
                    let w = 1.0 / r2 as f64;
                    if fill[i] < w {
                        fill[i] = w;
                        out.values[i] = value;
                    }
                }
            }
        }
    }
    out
}
