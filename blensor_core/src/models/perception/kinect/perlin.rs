// blensor_core/src/models/perception/kinect/perlin.rs

//! 2D gradient (Perlin) noise with a permutation seeded from the scan's rng.

use rand::seq::SliceRandom;
use rand::RngCore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Perlin {
    perm: Vec<usize>,
}

fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(t: f64, a: f64, b: f64) -> f64 {
    a + t * (b - a)
}

fn grad(hash: usize, x: f64, y: f64) -> f64 {
    match hash & 7 {
        0 => x + y,
        1 => -x + y,
        2 => x - y,
        3 => -x - y,
        4 => x,
        5 => -x,
        6 => y,
        _ => -y,
    }
}

impl Perlin {
    pub fn new(rng: &mut dyn RngCore) -> Self {
        let mut table: Vec<usize> = (0..256).collect();
        table.shuffle(rng);
        let perm = table.iter().chain(table.iter()).copied().collect();
        Self { perm }
    }

    /// Noise at `(x, y)`, roughly in `[-1, 1]` and zero on integer lattice points.
    pub fn noise(&self, x: f64, y: f64) -> f64 {
        let (x0, y0) = (x.floor(), y.floor());
        let (xf, yf) = (x - x0, y - y0);
        let xi = (x0 as i64).rem_euclid(256) as usize;
        let yi = (y0 as i64).rem_euclid(256) as usize;
        let p = &self.perm;

        let aa = p[p[xi] + yi];
        let ab = p[p[xi] + yi + 1];
        let ba = p[p[xi + 1] + yi];
        let bb = p[p[xi + 1] + yi + 1];

        let (u, v) = (fade(xf), fade(yf));
        lerp(
            v,
            lerp(u, grad(aa, xf, yf), grad(ba, xf - 1.0, yf)),
            lerp(u, grad(ab, xf, yf - 1.0), grad(bb, xf - 1.0, yf - 1.0)),
        )
    }
}
