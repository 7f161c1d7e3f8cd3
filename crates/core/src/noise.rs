//! Deterministic 2-D simplex noise and fractal Brownian motion (fBm), built
//! entirely from the core's own [`Xoshiro256StarStar`] -- no third-party
//! noise crate, so the cross-platform golden-output vectors in spec §4.3 are
//! fully owned by this implementation rather than an opaque dependency.
//!
//! All arithmetic is `f64`, no fused-multiply-add is used anywhere (every
//! multiply and add is a separate statement), and the permutation table is
//! built with a single deterministic Fisher-Yates shuffle seeded from the
//! same PRNG used for gameplay randomness.

use crate::rng::Xoshiro256StarStar;
use rand_core::RngCore;

const GRAD2: [(f64, f64); 8] = [
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, -1.0),
    (1.0, 1.0),
    (-1.0, -1.0),
    (1.0, -1.0),
    (-1.0, 1.0),
];

/// Seeded 256-entry permutation table, doubled to 512 entries to avoid
/// wraparound index arithmetic at lookup time.
#[derive(Debug, Clone)]
pub struct SimplexNoise {
    perm: [u8; 512],
}

impl SimplexNoise {
    pub fn new(seed: u64) -> Self {
        let mut rng = Xoshiro256StarStar::new(seed);
        let mut p: [u8; 256] = [0; 256];
        for (i, slot) in p.iter_mut().enumerate() {
            *slot = i as u8;
        }
        for i in (1..256usize).rev() {
            let j = (rng.next_u32() as usize) % (i + 1);
            p.swap(i, j);
        }
        let mut perm = [0u8; 512];
        for i in 0..512 {
            perm[i] = p[i % 256];
        }
        Self { perm }
    }

    #[inline]
    fn perm(&self, i: i64) -> i64 {
        self.perm[(i & 511) as usize] as i64
    }

    /// 2-D simplex noise sample, output in approximately `[-1, 1]`.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let f2: f64 = 0.5 * (3.0_f64.sqrt() - 1.0);
        let g2: f64 = (3.0 - 3.0_f64.sqrt()) / 6.0;

        let s = (x + y) * f2;
        let i = (x + s).floor();
        let j = (y + s).floor();
        let t = (i + j) * g2;
        let x0_origin = i - t;
        let y0_origin = j - t;
        let x0 = x - x0_origin;
        let y0 = y - y0_origin;

        let (i1, j1) = if x0 > y0 { (1i64, 0i64) } else { (0i64, 1i64) };

        let x1 = x0 - i1 as f64 + g2;
        let y1 = y0 - j1 as f64 + g2;
        let x2 = x0 - 1.0 + 2.0 * g2;
        let y2 = y0 - 1.0 + 2.0 * g2;

        let ii = i as i64 & 255;
        let jj = j as i64 & 255;

        let gi0 = (self.perm(ii + self.perm(jj)) % 8) as usize;
        let gi1 = (self.perm(ii + i1 + self.perm(jj + j1)) % 8) as usize;
        let gi2 = (self.perm(ii + 1 + self.perm(jj + 1)) % 8) as usize;

        let n0 = Self::corner_contribution(gi0, x0, y0);
        let n1 = Self::corner_contribution(gi1, x1, y1);
        let n2 = Self::corner_contribution(gi2, x2, y2);

        70.0 * (n0 + n1 + n2)
    }

    fn corner_contribution(gi: usize, x: f64, y: f64) -> f64 {
        let mut t = 0.5 - x * x - y * y;
        if t < 0.0 {
            return 0.0;
        }
        t *= t;
        let (gx, gy) = GRAD2[gi];
        t * t * (gx * x + gy * y)
    }
}

/// Fractal Brownian motion: sums several octaves of [`SimplexNoise`] at
/// increasing frequency and decreasing amplitude, normalized so the result
/// stays within `[-1, 1]` regardless of octave count.
#[derive(Debug, Clone, Copy)]
pub struct FbmParams {
    pub octaves: u32,
    pub lacunarity: f64,
    pub persistence: f64,
    pub scale: f64,
}

impl Default for FbmParams {
    fn default() -> Self {
        Self {
            octaves: 6,
            lacunarity: 2.0,
            persistence: 0.45,
            scale: 0.01,
        }
    }
}

pub fn fbm(noise: &SimplexNoise, x: f64, y: f64, params: FbmParams) -> f64 {
    let mut amplitude = 1.0;
    let mut frequency = params.scale;
    let mut total = 0.0;
    let mut max_value = 0.0;
    for _ in 0..params.octaves {
        total += noise.sample(x * frequency, y * frequency) * amplitude;
        max_value += amplitude;
        amplitude *= params.persistence;
        frequency *= params.lacunarity;
    }
    if max_value > 0.0 {
        total / max_value
    } else {
        0.0
    }
}

/// Maps an fBm value in `[-1, 1]` to a byte in `[0, 255]`, the form the
/// golden vectors and elevation channel both use.
pub fn fbm_to_byte(v: f64) -> u8 {
    let scaled = ((v + 1.0) * 0.5) * 255.0;
    scaled.round().clamp(0.0, 255.0) as u8
}

/// World-space feature size scaling relative to a 256x256 reference map
/// (spec §4.3): frequency scales inversely with map side so the apparent
/// size of terrain features stays constant as the map grows.
pub fn scale_frequency_for_map_side(base_scale: f64, map_side: u16) -> f64 {
    base_scale * (256.0 / map_side as f64)
}

const GOLDEN_SAMPLE_POINTS: [(f64, f64); 4] =
    [(0.0, 0.0), (12.34, 56.78), (-5.5, 100.0), (250.0, 250.0)];

/// The four golden simplex samples for seed 12345 (spec §4.3).
pub fn golden_simplex_samples(seed: u64) -> [f64; 4] {
    let noise = SimplexNoise::new(seed);
    GOLDEN_SAMPLE_POINTS.map(|(x, y)| noise.sample(x, y))
}

/// The four golden fBm bytes for seed 12345 (spec §4.3), using the default
/// `octaves=4, lacunarity=2.0, persistence=0.5, scale=0.05` profile.
pub fn golden_fbm_bytes(seed: u64) -> [u8; 4] {
    let noise = SimplexNoise::new(seed);
    let params = FbmParams {
        octaves: 4,
        lacunarity: 2.0,
        persistence: 0.5,
        scale: 0.05,
    };
    GOLDEN_SAMPLE_POINTS.map(|(x, y)| fbm_to_byte(fbm(&noise, x, y, params)))
}
