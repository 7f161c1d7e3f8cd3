//! Deterministic PRNG: xoshiro256** seeded from a 64-bit seed via SplitMix64.
//!
//! Per spec §4.3, determinism must hold cross-platform: single-threaded,
//! no fused-multiply-add, no calls into system RNG. Implementing
//! [`rand_core::RngCore`] lets this slot into the wider `rand` ecosystem
//! (`rand::seq::IteratorRandom`, `WeightedIndex`, ...) the way the teacher's
//! code uses `rand`/`rand_chacha`, while keeping full control of the
//! bit-exact algorithm the golden vectors pin down.

use rand_core::{Error, RngCore, SeedableRng};

/// SplitMix64, used only to expand a single 64-bit seed into the 4 words of
/// xoshiro256** state.
#[derive(Debug, Clone, Copy)]
struct SplitMix64(u64);

impl SplitMix64 {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

/// xoshiro256** PRNG. 256-bit state, 64-bit output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xoshiro256StarStar {
    s: [u64; 4],
}

impl Xoshiro256StarStar {
    pub fn new(seed: u64) -> Self {
        let mut sm = SplitMix64(seed);
        Self {
            s: [sm.next(), sm.next(), sm.next(), sm.next()],
        }
    }

    #[inline]
    fn rotl(x: u64, k: u32) -> u64 {
        (x << k) | (x >> (64 - k))
    }

    /// Raw 64-bit xoshiro256** output, advancing the generator state.
    pub fn next_u64_raw(&mut self) -> u64 {
        let result = Self::rotl(self.s[1].wrapping_mul(5), 7).wrapping_mul(9);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = Self::rotl(self.s[3], 45);

        result
    }

    /// Uniform `f32` in `[0, 1)`, built from the top 24 bits of a 64-bit draw
    /// (no FMA, no division-by-constant trickery that a compiler could
    /// contract differently across targets).
    pub fn next_f32(&mut self) -> f32 {
        let bits = (self.next_u64_raw() >> 40) as u32; // top 24 bits
        (bits as f32) / (1u32 << 24) as f32
    }
}

impl RngCore for Xoshiro256StarStar {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64_raw() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_raw()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut chunks = dest.chunks_exact_mut(8);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&self.next_u64_raw().to_le_bytes());
        }
        let rem = chunks.into_remainder();
        if !rem.is_empty() {
            let bytes = self.next_u64_raw().to_le_bytes();
            rem.copy_from_slice(&bytes[..rem.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Xoshiro256StarStar {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Xoshiro256StarStar::new(u64::from_le_bytes(seed))
    }
}

/// The four golden xoshiro256** outputs for seed 12345, pinned by
/// `tests::golden_prng_seed_12345` below. Any change to the algorithm above
/// that shifts these values is a determinism break and must not ship.
///
/// The spec's own two sections disagree on the count (§4.3 says "four fixed
/// PRNG outputs"; §8's testable-properties list says "the 8 declared
/// 64-bit values"). §4.3 is where the golden vector is actually defined
/// claim-by-claim alongside its four simplex samples and four fBm bytes, so
/// this crate pins four PRNG outputs and treats §8's "8" as that section
/// mis-tallying simplex + fBm samples into the PRNG's own count rather than
/// a second, separate vector.
pub fn golden_prng_outputs(seed: u64) -> [u64; 4] {
    let mut rng = Xoshiro256StarStar::new(seed);
    [
        rng.next_u64_raw(),
        rng.next_u64_raw(),
        rng.next_u64_raw(),
        rng.next_u64_raw(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn golden_prng_seed_12345() {
        let outputs = golden_prng_outputs(12345);
        // Recorded once from this exact implementation; cross-platform
        // determinism is verified by re-running this test on every target.
        assert_eq!(
            outputs,
            [
                0xBE6A_3637_4160_D49B,
                0x214A_AA06_37A6_88C6,
                0xF69D_16DE_9954_D388,
                0x0C60_048C_4E96_E033,
            ]
        );
    }

    #[test]
    fn deterministic_across_instances() {
        let a = golden_prng_outputs(999);
        let b = golden_prng_outputs(999);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_diverge() {
        let a = golden_prng_outputs(1);
        let b = golden_prng_outputs(2);
        assert_ne!(a, b);
    }

    #[test]
    fn next_f32_in_unit_range() {
        let mut rng = Xoshiro256StarStar::new(42);
        for _ in 0..10_000 {
            let v = rng.next_f32();
            assert!((0.0..1.0).contains(&v));
        }
    }
}
