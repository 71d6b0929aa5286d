//! Deterministic random streams for variant selection.
//!
//! Every variant-producing component draws from its own stream, derived
//! from the document seed and the component index. Re-running a definition
//! therefore reproduces the same selection, and adding randomness to one
//! component does not shift the draws of another.

use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of the stream numbered `stream` under `seed`.
pub fn derive_seed(seed: u64, stream: u64) -> u64 {
    splitmix64(splitmix64(seed) ^ stream.wrapping_mul(0x9E37_79B9))
}

/// A seeded generator used by the sampling routines.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRng {
    rng: Pcg64Mcg,
}

impl VariantRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Uniform index in `0..n`. `n` must be positive.
    pub fn index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Uniform draw in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }
}
