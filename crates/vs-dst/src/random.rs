//! Seeded randomness.
//!
//! Every random decision in a DST run (operation choice, fault placement,
//! scheduling) comes from a `DeterministicRng`, so a run is reproduced by
//! its seed alone.

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::distributions::{Distribution, Standard};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Mixing constant for deriving per-stream seeds (golden ratio).
const STREAM_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Deterministic random number generator.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    seed: u64,
    rng: StdRng,
}

impl DeterministicRng {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed this generator was created from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Independent generator for stream `stream` (e.g. one per thread).
    ///
    /// Depends only on the original seed and `stream`, not on how much of
    /// this generator has been consumed.
    #[must_use]
    pub fn fork(&self, stream: u64) -> Self {
        Self::new(derive_seed(self.seed, stream))
    }

    pub fn gen<T>(&mut self) -> T
    where
        Standard: Distribution<T>,
    {
        self.rng.gen()
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rng.gen_range(range)
    }

    /// True with probability `p` (clamped to `[0, 1]`).
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}

/// Seed for stream `stream` of a run seeded with `seed`.
#[must_use]
pub fn derive_seed(seed: u64, stream: u64) -> u64 {
    seed ^ stream.wrapping_add(1).wrapping_mul(STREAM_MIX)
}
