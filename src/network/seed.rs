use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::RandomSeed;
use super::traits::SeedSource;

/// Seed generator backed by a seedable PRNG
///
/// Two generators created from the same seed produce the same sequence,
/// which keeps replayed joins deterministic.
pub struct RandomSeeds {
    rng: StdRng,
}

impl RandomSeeds {
    /// Creates a generator seeded from system entropy
    pub fn from_entropy() -> Self {
        RandomSeeds { rng: StdRng::from_entropy() }
    }

    /// Creates a deterministic generator
    pub fn seeded(seed: u64) -> Self {
        RandomSeeds { rng: StdRng::seed_from_u64(seed) }
    }
}

impl SeedSource for RandomSeeds {
    fn next_slot_seed(&mut self) -> u8 {
        self.rng.gen()
    }

    fn next_seed(&mut self) -> RandomSeed {
        self.rng.gen()
    }
}
