use rand::{Rng, RngCore};

use super::{Generator, UniformInt};

const NAME_POOL: &[&str] = &[
    "Alice", "Bob", "Charlie", "Diana", "Edward", "Fiona", "George", "Hannah", "Ivan", "Julia",
];

/// Pseudo-random display names: a pool entry plus a numeric suffix.
pub struct NameGenerator {
    pool: &'static [&'static str],
    suffix: UniformInt,
}

impl NameGenerator {
    pub fn new(max_suffix: i64) -> Self {
        NameGenerator {
            pool: NAME_POOL,
            suffix: UniformInt::new(1, max_suffix),
        }
    }

    pub fn pool(&self) -> &'static [&'static str] {
        self.pool
    }
}

impl Generator<String> for NameGenerator {
    fn next(&self, rng: &mut dyn RngCore) -> String {
        let base = self.pool[rng.gen_range(0..self.pool.len())];
        format!("{}_{}", base, self.suffix.next(rng))
    }
}
