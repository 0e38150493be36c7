mod constant;
mod discrete;
mod names;
mod uniform;

pub use constant::Constant;
pub use discrete::Discrete;
pub use names::NameGenerator;
pub use uniform::{UniformDuration, UniformInt};

use rand::RngCore;

/// Source of workload parameters. Randomness comes from the caller so every
/// virtual user can drive generators from its own seeded RNG.
pub trait Generator<T>: 'static + std::marker::Send + std::marker::Sync {
    fn next(&self, rng: &mut dyn RngCore) -> T;
}
