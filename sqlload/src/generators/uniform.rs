use std::time::Duration;

use rand::{Rng, RngCore};

use super::Generator;

/// Uniform integer in `[min, max]`.
pub struct UniformInt {
    min: i64,
    max: i64,
}

impl UniformInt {
    pub fn new(min: i64, max: i64) -> Self {
        assert!(min <= max, "empty integer range {}..={}", min, max);
        UniformInt { min, max }
    }
}

impl Generator<i64> for UniformInt {
    fn next(&self, rng: &mut dyn RngCore) -> i64 {
        rng.gen_range(self.min..=self.max)
    }
}

/// Uniform duration in `[min, max)`, drawn at sub-millisecond resolution.
pub struct UniformDuration {
    min: f64,
    max: f64,
}

impl UniformDuration {
    pub fn new(min: Duration, max: Duration) -> Self {
        assert!(min < max, "empty duration range {:?}..{:?}", min, max);
        UniformDuration {
            min: min.as_secs_f64(),
            max: max.as_secs_f64(),
        }
    }
}

impl Generator<Duration> for UniformDuration {
    fn next(&self, rng: &mut dyn RngCore) -> Duration {
        Duration::from_secs_f64(rng.gen_range(self.min..self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn keys_stay_inside_inclusive_range() {
        let gen = UniformInt::new(1, 1000);
        let mut rng = StdRng::seed_from_u64(7);
        let mut saw_low = false;
        let mut saw_high = false;
        for _ in 0..200_000 {
            let k = gen.next(&mut rng);
            assert!((1..=1000).contains(&k));
            saw_low |= k == 1;
            saw_high |= k == 1000;
        }
        assert!(saw_low && saw_high);
    }

    #[test]
    fn think_time_is_half_open() {
        let gen = UniformDuration::new(Duration::from_millis(500), Duration::from_millis(2500));
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10_000 {
            let d = gen.next(&mut rng);
            assert!(d >= Duration::from_millis(500));
            assert!(d < Duration::from_millis(2500));
        }
    }
}
