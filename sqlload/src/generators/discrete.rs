use rand::{Rng, RngCore};

use super::Generator;

/// Categorical choice over a cumulative weight table. A single uniform draw
/// in `[0, 1)` is mapped to the first bucket whose cumulative weight exceeds it.
pub struct Discrete<T> {
    cumulative: Vec<(f64, T)>,
    total: f64,
}

impl<T> Discrete<T> {
    pub fn new(weights: Vec<(f64, T)>) -> Self {
        assert!(!weights.is_empty(), "discrete generator needs at least one bucket");
        let mut total = 0.0;
        let mut cumulative = Vec::with_capacity(weights.len());
        for (w, v) in weights {
            assert!(w >= 0.0, "negative weight {}", w);
            total += w;
            cumulative.push((total, v));
        }
        assert!(total > 0.0, "discrete generator weights sum to zero");
        Discrete { cumulative, total }
    }

    /// Bucket for a draw `u` in `[0, 1)`.
    pub fn pick(&self, u: f64) -> &T {
        let x = u * self.total;
        for (bound, v) in &self.cumulative {
            if x < *bound {
                return v;
            }
        }
        &self.cumulative[self.cumulative.len() - 1].1
    }

    pub fn total_weight(&self) -> f64 {
        self.total
    }

    /// Per-bucket weights, in table order.
    pub fn weights(&self) -> Vec<(f64, &T)> {
        let mut prev = 0.0;
        self.cumulative
            .iter()
            .map(|(bound, v)| {
                let w = bound - prev;
                prev = *bound;
                (w, v)
            })
            .collect()
    }
}

impl<T: Clone + Send + Sync + 'static> Generator<T> for Discrete<T> {
    fn next(&self, rng: &mut dyn RngCore) -> T {
        self.pick(rng.gen::<f64>()).clone()
    }
}
