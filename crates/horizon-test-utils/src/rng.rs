//! Seeded randomness for reproducible tests.

use nalgebra::DVector;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Create a deterministic `ChaCha8Rng` from a seed.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Vector of `dim` entries drawn uniformly from `range`.
pub fn random_vector(rng: &mut ChaCha8Rng, dim: usize, range: std::ops::Range<f64>) -> DVector<f64> {
    DVector::from_fn(dim, |_, _| rng.gen_range(range.clone()))
}
