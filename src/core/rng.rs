//! Deterministic random number generation with forking for search and play.
//!
//! ## Key Features
//!
//! - **Deterministic**: Same seed produces identical sequence
//! - **Forkable**: Independent branches for each search or match
//! - **Serializable**: O(1) state capture and restore for league checkpoints
//! - **Dirichlet noise**: Root exploration noise for MCTS
//!
//! ## Usage
//!
//! ```
//! use rust_cheche::core::GameRng;
//!
//! let mut rng = GameRng::new(42);
//!
//! // Fork for a search
//! let mut search_rng = rng.fork();
//!
//! // Original and fork produce different sequences
//! assert_ne!(rng.gen_range(0..100), search_rng.gen_range(0..100));
//!
//! // Noise over three root moves sums to one
//! let noise = rng.dirichlet(0.3, 3);
//! assert!((noise.iter().sum::<f32>() - 1.0).abs() < 1e-4);
//! ```

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Gamma};
use serde::{Deserialize, Serialize};

/// Deterministic RNG with forking.
///
/// Uses ChaCha8 for speed while maintaining high quality randomness.
#[derive(Clone, Debug)]
pub struct GameRng {
    inner: ChaCha8Rng,
    seed: u64,
    fork_counter: u64,
}

impl GameRng {
    /// Create a new RNG with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            seed,
            fork_counter: 0,
        }
    }

    /// Fork this RNG to create an independent branch.
    ///
    /// Each fork produces a different but deterministic sequence.
    #[must_use]
    pub fn fork(&mut self) -> Self {
        self.fork_counter += 1;
        let fork_seed = self.seed.wrapping_add(self.fork_counter.wrapping_mul(0x9E3779B97F4A7C15));
        Self {
            inner: ChaCha8Rng::seed_from_u64(fork_seed),
            seed: fork_seed,
            fork_counter: 0,
        }
    }

    /// Seed this RNG was created from.
    #[inline]
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate a random integer in the given range.
    pub fn gen_range(&mut self, range: std::ops::Range<i32>) -> i32 {
        self.inner.gen_range(range)
    }

    /// Generate a random usize in the given range.
    pub fn gen_range_usize(&mut self, range: std::ops::Range<usize>) -> usize {
        self.inner.gen_range(range)
    }

    /// Generate a random boolean with given probability of true.
    pub fn gen_bool(&mut self, probability: f64) -> bool {
        self.inner.gen_bool(probability.clamp(0.0, 1.0))
    }

    /// Uniform float in `[0, 1)`.
    pub fn gen_unit(&mut self) -> f32 {
        self.inner.gen::<f32>()
    }

    /// Choose a random element from a slice.
    #[must_use]
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        use rand::seq::SliceRandom;
        slice.choose(&mut self.inner)
    }

    /// Choose a random element with weighted probability.
    ///
    /// Returns the index of the chosen element.
    /// Weights do not need to sum to 1.0.
    ///
    /// Returns `None` if weights are empty or all zero.
    pub fn choose_weighted(&mut self, weights: &[f32]) -> Option<usize> {
        if weights.is_empty() {
            return None;
        }

        let total: f32 = weights.iter().sum();
        if !(total > 0.0) {
            return None;
        }

        let mut threshold = self.inner.gen::<f32>() * total;

        for (i, &weight) in weights.iter().enumerate() {
            threshold -= weight;
            if threshold <= 0.0 && weight > 0.0 {
                return Some(i);
            }
        }

        // Floating point edge case - return last non-zero weight
        weights.iter().rposition(|&w| w > 0.0)
    }

    /// Sample `n` indices from `0..len` without replacement.
    ///
    /// Returns `min(n, len)` indices without materializing `0..len`.
    pub fn sample_indices(&mut self, len: usize, n: usize) -> Vec<usize> {
        index::sample(&mut self.inner, len, n.min(len)).into_vec()
    }

    /// Draw a Dirichlet(alpha, ..., alpha) sample of dimension `n`.
    ///
    /// Built from normalized Gamma variates so that `n == 1` is valid.
    /// Falls back to a uniform vector if alpha is not positive.
    pub fn dirichlet(&mut self, alpha: f32, n: usize) -> Vec<f32> {
        if n == 0 {
            return Vec::new();
        }

        let uniform = vec![1.0 / n as f32; n];
        let Ok(gamma) = Gamma::new(f64::from(alpha), 1.0) else {
            return uniform;
        };

        let samples: Vec<f64> = (0..n).map(|_| gamma.sample(&mut self.inner)).collect();
        let sum: f64 = samples.iter().sum();
        if !(sum > 0.0) || !sum.is_finite() {
            return uniform;
        }

        samples.iter().map(|&s| (s / sum) as f32).collect()
    }

    /// Get the current state for serialization.
    #[must_use]
    pub fn state(&self) -> GameRngState {
        GameRngState {
            seed: self.seed,
            word_pos: self.inner.get_word_pos(),
            fork_counter: self.fork_counter,
        }
    }

    /// Restore from a saved state.
    #[must_use]
    pub fn from_state(state: &GameRngState) -> Self {
        let mut inner = ChaCha8Rng::seed_from_u64(state.seed);
        inner.set_word_pos(state.word_pos);
        Self {
            inner,
            seed: state.seed,
            fork_counter: state.fork_counter,
        }
    }
}

/// Serializable RNG state for league checkpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRngState {
    /// Original seed
    pub seed: u64,
    /// ChaCha8 word position (128-bit counter)
    pub word_pos: u128,
    /// Fork counter for deterministic branching
    pub fork_counter: u64,
}
