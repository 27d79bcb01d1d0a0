//! MCTS configuration parameters.

use serde::{Deserialize, Serialize};

/// MCTS configuration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MCTSConfig {
    /// Simulations per search.
    pub num_simulations: u32,

    /// PUCT exploration constant.
    /// Higher values lean on the prior over observed values.
    pub c_puct: f64,

    /// Dirichlet concentration for root noise.
    pub dirichlet_alpha: f32,

    /// Weight of the noise in the root priors (`0` disables mixing).
    pub dirichlet_epsilon: f32,

    /// Whether to mix Dirichlet noise into the root priors.
    pub root_noise: bool,

    /// Random seed for root noise.
    /// Same seed produces deterministic searches.
    pub seed: u64,
}

impl Default for MCTSConfig {
    fn default() -> Self {
        Self {
            num_simulations: 25,
            c_puct: 1.0,
            dirichlet_alpha: 0.3,
            dirichlet_epsilon: 0.25,
            root_noise: true,
            seed: 42,
        }
    }
}

impl MCTSConfig {
    /// Set the number of simulations.
    pub fn with_simulations(mut self, n: u32) -> Self {
        self.num_simulations = n;
        self
    }

    /// Set the exploration constant.
    pub fn with_c_puct(mut self, c: f64) -> Self {
        self.c_puct = c;
        self
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable root noise.
    pub fn with_root_noise(mut self, enabled: bool) -> Self {
        self.root_noise = enabled;
        self
    }

    /// Set the Dirichlet parameters.
    pub fn with_dirichlet(mut self, alpha: f32, epsilon: f32) -> Self {
        self.dirichlet_alpha = alpha;
        self.dirichlet_epsilon = epsilon;
        self
    }
}
