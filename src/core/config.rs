//! League configuration.
//!
//! A flat set of hyperparameters, loadable from JSON with every key
//! optional. Presets mirror the training profiles the league is usually
//! run with.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::games::RewardShaping;
use crate::mcts::MCTSConfig;
use crate::nn::NetworkConfig;

/// Hyperparameters for a league run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeagueConfig {
    /// Adam learning rate for every trained agent.
    pub learning_rate: f64,

    /// Replay buffer capacity (experiences).
    pub buffer_capacity: usize,

    /// Experiences sampled per training step.
    pub batch_size: usize,

    /// Training steps per agent per generation.
    pub training_steps_per_generation: usize,

    /// Matches played per generation. The roster is cycled, so the default
    /// of six plays every pairing once.
    pub games_per_generation: usize,

    /// Run the challenger phase every N generations.
    pub challenger_interval: u64,

    /// Run the wildcard phase every N generations.
    pub wildcard_interval: u64,

    /// Win rate a challenger must exceed to be promoted.
    pub challenger_threshold: f64,

    /// Move limit per game; reaching it ends the game without a decision.
    pub max_moves_per_game: usize,

    /// Save checkpoints every N generations.
    pub save_interval: u64,

    /// MCTS simulations per move.
    pub mcts_simulations: u32,

    /// Requested compute device. Only `cpu` is available; anything else
    /// falls back to it with a warning.
    pub device: String,

    /// Directory for checkpoints and summaries.
    pub checkpoint_dir: PathBuf,

    /// Master seed for matches and sampling.
    pub seed: u64,

    /// Move-selection attempts before the safe fallback move.
    pub max_move_retries: u32,

    /// Probability of playing a uniformly random legal move.
    pub exploration_rate: f64,

    /// Evaluation games per game kind in the challenger phase.
    pub challenger_eval_games: usize,

    /// Evaluation games per game kind in the wildcard phase.
    pub wildcard_eval_games: usize,

    /// Network architecture.
    pub network: NetworkConfig,

    /// Search parameters other than the simulation count.
    pub mcts: MCTSConfig,

    /// Chess draw and repetition shaping.
    pub reward_shaping: RewardShaping,
}

impl Default for LeagueConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            buffer_capacity: 100_000,
            batch_size: 64,
            training_steps_per_generation: 50,
            games_per_generation: 6,
            challenger_interval: 5,
            wildcard_interval: 3,
            challenger_threshold: 0.55,
            max_moves_per_game: 200,
            save_interval: 10,
            mcts_simulations: 25,
            device: "cpu".to_string(),
            checkpoint_dir: PathBuf::from("checkpoints"),
            seed: 42,
            max_move_retries: 3,
            exploration_rate: 0.1,
            challenger_eval_games: 20,
            wildcard_eval_games: 10,
            network: NetworkConfig::default(),
            mcts: MCTSConfig::default(),
            reward_shaping: RewardShaping::default(),
        }
    }
}

impl LeagueConfig {
    /// Names accepted by [`LeagueConfig::preset`].
    pub const PRESETS: [&'static str; 3] = ["default", "training", "fast"];

    /// Look up a named preset.
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        let base = Self::default();
        match name {
            "default" => Ok(base),
            "training" => Ok(Self {
                learning_rate: 0.002,
                buffer_capacity: 50_000,
                training_steps_per_generation: 150,
                challenger_interval: 3,
                wildcard_interval: 8,
                challenger_threshold: 0.65,
                max_moves_per_game: 150,
                save_interval: 5,
                mcts_simulations: 50,
                ..base
            }),
            "fast" => Ok(base.fast()),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }

    /// Apply the fast-iteration overrides on top of this config.
    #[must_use]
    pub fn fast(self) -> Self {
        Self {
            mcts_simulations: 10,
            training_steps_per_generation: 25,
            ..self
        }
    }

    /// Load from a JSON file. Missing keys take default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty JSON.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject values the league cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &'static str, reason: &str) -> ConfigError {
            ConfigError::Invalid {
                key,
                reason: reason.to_string(),
            }
        }

        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(invalid("learning_rate", "must be positive and finite"));
        }
        if self.buffer_capacity == 0 {
            return Err(invalid("buffer_capacity", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.challenger_interval == 0 {
            return Err(invalid("challenger_interval", "must be at least 1"));
        }
        if self.wildcard_interval == 0 {
            return Err(invalid("wildcard_interval", "must be at least 1"));
        }
        if self.save_interval == 0 {
            return Err(invalid("save_interval", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.challenger_threshold) {
            return Err(invalid("challenger_threshold", "must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(invalid("exploration_rate", "must be within [0, 1]"));
        }
        if self.games_per_generation == 0 {
            return Err(invalid("games_per_generation", "must be at least 1"));
        }
        if self.max_moves_per_game == 0 {
            return Err(invalid("max_moves_per_game", "must be at least 1"));
        }
        Ok(())
    }

    /// Whether the requested device is the CPU backend actually used.
    #[must_use]
    pub fn uses_cpu(&self) -> bool {
        matches!(self.device.as_str(), "cpu" | "auto")
    }

    /// Set the learning rate.
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set the replay buffer capacity.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Set the training batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the training steps per generation.
    pub fn with_training_steps(mut self, steps: usize) -> Self {
        self.training_steps_per_generation = steps;
        self
    }

    /// Set the matches played per generation.
    pub fn with_games_per_generation(mut self, games: usize) -> Self {
        self.games_per_generation = games;
        self
    }

    /// Set the MCTS simulations per move.
    pub fn with_mcts_simulations(mut self, simulations: u32) -> Self {
        self.mcts_simulations = simulations;
        self
    }

    /// Set the per-game move limit.
    pub fn with_max_moves(mut self, max_moves: usize) -> Self {
        self.max_moves_per_game = max_moves;
        self
    }

    /// Set the challenger, wildcard and save intervals.
    pub fn with_intervals(mut self, challenger: u64, wildcard: u64, save: u64) -> Self {
        self.challenger_interval = challenger;
        self.wildcard_interval = wildcard;
        self.save_interval = save;
        self
    }

    /// Set the evaluation game counts for the challenger and wildcard phases.
    pub fn with_eval_games(mut self, challenger: usize, wildcard: usize) -> Self {
        self.challenger_eval_games = challenger;
        self.wildcard_eval_games = wildcard;
        self
    }

    /// Set the network architecture.
    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    /// Set the checkpoint directory.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Set the master seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
