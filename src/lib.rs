//! # rust-cheche
//!
//! Self-play league training for chess and checkers.
//!
//! ## Design Principles
//!
//! 1. **One network, two games**: a shared residual trunk with a policy head
//!    per [`GameKind`] and one value head.
//!
//! 2. **Search in an arena**: MCTS nodes live in a flat vector and refer to
//!    each other by [`NodeId`]. The tree is rebuilt for every search.
//!
//! 3. **Faults stay local**: a failed simulation, move or training step is
//!    reported to a [`Diagnostics`] sink and replaced by a fallback. Only
//!    configuration errors and requested checkpoint loads reach the caller.
//!
//! ## Architecture
//!
//! League drives Competition, Competition drives Match, Match drives MCTS
//! and the rules engines, MCTS drives the network. Match experiences fill
//! the replay buffer, which feeds the training managers.
//!
//! ## Modules
//!
//! - `core`: RNG, configuration, errors, diagnostics, retry
//! - `games`: the `Game` trait, chess, checkers and a toy game
//! - `nn`: encoded states, the evaluator trait and the burn network
//! - `mcts`: Monte Carlo Tree Search with PUCT and root noise
//! - `training`: replay buffer and training manager
//! - `league`: agents, matches, competition and the generation loop

pub mod core;
pub mod games;
pub mod league;
pub mod mcts;
pub mod nn;
pub mod training;

// Re-export commonly used types
pub use crate::core::{
    Backoff, CheckpointError, ConfigError, Diagnostics, Error, EvaluationError, GameError,
    GameRng, LeagueConfig, Result, SharedDiagnostics, TrainingError,
};

pub use crate::games::{
    CheckersBoard, CheckersGame, CheckersMove, ChessBoard, ChessGame, Game, GameKind,
    TinyGame,
};

pub use crate::nn::{EncodedState, Evaluator, NetworkConfig, NetworkEvaluator, Prediction};

pub use crate::mcts::{MCTSConfig, MCTSSearch, MCTSTree, NodeId, SearchStats, PUCT};

pub use crate::training::{Experience, LossReport, ReplayBuffer, TrainingManager};

pub use crate::league::{Agent, Competition, LeagueManager, Match, MatchConfig, MatchOutcome};
