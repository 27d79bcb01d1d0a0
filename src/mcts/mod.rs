//! Monte Carlo Tree Search.
//!
//! ## Overview
//!
//! AlphaZero-style search guided by an [`Evaluator`](crate::nn::Evaluator):
//!
//! - **PUCT selection** with network priors, ties broken by move order
//! - **Dirichlet noise** mixed into the root priors
//! - **No rollouts**: leaves are scored by the evaluator, terminal leaves by
//!   the game's reward
//! - **Fault tolerant**: a simulation whose evaluation fails is dropped
//!   without touching the tree
//!
//! ## Usage
//!
//! ```rust
//! use rust_cheche::games::{Game, TinyGame};
//! use rust_cheche::mcts::{MCTSConfig, MCTSSearch};
//! use rust_cheche::nn::UniformEvaluator;
//!
//! let game = TinyGame;
//! let board = game.create_board();
//! let mut search = MCTSSearch::new(game, MCTSConfig::default().with_simulations(50));
//!
//! let policy = search.search(&board, &[], &UniformEvaluator);
//! for (mv, p) in &policy {
//!     println!("{mv}: {:.2}%", p * 100.0);
//! }
//! ```
//!
//! ## Custom Policies
//!
//! ```rust,ignore
//! let search = MCTSSearch::new(game, config).with_selection(MySelection);
//! ```

pub mod config;
pub mod node;
pub mod policy;
pub mod search;
pub mod stats;
pub mod tree;

// Re-export main types
pub use config::MCTSConfig;
pub use node::{MCTSNode, NodeId};
pub use policy::{select_child, SelectionPolicy, PUCT};
pub use search::MCTSSearch;
pub use stats::SearchStats;
pub use tree::{MCTSTree, TreeStats};
