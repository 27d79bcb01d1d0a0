//! Neural network integration.
//!
//! ## Overview
//!
//! - **Traits**: `Evaluator` scores encoded positions for the search
//! - **Network**: `GameNet`, a residual trunk with a policy head per game
//!   kind and a shared value head, built on `burn`
//! - **Baseline**: `UniformEvaluator` for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rust_cheche::nn::{Evaluator, NetworkConfig, NetworkEvaluator};
//!
//! let evaluator = NetworkEvaluator::random(NetworkConfig::tiny());
//! let prediction = evaluator.evaluate(&encoded, GameKind::Chess)?;
//! ```

pub mod network;
pub mod traits;

// Re-export main types
pub use network::{
    batch_tensor, GameNet, InferenceBackend, NetworkConfig, NetworkEvaluator, TrainingBackend,
};
pub use traits::{EncodedState, Evaluator, Prediction, UniformEvaluator};
