//! Experience storage and network training.
//!
//! ## Overview
//!
//! - **Experience**: one encoded position with its search policy and, once
//!   the game ends, its reward
//! - **ReplayBuffer**: FIFO store sampled uniformly for training batches
//! - **TrainingManager**: owns a network and optimizer, runs gradient steps
//!   and saves checkpoints
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rust_cheche::training::{ReplayBuffer, TrainingManager};
//!
//! let mut buffer = ReplayBuffer::new(10_000);
//! buffer.extend(outcome.experiences);
//!
//! let batch = buffer.sample(64, &mut rng);
//! let report = trainer.train_step(&batch, GameKind::Chess);
//! ```

pub mod manager;
pub mod replay_buffer;

// Re-export main types
pub use manager::{BatchEvaluation, LossReport, ModelInfo, TrainingManager};
pub use replay_buffer::{BufferQuality, BufferStats, Experience, ReplayBuffer, REWARD_BINS};
