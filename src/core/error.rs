//! Error taxonomy.
//!
//! Every fallible boundary returns one of these enums. Errors local to one
//! simulation, one move or one training step are recovered by the caller
//! with a fallback value and a diagnostics event; only checkpoint loads
//! requested at startup and configuration errors reach the binary.

use std::path::PathBuf;

use thiserror::Error;

/// Rule-engine errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GameError {
    /// A move is not legal here, or its application failed validation.
    #[error("illegal move {mv}: {reason}")]
    IllegalMove { mv: String, reason: String },

    /// The side to move has no legal move although the game is not over.
    #[error("no legal move available")]
    NoLegalMove,

    /// Post-move board validation failed.
    #[error("board validation failed: {0}")]
    Validation(String),
}

impl GameError {
    /// Shorthand for [`GameError::IllegalMove`].
    pub fn illegal(mv: impl ToString, reason: impl Into<String>) -> Self {
        Self::IllegalMove {
            mv: mv.to_string(),
            reason: reason.into(),
        }
    }
}

/// Network inference errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    #[error("input shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("network produced a non-finite output")]
    NonFinite,

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Training step errors. Always recovered by discarding the step.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrainingError {
    #[error("empty batch")]
    EmptyBatch,

    #[error("batch contains {found} experience for a {expected} step")]
    MixedGameKinds { expected: String, found: String },

    #[error("experience {index} has no reward")]
    MissingReward { index: usize },

    #[error("experience {index} has a malformed policy target: {reason}")]
    MalformedPolicy { index: usize, reason: String },

    #[error("experience {index} has state length {actual}, expected {expected}")]
    ShapeMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("loss is not finite")]
    NonFiniteLoss,

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Checkpoint persistence errors.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint metadata: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("checkpoint encoding: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("model record: {0}")]
    Record(String),

    #[error("checkpoint not found: {0}")]
    Missing(PathBuf),
}

impl CheckpointError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("unknown preset `{0}`")]
    UnknownPreset(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_move_message() {
        let err = GameError::illegal("e2e5", "not in legal move list");
        assert_eq!(err.to_string(), "illegal move e2e5: not in legal move list");
    }

    #[test]
    fn test_conversion_into_crate_error() {
        let err: Error = TrainingError::EmptyBatch.into();
        assert!(matches!(err, Error::Training(TrainingError::EmptyBatch)));
        assert_eq!(err.to_string(), "empty batch");
    }

    #[test]
    fn test_checkpoint_io_keeps_path() {
        let err = CheckpointError::io(
            "ckpt/champion_gen_1",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("ckpt/champion_gen_1"));
    }
}
