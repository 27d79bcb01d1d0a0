//! Shared infrastructure: RNG, configuration, errors, diagnostics, retry.
//!
//! Nothing here knows about a particular game or network; every other
//! module builds on these pieces.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod retry;
pub mod rng;

pub use config::LeagueConfig;
pub use diagnostics::{
    tracing_diagnostics, CapturingDiagnostics, DiagnosticEvent, Diagnostics, NullDiagnostics,
    Severity, SharedDiagnostics, TracingDiagnostics,
};
pub use error::{
    CheckpointError, ConfigError, Error, EvaluationError, GameError, Result, TrainingError,
};
pub use retry::{retry, Backoff};
pub use rng::{GameRng, GameRngState};
