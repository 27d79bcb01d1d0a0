//! Agents, matches and the generation loop.
//!
//! ## Overview
//!
//! - **Agent**: a network with its trainer, results and role record
//! - **Match**: one game with search-driven move selection, retries, a
//!   safe fallback move and reward backfilling
//! - **Competition**: plays matches between agents and keeps the history
//! - **LeagueManager**: the Champion/Alpha/Beta/Wildcard generation loop
//! - **hooks**: move logging, move validation and board observation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rust_cheche::core::{tracing_diagnostics, LeagueConfig};
//! use rust_cheche::league::LeagueManager;
//!
//! let mut league = LeagueManager::new(LeagueConfig::preset("fast")?, tracing_diagnostics())?;
//! let cancel = league.cancel_handle();
//! league.run(10);
//! println!("{:?}", league.training_summary());
//! ```

pub mod agent;
pub mod competition;
pub mod hooks;
pub mod manager;
pub mod matches;

// Re-export main types
pub use agent::{
    Agent, AgentRole, AgentSummary, BaselineScore, ChampionRecord, GameStats, PromotionRecord,
    Specialization, TraineeRecord, WildcardRecord,
};
pub use competition::{
    AgentRecord, Competition, EvaluationReport, KindResult, MatchRecord, MatchStatistics,
    PairingResult,
};
pub use hooks::{
    AcceptAllValidator, BoardObserver, GameEndRecord, MaterialValidator, MoveCheck, MoveLogger,
    MoveRecord, MoveValidator, NullMoveLogger, NullObserver, TracingMoveLogger, ValidationReport,
};
pub use manager::{
    Challenger, ChallengerResult, ChampionChange, GenerationReport, LeagueManager, TrainingStats,
    TrainingSummary,
};
pub use matches::{Match, MatchConfig, MatchOutcome, MatchPlayer, Termination};
