//! Collaborators a match reports to.
//!
//! Move logging, move validation and board observation sit outside the
//! training core. A match calls them synchronously and never lets them end
//! a game: logger failures go to diagnostics, a rejected move triggers the
//! retry chain, observers are fire-and-forget.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::games::{GameKind, Material};

/// One applied move.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub game_id: u64,
    pub game: GameKind,
    /// One-based.
    pub move_number: usize,
    pub agent: String,
    pub mv: String,
    pub board_before: String,
    pub board_after: String,
    pub thinking_time: Duration,
    pub captured: Vec<String>,
}

/// How a game ended, as reported to loggers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEndRecord {
    pub game_id: u64,
    pub game: GameKind,
    /// Winning agent's name, `None` for a draw or an undecided game.
    pub winner: Option<String>,
    pub total_moves: usize,
    pub duration: Duration,
    pub termination: String,
}

/// What a validator sees for one candidate move.
#[derive(Clone, Debug)]
pub struct MoveCheck<'a> {
    pub game: GameKind,
    pub mv: &'a str,
    pub board_before: &'a str,
    pub board_after: &'a str,
    pub material_before: Material,
    pub material_after: Material,
}

/// Verdict of a [`MoveValidator`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub violations: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn accept() -> Self {
        Self {
            valid: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub fn reject(violation: impl Into<String>) -> Self {
        Self {
            valid: false,
            violations: vec![violation.into()],
        }
    }

    /// Violations joined for a log line.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.violations.is_empty() {
            "no violations".to_string()
        } else {
            self.violations.join("; ")
        }
    }
}

/// Receives every move and game end.
pub trait MoveLogger: Send + Sync {
    fn log_move(&self, record: &MoveRecord) -> Result<(), String>;

    fn log_game_end(&self, record: &GameEndRecord) -> Result<(), String>;
}

/// Second opinion on a move that the rules engine already applied.
pub trait MoveValidator: Send + Sync {
    fn validate(&self, check: &MoveCheck<'_>) -> ValidationReport;
}

/// Live view of a game in progress. Must return promptly.
pub trait BoardObserver: Send + Sync {
    fn on_board(&self, board: &str, last_move: Option<&str>, thinking: Option<&str>);
}

/// Logs moves at `debug` and game ends at `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingMoveLogger;

impl MoveLogger for TracingMoveLogger {
    fn log_move(&self, record: &MoveRecord) -> Result<(), String> {
        debug!(
            game_id = record.game_id,
            game = %record.game,
            move_number = record.move_number,
            agent = %record.agent,
            mv = %record.mv,
            captured = record.captured.len(),
            thinking_ms = record.thinking_time.as_millis() as u64,
            "move"
        );
        Ok(())
    }

    fn log_game_end(&self, record: &GameEndRecord) -> Result<(), String> {
        info!(
            game_id = record.game_id,
            game = %record.game,
            winner = record.winner.as_deref().unwrap_or("draw"),
            moves = record.total_moves,
            duration_ms = record.duration.as_millis() as u64,
            termination = %record.termination,
            "game finished"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullMoveLogger;

impl MoveLogger for NullMoveLogger {
    fn log_move(&self, _record: &MoveRecord) -> Result<(), String> {
        Ok(())
    }

    fn log_game_end(&self, _record: &GameEndRecord) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAllValidator;

impl MoveValidator for AcceptAllValidator {
    fn validate(&self, _check: &MoveCheck<'_>) -> ValidationReport {
        ValidationReport::accept()
    }
}

/// Rejects moves that create material out of nothing.
///
/// The rules engines already check each transition; this catches a board
/// whose piece totals grew for either side.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialValidator;

impl MoveValidator for MaterialValidator {
    fn validate(&self, check: &MoveCheck<'_>) -> ValidationReport {
        let mut report = ValidationReport::accept();
        for side in 0..2 {
            let before = check.material_before.total(side);
            let after = check.material_after.total(side);
            if after > before {
                report.valid = false;
                report
                    .violations
                    .push(format!("side {side} grew from {before} to {after} pieces"));
            }
        }
        report
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl BoardObserver for NullObserver {
    fn on_board(&self, _board: &str, _last_move: Option<&str>, _thinking: Option<&str>) {}
}
