//! A single game between two players.
//!
//! Each move runs a fresh search for the side to move, samples a move from
//! the visit counts, and checks it on a scratch board before committing:
//! the rules engine must accept it and the [`MoveValidator`] must agree.
//! A rejected candidate is retried with a new search; after `max_retries`
//! the first legal move that passes both checks is played instead. Only a
//! position with no acceptable move at all abandons the game.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::hooks::{
    AcceptAllValidator, BoardObserver, GameEndRecord, MoveCheck, MoveLogger, MoveRecord,
    MoveValidator, NullObserver, TracingMoveLogger,
};
use crate::core::{retry, tracing_diagnostics, Backoff, GameRng, LeagueConfig, SharedDiagnostics};
use crate::games::{Game, HISTORY_LENGTH};
use crate::mcts::{MCTSConfig, MCTSSearch};
use crate::nn::Evaluator;
use crate::training::Experience;

const COMPONENT: &str = "match";

/// Per-match settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Moves after which the game ends undecided.
    pub max_moves: usize,
    /// Move-selection attempts before the safe fallback.
    pub max_retries: u32,
    /// Probability of a uniformly random legal move instead of a sampled one.
    pub exploration_rate: f64,
    pub mcts: MCTSConfig,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_moves: 200,
            max_retries: 3,
            exploration_rate: 0.1,
            mcts: MCTSConfig::default(),
        }
    }
}

impl From<&LeagueConfig> for MatchConfig {
    fn from(config: &LeagueConfig) -> Self {
        Self {
            max_moves: config.max_moves_per_game,
            max_retries: config.max_move_retries,
            exploration_rate: config.exploration_rate,
            mcts: config.mcts.clone().with_simulations(config.mcts_simulations),
        }
    }
}

impl MatchConfig {
    pub fn with_max_moves(mut self, max_moves: usize) -> Self {
        self.max_moves = max_moves;
        self
    }

    pub fn with_exploration_rate(mut self, rate: f64) -> Self {
        self.exploration_rate = rate;
        self
    }

    pub fn with_mcts(mut self, mcts: MCTSConfig) -> Self {
        self.mcts = mcts;
        self
    }
}

/// One side of a match.
#[derive(Clone, Copy)]
pub struct MatchPlayer<'a> {
    pub name: &'a str,
    pub evaluator: &'a dyn Evaluator,
}

impl<'a> MatchPlayer<'a> {
    pub fn new(name: &'a str, evaluator: &'a dyn Evaluator) -> Self {
        Self { name, evaluator }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The game reached a terminal position.
    Normal,
    /// The move limit was hit first.
    MaxMoves,
    /// No acceptable move could be produced.
    Abandoned,
}

impl Termination {
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Termination::Normal => "normal completion",
            Termination::MaxMoves => "max moves reached",
            Termination::Abandoned => "abandoned",
        }
    }
}

/// Result of [`Match::play`].
#[derive(Clone, Debug)]
pub struct MatchOutcome {
    pub game_id: u64,
    /// `+1` or `-1` for a decisive game, `0` otherwise.
    pub winner: i8,
    /// Final reward from player one's perspective.
    pub reward: f32,
    pub moves: usize,
    pub termination: Termination,
    /// One per move played, rewards filled in.
    pub experiences: Vec<Experience>,
    pub duration: Duration,
    /// Failed move-selection attempts that were retried.
    pub retries: u32,
    /// Moves that came from the safe fallback.
    pub fallbacks: u32,
}

impl MatchOutcome {
    /// Name of the player with positive reward, if any.
    #[must_use]
    pub fn winner_name<'a>(&self, player1: &'a str, player2: &'a str) -> Option<&'a str> {
        if self.reward > 0.0 {
            Some(player1)
        } else if self.reward < 0.0 {
            Some(player2)
        } else {
            None
        }
    }
}

/// A move that passed both checks, with the board it produces.
struct Candidate<B, M> {
    mv: M,
    after: B,
    policy: Vec<(usize, f32)>,
}

/// Plays matches. Holds the hooks and the random stream shared across games.
pub struct Match {
    config: MatchConfig,
    rng: GameRng,
    logger: Arc<dyn MoveLogger>,
    validator: Arc<dyn MoveValidator>,
    observer: Arc<dyn BoardObserver>,
    diagnostics: SharedDiagnostics,
    games_played: u64,
}

impl Match {
    pub fn new(config: MatchConfig, seed: u64) -> Self {
        Self {
            config,
            rng: GameRng::new(seed),
            logger: Arc::new(TracingMoveLogger),
            validator: Arc::new(AcceptAllValidator),
            observer: Arc::new(NullObserver),
            diagnostics: tracing_diagnostics(),
            games_played: 0,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn MoveLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn MoveValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn BoardObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: SharedDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    #[must_use]
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Play one game. `player1` moves first.
    pub fn play<G>(&mut self, game: &G, player1: MatchPlayer<'_>, player2: MatchPlayer<'_>) -> MatchOutcome
    where
        G: Game + Clone,
    {
        let start = Instant::now();
        self.games_played += 1;
        let game_id = self.games_played;

        let mut board = game.create_board();
        let mut history: Vec<G::Board> = Vec::new();
        let mut experiences = Vec::new();
        let mut sides = Vec::new();
        let mut retries = 0;
        let mut fallbacks = 0;
        let mut moves = 0;
        let mut abandoned = false;

        while !game.is_game_over(&board) && moves < self.config.max_moves {
            let side = game.current_player(&board);
            let player = if side == 1 { player1 } else { player2 };

            if game.legal_moves(&board).is_empty() {
                self.diagnostics.warn(
                    COMPONENT,
                    &format!("game {game_id}: no legal move for {} at move {}", player.name, moves + 1),
                );
                abandoned = true;
                break;
            }

            let board_text = game.board_string(&board);
            let thinking = format!("{} thinking", player.name);
            self.observer.on_board(&board_text, None, Some(&thinking));

            let think_start = Instant::now();
            let recent = &history[history.len().saturating_sub(HISTORY_LENGTH - 1)..];
            let candidate = match self.select(game, &board, recent, player, &mut retries) {
                Some(candidate) => candidate,
                None => match self.fallback(game, &board) {
                    Some(candidate) => {
                        fallbacks += 1;
                        candidate
                    }
                    None => {
                        self.diagnostics.error(
                            COMPONENT,
                            &format!("game {game_id}: no acceptable move for {}, abandoning", player.name),
                        );
                        abandoned = true;
                        break;
                    }
                },
            };
            let thinking_time = think_start.elapsed();

            let state = game.board_to_tensor(&board, recent);
            experiences.push(Experience::new(state, candidate.policy, player.name, game.kind()));
            sides.push(side);

            moves += 1;
            let mv_text = candidate.mv.to_string();
            let after_text = game.board_string(&candidate.after);
            let record = MoveRecord {
                game_id,
                game: game.kind(),
                move_number: moves,
                agent: player.name.to_string(),
                mv: mv_text.clone(),
                board_before: board_text,
                board_after: after_text.clone(),
                thinking_time,
                captured: game.captured_pieces(&board, &candidate.mv),
            };
            if let Err(err) = self.logger.log_move(&record) {
                self.diagnostics
                    .warn(COMPONENT, &format!("game {game_id}: move logger failed: {err}"));
            }

            history.push(std::mem::replace(&mut board, candidate.after));
            self.observer.on_board(&after_text, Some(&mv_text), None);
            debug!(game_id, move_number = moves, agent = player.name, mv = %mv_text, "played");
        }

        let termination = if abandoned {
            Termination::Abandoned
        } else if game.is_game_over(&board) {
            Termination::Normal
        } else {
            Termination::MaxMoves
        };
        let (winner, reward) = match termination {
            Termination::Abandoned => (0, 0.0),
            Termination::Normal => (game.winner(&board), game.first_player_reward(&board)),
            Termination::MaxMoves => (0, game.first_player_reward(&board)),
        };
        let reward = reward.clamp(-1.0, 1.0);

        for (experience, side) in experiences.iter_mut().zip(&sides) {
            experience.reward = Some(reward * f32::from(*side));
        }

        let outcome = MatchOutcome {
            game_id,
            winner,
            reward,
            moves,
            termination,
            experiences,
            duration: start.elapsed(),
            retries,
            fallbacks,
        };

        let end = GameEndRecord {
            game_id,
            game: game.kind(),
            winner: outcome
                .winner_name(player1.name, player2.name)
                .map(str::to_string),
            total_moves: moves,
            duration: outcome.duration,
            termination: termination.describe().to_string(),
        };
        if let Err(err) = self.logger.log_game_end(&end) {
            self.diagnostics
                .warn(COMPONENT, &format!("game {game_id}: move logger failed: {err}"));
        }
        outcome
    }

    /// Search and sample, retrying rejected candidates.
    fn select<G>(
        &mut self,
        game: &G,
        board: &G::Board,
        history: &[G::Board],
        player: MatchPlayer<'_>,
        retries: &mut u32,
    ) -> Option<Candidate<G::Board, G::Move>>
    where
        G: Game + Clone,
    {
        let max_retries = self.config.max_retries;
        let result = retry(
            |attempt| {
                if attempt > 0 {
                    *retries += 1;
                }
                self.attempt(game, board, history, player)
            },
            max_retries,
            Backoff::None,
        );
        match result {
            Ok(candidate) => Some(candidate),
            Err(reason) => {
                self.diagnostics.warn(
                    COMPONENT,
                    &format!(
                        "{} failed to produce a move after {max_retries} attempts: {reason}",
                        player.name
                    ),
                );
                None
            }
        }
    }

    fn attempt<G>(
        &mut self,
        game: &G,
        board: &G::Board,
        history: &[G::Board],
        player: MatchPlayer<'_>,
    ) -> Result<Candidate<G::Board, G::Move>, String>
    where
        G: Game + Clone,
    {
        let seed = self.rng.fork().seed();
        let mut search = MCTSSearch::new(game.clone(), self.config.mcts.clone().with_seed(seed))
            .with_diagnostics(self.diagnostics.clone());
        search.search(board, history, player.evaluator);
        let visits = search.action_visits();
        if visits.is_empty() {
            return Err("search produced no moves".to_string());
        }

        let total: u32 = visits.iter().map(|(_, n)| n).sum();
        let policy: Vec<(usize, f32)> = visits
            .iter()
            .map(|(mv, n)| {
                let p = if total == 0 {
                    1.0 / visits.len() as f32
                } else {
                    *n as f32 / total as f32
                };
                (game.move_index(board, mv), p)
            })
            .collect();

        let index = if self.rng.gen_bool(self.config.exploration_rate) {
            self.rng.gen_range_usize(0..visits.len())
        } else {
            let weights: Vec<f32> = visits.iter().map(|(_, n)| *n as f32).collect();
            self.rng
                .choose_weighted(&weights)
                .unwrap_or_else(|| self.rng.gen_range_usize(0..visits.len()))
        };
        let mv = visits[index].0.clone();

        let after = self.check(game, board, &mv)?;
        Ok(Candidate { mv, after, policy })
    }

    /// First legal move that applies and validates, with a one-hot policy.
    fn fallback<G: Game>(&self, game: &G, board: &G::Board) -> Option<Candidate<G::Board, G::Move>> {
        game.legal_moves(board).into_iter().find_map(|mv| {
            let after = self.check(game, board, &mv).ok()?;
            let policy = vec![(game.move_index(board, &mv), 1.0)];
            Some(Candidate { mv, after, policy })
        })
    }

    /// Apply `mv` to a copy and run the validator on the transition.
    fn check<G: Game>(&self, game: &G, board: &G::Board, mv: &G::Move) -> Result<G::Board, String> {
        let mut after = game.copy_board(board);
        game.make_move(&mut after, mv).map_err(|e| e.to_string())?;

        let mv_text = mv.to_string();
        let before_text = game.board_string(board);
        let after_text = game.board_string(&after);
        let report = self.validator.validate(&MoveCheck {
            game: game.kind(),
            mv: &mv_text,
            board_before: &before_text,
            board_after: &after_text,
            material_before: game.material(board),
            material_after: game.material(&after),
        });
        if report.valid {
            Ok(after)
        } else {
            Err(format!("validator rejected {mv_text}: {}", report.summary()))
        }
    }
}
