//! Matches between agents and the record of every game played.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::agent::Agent;
use super::matches::{Match, MatchConfig, MatchOutcome, MatchPlayer, Termination};
use crate::core::SharedDiagnostics;
use crate::games::{CheckersGame, ChessGame, Game, GameKind};
use crate::training::ReplayBuffer;

/// One finished game, as kept in the match history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub player1: String,
    pub player2: String,
    pub game: GameKind,
    pub winner: Option<String>,
    pub reward: f32,
    pub moves: usize,
    pub termination: Termination,
    pub retries: u32,
    pub fallbacks: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KindResult {
    pub wins: usize,
    pub games: usize,
}

/// Result of [`Competition::evaluate_agents`], from the first agent's side.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub wins: usize,
    pub games: usize,
    pub per_game: BTreeMap<GameKind, KindResult>,
}

impl EvaluationReport {
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        if self.games == 0 {
            0.0
        } else {
            self.wins as f64 / self.games as f64
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairingResult {
    pub player1: String,
    pub player2: String,
    pub rewards: Vec<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub wins: usize,
    pub games: usize,
}

/// Aggregates over the match history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStatistics {
    pub total_matches: usize,
    pub per_game: BTreeMap<GameKind, usize>,
    pub per_agent: BTreeMap<String, AgentRecord>,
    pub average_length: f64,
    pub abandoned: usize,
    pub total_retries: u64,
    pub total_fallbacks: u64,
}

/// Match records kept for inspection. Statistics cover every match.
pub const HISTORY_LIMIT: usize = 1_000;

pub struct Competition {
    runner: Match,
    chess: ChessGame,
    checkers: CheckersGame,
    history: VecDeque<MatchRecord>,
    history_limit: usize,
    stats: MatchStatistics,
    total_moves: usize,
}

impl Competition {
    pub fn new(config: MatchConfig, seed: u64, diagnostics: SharedDiagnostics) -> Self {
        Self::with_match(Match::new(config, seed).with_diagnostics(diagnostics))
    }

    /// Use a preconfigured match runner, e.g. one with custom hooks.
    pub fn with_match(runner: Match) -> Self {
        Self {
            runner,
            chess: ChessGame::new(),
            checkers: CheckersGame::new(),
            history: VecDeque::new(),
            history_limit: HISTORY_LIMIT,
            stats: MatchStatistics::default(),
            total_moves: 0,
        }
    }

    /// Keep at most `limit` recent records (at least one).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Replace the chess rules, e.g. to change draw shaping.
    pub fn with_chess(mut self, chess: ChessGame) -> Self {
        self.chess = chess;
        self
    }

    /// The most recent matches, oldest first.
    #[must_use]
    pub fn history(&self) -> &VecDeque<MatchRecord> {
        &self.history
    }

    /// Matches played since creation, including records already dropped
    /// from [`Competition::history`].
    #[must_use]
    pub fn matches_played(&self) -> usize {
        self.stats.total_matches
    }

    /// Play `a1` (moving first) against `a2` and update both agents.
    pub fn play_match(
        &mut self,
        a1: &mut Agent,
        a2: &mut Agent,
        kind: GameKind,
        buffer: Option<&mut ReplayBuffer>,
    ) -> MatchOutcome {
        match kind {
            GameKind::Chess => {
                let game = self.chess.clone();
                self.play_game(&game, a1, a2, buffer)
            }
            GameKind::Checkers => {
                let game = self.checkers;
                self.play_game(&game, a1, a2, buffer)
            }
        }
    }

    /// [`Competition::play_match`] for any game.
    pub fn play_game<G: Game + Clone>(
        &mut self,
        game: &G,
        a1: &mut Agent,
        a2: &mut Agent,
        buffer: Option<&mut ReplayBuffer>,
    ) -> MatchOutcome {
        let (e1, e2) = (a1.evaluator(), a2.evaluator());
        let outcome = self.run(
            game,
            MatchPlayer::new(a1.name(), &e1),
            MatchPlayer::new(a2.name(), &e2),
        );
        a1.record_game(game.kind(), outcome.reward);
        a2.record_game(game.kind(), -outcome.reward);
        if let Some(buffer) = buffer {
            buffer.extend(outcome.experiences.iter().cloned());
        }
        outcome
    }

    /// `agent` plays both sides. Its statistics get both results.
    pub fn play_self_match(
        &mut self,
        agent: &mut Agent,
        kind: GameKind,
        buffer: Option<&mut ReplayBuffer>,
    ) -> MatchOutcome {
        match kind {
            GameKind::Chess => {
                let game = self.chess.clone();
                self.play_self_game(&game, agent, buffer)
            }
            GameKind::Checkers => {
                let game = self.checkers;
                self.play_self_game(&game, agent, buffer)
            }
        }
    }

    /// [`Competition::play_self_match`] for any game.
    pub fn play_self_game<G: Game + Clone>(
        &mut self,
        game: &G,
        agent: &mut Agent,
        buffer: Option<&mut ReplayBuffer>,
    ) -> MatchOutcome {
        let evaluator = agent.evaluator();
        let player = MatchPlayer::new(agent.name(), &evaluator);
        let outcome = self.run(game, player, player);
        agent.record_game(game.kind(), outcome.reward);
        agent.record_game(game.kind(), -outcome.reward);
        if let Some(buffer) = buffer {
            buffer.extend(outcome.experiences.iter().cloned());
        }
        outcome
    }

    /// Play `num_games` per kind with `a` moving first and count `a`'s wins
    /// (positive reward). Agents, their statistics and the buffer are left
    /// alone.
    pub fn evaluate_agents(
        &mut self,
        a: &Agent,
        b: &Agent,
        kinds: &[GameKind],
        num_games: usize,
    ) -> EvaluationReport {
        let (ea, eb) = (a.evaluator(), b.evaluator());
        let pa = MatchPlayer::new(a.name(), &ea);
        let pb = MatchPlayer::new(b.name(), &eb);

        let mut report = EvaluationReport::default();
        for &kind in kinds {
            let mut result = KindResult::default();
            for _ in 0..num_games {
                let outcome = match kind {
                    GameKind::Chess => {
                        let game = self.chess.clone();
                        self.run(&game, pa, pb)
                    }
                    GameKind::Checkers => {
                        let game = self.checkers;
                        self.run(&game, pa, pb)
                    }
                };
                result.games += 1;
                if outcome.reward > 0.0 {
                    result.wins += 1;
                }
            }
            info!(
                player = a.name(),
                opponent = b.name(),
                game = %kind,
                wins = result.wins,
                games = result.games,
                "evaluation"
            );
            report.wins += result.wins;
            report.games += result.games;
            report.per_game.insert(kind, result);
        }
        report
    }

    /// Round robin: every ordered pair of distinct agents plays
    /// `games_per_pairing` games.
    pub fn play_tournament(
        &mut self,
        agents: &mut [Agent],
        kind: GameKind,
        games_per_pairing: usize,
        mut buffer: Option<&mut ReplayBuffer>,
    ) -> Vec<PairingResult> {
        let mut results = Vec::new();
        for i in 0..agents.len() {
            for j in 0..agents.len() {
                if i == j {
                    continue;
                }
                let (a1, a2) = pair_mut(agents, i, j);
                let mut rewards = Vec::with_capacity(games_per_pairing);
                for _ in 0..games_per_pairing {
                    let outcome = self.play_match(a1, a2, kind, buffer.as_deref_mut());
                    rewards.push(outcome.reward);
                }
                results.push(PairingResult {
                    player1: a1.name().to_string(),
                    player2: a2.name().to_string(),
                    rewards,
                });
            }
        }
        results
    }

    #[must_use]
    pub fn match_statistics(&self) -> MatchStatistics {
        let mut stats = self.stats.clone();
        if stats.total_matches > 0 {
            stats.average_length = self.total_moves as f64 / stats.total_matches as f64;
        }
        stats
    }

    fn record(&mut self, record: MatchRecord) {
        let stats = &mut self.stats;
        stats.total_matches += 1;
        *stats.per_game.entry(record.game).or_default() += 1;
        for name in [&record.player1, &record.player2] {
            let entry = stats.per_agent.entry(name.clone()).or_default();
            entry.games += 1;
            if record.winner.as_ref() == Some(name) {
                entry.wins += 1;
            }
        }
        if record.termination == Termination::Abandoned {
            stats.abandoned += 1;
        }
        stats.total_retries += u64::from(record.retries);
        stats.total_fallbacks += u64::from(record.fallbacks);
        self.total_moves += record.moves;

        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    fn run<G: Game + Clone>(
        &mut self,
        game: &G,
        p1: MatchPlayer<'_>,
        p2: MatchPlayer<'_>,
    ) -> MatchOutcome {
        let outcome = self.runner.play(game, p1, p2);
        debug!(
            game = %game.kind(),
            player1 = p1.name,
            player2 = p2.name,
            reward = outcome.reward,
            moves = outcome.moves,
            "match finished"
        );
        self.record(MatchRecord {
            player1: p1.name.to_string(),
            player2: p2.name.to_string(),
            game: game.kind(),
            winner: outcome.winner_name(p1.name, p2.name).map(str::to_string),
            reward: outcome.reward,
            moves: outcome.moves,
            termination: outcome.termination,
            retries: outcome.retries,
            fallbacks: outcome.fallbacks,
        });
        outcome
    }
}

fn pair_mut<T>(items: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    debug_assert!(i != j);
    if i < j {
        let (left, right) = items.split_at_mut(j);
        (&mut left[i], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(i);
        (&mut right[0], &mut left[j])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::NullDiagnostics;
    use crate::games::TinyGame;
    use crate::league::agent::Specialization;
    use crate::mcts::MCTSConfig;
    use crate::nn::NetworkConfig;

    fn competition() -> Competition {
        let config = MatchConfig::default()
            .with_max_moves(5)
            .with_mcts(MCTSConfig::default().with_simulations(4));
        Competition::new(config, 7, Arc::new(NullDiagnostics))
    }

    fn agent(name: &str) -> Agent {
        Agent::trainee(
            name,
            Specialization::Opening,
            NetworkConfig::tiny(),
            0.001,
            Arc::new(NullDiagnostics),
        )
    }

    #[test]
    fn test_play_game_updates_agents_and_buffer() {
        let mut competition = competition();
        let (mut a, mut b) = (agent("A"), agent("B"));
        let mut buffer = ReplayBuffer::new(100);

        let outcome = competition.play_game(&TinyGame, &mut a, &mut b, Some(&mut buffer));

        assert_eq!(buffer.len(), outcome.moves);
        assert_eq!(a.stats(GameKind::Checkers).games_played, 1);
        assert_eq!(b.stats(GameKind::Checkers).games_played, 1);
        assert_eq!(
            a.stats(GameKind::Checkers).total_reward,
            -b.stats(GameKind::Checkers).total_reward
        );
        assert_eq!(competition.history().len(), 1);
    }

    #[test]
    fn test_self_game_records_both_sides() {
        let mut competition = competition();
        let mut a = agent("A");

        let outcome = competition.play_self_game(&TinyGame, &mut a, None);

        let stats = a.stats(GameKind::Checkers);
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.total_reward, 0.0);
        assert!(outcome.experiences.iter().all(|e| e.actor == "A"));
    }

    #[test]
    fn test_match_statistics() {
        let mut competition = competition();
        assert_eq!(competition.match_statistics().total_matches, 0);

        let (mut a, mut b) = (agent("A"), agent("B"));
        for _ in 0..3 {
            competition.play_game(&TinyGame, &mut a, &mut b, None);
        }

        let stats = competition.match_statistics();
        assert_eq!(stats.total_matches, 3);
        assert_eq!(stats.per_game[&GameKind::Checkers], 3);
        assert_eq!(stats.per_agent["A"].games, 3);
        assert_eq!(
            stats.per_agent["A"].wins as u32,
            a.stats(GameKind::Checkers).wins
        );
        assert!(stats.average_length > 0.0 && stats.average_length <= 3.0);
    }

    #[test]
    fn test_history_window_keeps_totals() {
        let mut competition = competition().with_history_limit(2);
        let (mut a, mut b) = (agent("A"), agent("B"));
        let mut moves = Vec::new();
        for _ in 0..5 {
            moves.push(competition.play_game(&TinyGame, &mut a, &mut b, None).moves);
        }

        assert_eq!(competition.history().len(), 2);
        let kept: Vec<usize> = competition.history().iter().map(|r| r.moves).collect();
        assert_eq!(kept, moves[3..]);

        let stats = competition.match_statistics();
        assert_eq!(competition.matches_played(), 5);
        assert_eq!(stats.total_matches, 5);
        assert_eq!(stats.per_agent["B"].games, 5);
        let expected = moves.iter().sum::<usize>() as f64 / 5.0;
        assert!((stats.average_length - expected).abs() < 1e-12);
    }

    #[test]
    fn test_pair_mut() {
        let mut items = [1, 2, 3];
        let (x, y) = pair_mut(&mut items, 2, 0);
        std::mem::swap(x, y);
        assert_eq!(items, [3, 2, 1]);
    }
}
