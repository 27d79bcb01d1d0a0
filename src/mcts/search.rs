//! Core MCTS search algorithm.
//!
//! AlphaZero-style search: no rollouts. Leaves are scored by an
//! [`Evaluator`], whose policy also provides the priors for the new
//! children. The tree is rebuilt from scratch for every call to `search`.

use std::time::Instant;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::core::{tracing_diagnostics, GameRng, SharedDiagnostics};
use crate::games::{Game, HISTORY_LENGTH};
use crate::nn::{Evaluator, Prediction};

use super::config::MCTSConfig;
use super::node::{MCTSNode, NodeId};
use super::policy::{select_child, SelectionPolicy, PUCT};
use super::stats::SearchStats;
use super::tree::MCTSTree;

const COMPONENT: &str = "mcts";

/// Main MCTS search context.
///
/// Generic over the game. Owns the search tree and configuration, and
/// provides methods to run searches.
pub struct MCTSSearch<G: Game> {
    /// The game rules.
    game: G,

    /// Search configuration.
    config: MCTSConfig,

    /// The search tree.
    tree: MCTSTree<G::Board, G::Move>,

    /// RNG for root noise.
    rng: GameRng,

    /// Selection policy.
    selection: Box<dyn SelectionPolicy>,

    /// Sink for recovered faults.
    diagnostics: SharedDiagnostics,

    /// Search statistics.
    stats: SearchStats,
}

impl<G: Game> MCTSSearch<G> {
    /// Create a new MCTS search context.
    pub fn new(game: G, config: MCTSConfig) -> Self {
        let root = game.create_board();
        let rng = GameRng::new(config.seed);

        Self {
            game,
            config,
            tree: MCTSTree::new(root),
            rng,
            selection: Box::new(PUCT),
            diagnostics: tracing_diagnostics(),
            stats: SearchStats::default(),
        }
    }

    /// Set a custom selection policy.
    pub fn with_selection<S: SelectionPolicy + 'static>(mut self, selection: S) -> Self {
        self.selection = Box::new(selection);
        self
    }

    /// Route recovered faults to `diagnostics`.
    pub fn with_diagnostics(mut self, diagnostics: SharedDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    #[must_use]
    pub fn config(&self) -> &MCTSConfig {
        &self.config
    }

    /// Statistics of the last search.
    #[must_use]
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// The tree built by the last search.
    #[must_use]
    pub fn tree(&self) -> &MCTSTree<G::Board, G::Move> {
        &self.tree
    }

    /// Run `num_simulations` simulations from `board`.
    ///
    /// `history` holds the preceding positions, oldest first. Returns the
    /// visit distribution over the root's legal moves; empty when the root
    /// is terminal or has no moves.
    pub fn search(
        &mut self,
        board: &G::Board,
        history: &[G::Board],
        evaluator: &dyn Evaluator,
    ) -> FxHashMap<G::Move, f32> {
        let start = Instant::now();
        self.stats.reset();
        self.tree.reset(self.game.copy_board(board));

        let root = self.tree.root();
        let moves = self.game.legal_moves(board);
        if moves.is_empty() || self.game.is_game_over(board) {
            self.tree.get_mut(root).is_terminal = true;
            return FxHashMap::default();
        }

        let state = self.game.board_to_tensor(board, history);
        let prediction = match evaluator.evaluate(&state, self.game.kind()) {
            Ok(prediction) => Some(prediction),
            Err(err) => {
                self.diagnostics.warn(
                    COMPONENT,
                    &format!("root evaluation failed, using uniform priors: {err}"),
                );
                None
            }
        };

        let mut priors = self.priors(board, &moves, prediction.as_ref());
        if self.config.root_noise && self.config.dirichlet_epsilon > 0.0 {
            let eps = self.config.dirichlet_epsilon;
            let noise = self.rng.dirichlet(self.config.dirichlet_alpha, priors.len());
            for (p, n) in priors.iter_mut().zip(noise) {
                *p = (1.0 - eps) * *p + eps * n;
            }
        }
        self.expand(root, moves, &priors);

        for _ in 0..self.config.num_simulations {
            self.stats.iterations += 1;
            self.simulate(history, evaluator);
        }

        self.stats.time_us = start.elapsed().as_micros() as u64;
        debug!(
            simulations = self.stats.simulations,
            failure_rate = self.stats.failure_rate(),
            per_second = self.stats.simulations_per_second(),
            nodes = self.tree.len(),
            branching = self.tree.stats().branching_factor(),
            "search finished"
        );
        self.policy()
    }

    /// Visit share of each root child. Uniform if no child was visited.
    #[must_use]
    pub fn policy(&self) -> FxHashMap<G::Move, f32> {
        let visits = self.action_visits();
        if visits.is_empty() {
            return FxHashMap::default();
        }

        let total: u32 = visits.iter().map(|(_, v)| v).sum();
        let n = visits.len() as f32;
        visits
            .into_iter()
            .map(|(mv, v)| {
                let p = if total == 0 {
                    1.0 / n
                } else {
                    v as f32 / total as f32
                };
                (mv, p)
            })
            .collect()
    }

    /// Root moves with their visit counts, in legal-move order.
    #[must_use]
    pub fn action_visits(&self) -> Vec<(G::Move, u32)> {
        self.tree
            .children(self.tree.root())
            .filter_map(|(_, node)| node.mv.clone().map(|mv| (mv, node.visits)))
            .collect()
    }

    /// Most visited root move; the earliest wins ties.
    #[must_use]
    pub fn best_move(&self) -> Option<G::Move> {
        let mut best: Option<(G::Move, u32)> = None;
        for (mv, visits) in self.action_visits() {
            if best.as_ref().map_or(true, |(_, b)| visits > *b) {
                best = Some((mv, visits));
            }
        }
        best.map(|(mv, _)| mv)
    }

    /// One simulation: select to a leaf, evaluate or score it, back up.
    fn simulate(&mut self, root_history: &[G::Board], evaluator: &dyn Evaluator) {
        let mut current = self.tree.root();
        loop {
            let node = self.tree.get(current);
            if node.is_terminal || node.is_leaf() {
                break;
            }
            match select_child(&self.tree, current, self.selection.as_ref(), &self.config) {
                Some(child) => current = child,
                None => break,
            }
        }

        let leaf = self.tree.get(current);
        if leaf.is_terminal || (leaf.expanded && leaf.children.is_empty()) {
            let value = -f64::from(self.game.reward(&leaf.board));
            self.backup(current, value);
            return;
        }

        let moves = self.game.legal_moves(&leaf.board);
        if moves.is_empty() || self.game.is_game_over(&leaf.board) {
            let value = -f64::from(self.game.reward(&leaf.board));
            self.tree.get_mut(current).is_terminal = true;
            self.backup(current, value);
            return;
        }

        let history = self.leaf_history(current, root_history);
        let state = self.game.board_to_tensor(&leaf.board, &history);
        let prediction = match evaluator.evaluate(&state, self.game.kind()) {
            Ok(p) if p.value.is_finite() => p,
            Ok(_) => {
                self.fail("leaf evaluation returned a non-finite value");
                return;
            }
            Err(err) => {
                self.fail(&format!("leaf evaluation failed: {err}"));
                return;
            }
        };

        let priors = self.priors(&self.tree.get(current).board, &moves, Some(&prediction));
        self.expand(current, moves, &priors);
        self.backup(current, -f64::from(prediction.value));
    }

    fn fail(&mut self, message: &str) {
        self.stats.failed_simulations += 1;
        self.diagnostics.warn(COMPONENT, message);
    }

    /// Priors over `moves`: the policy gathered at each move's index and
    /// renormalized, or uniform if that is impossible.
    fn priors(
        &self,
        board: &G::Board,
        moves: &[G::Move],
        prediction: Option<&Prediction>,
    ) -> Vec<f32> {
        let uniform = vec![1.0 / moves.len().max(1) as f32; moves.len()];
        let Some(prediction) = prediction else {
            return uniform;
        };

        let raw: Vec<f32> = moves
            .iter()
            .map(|mv| {
                prediction
                    .policy
                    .get(self.game.move_index(board, mv))
                    .copied()
                    .filter(|p| p.is_finite() && *p >= 0.0)
                    .unwrap_or(0.0)
            })
            .collect();
        let total: f32 = raw.iter().sum();
        if total > 0.0 && total.is_finite() {
            raw.into_iter().map(|p| p / total).collect()
        } else {
            uniform
        }
    }

    /// Add one child per move that applies cleanly.
    fn expand(&mut self, id: NodeId, moves: Vec<G::Move>, priors: &[f32]) {
        let depth = self.tree.get(id).depth + 1;
        for (mv, &prior) in moves.into_iter().zip(priors) {
            let mut board = self.game.copy_board(&self.tree.get(id).board);
            if let Err(err) = self.game.make_move(&mut board, &mv) {
                self.diagnostics
                    .warn(COMPONENT, &format!("skipping child {mv}: {err}"));
                continue;
            }
            self.tree
                .add_child(id, MCTSNode::new(id, mv, board, prior, depth));
        }
        self.tree.get_mut(id).expanded = true;
        self.stats.nodes_expanded += 1;
        self.stats.max_depth = self.stats.max_depth.max(depth);
    }

    /// Add `value` (for the player who moved into `leaf`) along the path,
    /// flipping sign at each level.
    fn backup(&mut self, leaf: NodeId, value: f64) {
        let mut id = leaf;
        let mut value = value;
        loop {
            let node = self.tree.get_mut(id);
            node.record(value);
            if node.parent.is_none() {
                break;
            }
            id = node.parent;
            value = -value;
        }
        self.stats.simulations += 1;
    }

    /// Positions before `leaf`, oldest first, at most `HISTORY_LENGTH - 1`.
    fn leaf_history(&self, leaf: NodeId, root_history: &[G::Board]) -> Vec<G::Board> {
        let wanted = HISTORY_LENGTH - 1;
        let mut path = Vec::with_capacity(wanted);
        let mut id = self.tree.get(leaf).parent;
        while !id.is_none() && path.len() < wanted {
            let node = self.tree.get(id);
            path.push(node.board.clone());
            id = node.parent;
        }

        let missing = wanted - path.len();
        let mut history: Vec<G::Board> = root_history
            .iter()
            .skip(root_history.len().saturating_sub(missing))
            .cloned()
            .collect();
        history.extend(path.into_iter().rev());
        history
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{CapturingDiagnostics, EvaluationError};
    use crate::games::{GameKind, TinyGame, TinyMove};
    use crate::nn::{EncodedState, UniformEvaluator};

    struct FailingEvaluator;

    impl Evaluator for FailingEvaluator {
        fn evaluate(
            &self,
            _state: &EncodedState,
            _kind: GameKind,
        ) -> Result<Prediction, EvaluationError> {
            Err(EvaluationError::Backend("offline".to_string()))
        }
    }

    fn quiet_config(simulations: u32) -> MCTSConfig {
        MCTSConfig::default()
            .with_simulations(simulations)
            .with_root_noise(false)
    }

    #[test]
    fn test_policy_is_distribution_over_legal_moves() {
        let game = TinyGame;
        let board = game.create_board();
        let mut search = MCTSSearch::new(game, quiet_config(30));

        let policy = search.search(&board, &[], &UniformEvaluator);

        assert_eq!(policy.len(), 3);
        let sum: f32 = policy.values().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for mv in game.legal_moves(&board) {
            assert!(policy.contains_key(&mv));
        }
    }

    #[test]
    fn test_visit_counts_match_simulations() {
        let game = TinyGame;
        let board = game.create_board();
        let mut search = MCTSSearch::new(game, quiet_config(40));
        search.search(&board, &[], &UniformEvaluator);

        let stats = search.stats().clone();
        assert_eq!(stats.iterations, 40);
        assert_eq!(stats.simulations, 40);
        assert_eq!(search.tree().root_node().visits, 40);
        let child_visits: u32 = search.action_visits().iter().map(|(_, v)| v).sum();
        assert_eq!(child_visits, 40);
    }

    #[test]
    fn test_blocks_immediate_threat() {
        let game = TinyGame;
        let mut board = game.create_board();
        game.make_move(&mut board, &TinyMove(2)).unwrap();

        // Player -1 must take cell 3, otherwise player +1 wins next move.
        let mut search = MCTSSearch::new(game, quiet_config(100));
        let policy = search.search(&board, &[], &UniformEvaluator);

        assert!(policy[&TinyMove(3)] > policy[&TinyMove(1)]);
        assert_eq!(search.best_move(), Some(TinyMove(3)));
    }

    #[test]
    fn test_terminal_root_returns_empty() {
        let game = TinyGame;
        let mut board = game.create_board();
        for cell in [2, 1, 3] {
            game.make_move(&mut board, &TinyMove(cell)).unwrap();
        }

        let mut search = MCTSSearch::new(game, quiet_config(10));
        let policy = search.search(&board, &[], &UniformEvaluator);

        assert!(policy.is_empty());
        assert_eq!(search.stats().iterations, 0);
        assert!(search.best_move().is_none());
    }

    #[test]
    fn test_failed_evaluations_are_abandoned() {
        let game = TinyGame;
        let board = game.create_board();
        let diagnostics = Arc::new(CapturingDiagnostics::new());
        let mut search =
            MCTSSearch::new(game, quiet_config(5)).with_diagnostics(diagnostics.clone());

        let policy = search.search(&board, &[], &FailingEvaluator);

        // Root falls back to uniform priors, every leaf evaluation fails.
        assert_eq!(search.stats().failed_simulations, 5);
        assert_eq!(search.stats().simulations, 0);
        assert_eq!(search.tree().root_node().visits, 0);
        assert_eq!(policy.len(), 3);
        for p in policy.values() {
            assert!((p - 1.0 / 3.0).abs() < 1e-6);
        }
        assert_eq!(diagnostics.count(COMPONENT), 6);
    }

    #[test]
    fn test_root_noise_keeps_priors_normalized() {
        let game = TinyGame;
        let board = game.create_board();
        let config = MCTSConfig::default().with_simulations(1).with_seed(7);
        let mut search = MCTSSearch::new(game, config);
        search.search(&board, &[], &UniformEvaluator);

        let priors: f32 = search
            .tree()
            .children(search.tree().root())
            .map(|(_, n)| n.prior)
            .sum();
        assert!((priors - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_leaf_history_is_bounded() {
        let game = TinyGame;
        let board = game.create_board();
        let history = vec![board.clone(); 10];
        let mut search = MCTSSearch::new(game, quiet_config(20));
        search.search(&board, &history, &UniformEvaluator);

        for (id, _) in search.tree().iter() {
            assert!(search.leaf_history(id, &history).len() <= HISTORY_LENGTH - 1);
        }
    }
}
