//! Child selection policies.
//!
//! Policies are trait-based to allow customization. The search only needs
//! a score per child; ties go to the child inserted first.

use super::config::MCTSConfig;
use super::node::{MCTSNode, NodeId};
use super::tree::MCTSTree;

// =============================================================================
// Selection Policy
// =============================================================================

/// Policy for scoring which child node to explore.
pub trait SelectionPolicy: Send + Sync {
    /// Score a child given its parent's visit count. Higher is better.
    ///
    /// `q` is the child's mean value from the parent's side to move.
    fn score(
        &self,
        parent_visits: u32,
        child_visits: u32,
        q: f64,
        prior: f32,
        config: &MCTSConfig,
    ) -> f64;
}

/// PUCT selection policy (Predictor + UCB for Trees).
///
/// Uses prior probabilities from a policy network.
/// Formula: Q(a) + c * P(a) * sqrt(N) / (1 + n(a))
#[derive(Clone, Debug, Default)]
pub struct PUCT;

impl SelectionPolicy for PUCT {
    fn score(
        &self,
        parent_visits: u32,
        child_visits: u32,
        q: f64,
        prior: f32,
        config: &MCTSConfig,
    ) -> f64 {
        let sqrt_parent = f64::from(parent_visits.max(1)).sqrt();
        q + config.c_puct * f64::from(prior) * sqrt_parent / (1.0 + f64::from(child_visits))
    }
}

/// Pick the best-scoring child of `id`, or `None` if it has no children.
pub fn select_child<B, M>(
    tree: &MCTSTree<B, M>,
    id: NodeId,
    policy: &dyn SelectionPolicy,
    config: &MCTSConfig,
) -> Option<NodeId> {
    let parent: &MCTSNode<B, M> = tree.get(id);
    let mut best: Option<(NodeId, f64)> = None;

    for (child_id, child) in tree.children(id) {
        let score = policy.score(parent.visits, child.visits, child.q_value(), child.prior, config);
        // Strict comparison keeps the earliest child on ties.
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((child_id, score));
        }
    }
    best.map(|(id, _)| id)
}
