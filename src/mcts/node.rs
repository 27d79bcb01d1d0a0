//! MCTS node structure.
//!
//! Uses arena-based allocation with index references (NodeId). Each node
//! keeps its own board snapshot so a simulation never replays moves.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Index into the MCTSTree node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value representing no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Create a new node ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Check if this is the NONE sentinel.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Get the raw index value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            write!(f, "NodeId(NONE)")
        } else {
            write!(f, "NodeId({})", self.0)
        }
    }
}

/// A node in the MCTS tree.
///
/// `value` is the running mean of backed-up results, from the perspective
/// of the player who made `mv`, i.e. the player to move at the parent. It
/// stays within `[-1, 1]`.
#[derive(Clone, Debug)]
pub struct MCTSNode<B, M> {
    /// Parent node (NONE for root).
    pub parent: NodeId,

    /// Move that led here (None for root).
    pub mv: Option<M>,

    /// Position after `mv`.
    pub board: B,

    /// Total visits to this node.
    pub visits: u32,

    /// Mean of backed-up values.
    pub value: f64,

    /// Prior probability from the policy network.
    pub prior: f32,

    /// Children in insertion (legal move) order.
    /// SmallVec optimizes for small branching factors.
    pub children: SmallVec<[NodeId; 8]>,

    /// Depth in tree (root = 0).
    pub depth: u16,

    /// Is this a terminal game state?
    pub is_terminal: bool,

    /// Whether children have been generated.
    pub expanded: bool,
}

impl<B, M> MCTSNode<B, M> {
    /// Create a child node.
    pub fn new(parent: NodeId, mv: M, board: B, prior: f32, depth: u16) -> Self {
        Self {
            parent,
            mv: Some(mv),
            board,
            visits: 0,
            value: 0.0,
            prior,
            children: SmallVec::new(),
            depth,
            is_terminal: false,
            expanded: false,
        }
    }

    /// Create a root node.
    pub fn root(board: B) -> Self {
        Self {
            parent: NodeId::NONE,
            mv: None,
            board,
            visits: 0,
            value: 0.0,
            prior: 1.0,
            children: SmallVec::new(),
            depth: 0,
            is_terminal: false,
            expanded: false,
        }
    }

    /// Mean backed-up value, 0 when unvisited.
    #[inline]
    #[must_use]
    pub fn q_value(&self) -> f64 {
        self.value
    }

    /// Count one more visit and fold `value` into the running mean.
    pub fn record(&mut self, value: f64) {
        self.visits += 1;
        self.value += (value - self.value) / f64::from(self.visits);
    }

    /// Not yet expanded, or expanded without children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        !self.expanded || self.children.is_empty()
    }
}
