//! Arena-based MCTS tree.
//!
//! Uses a flat `Vec<MCTSNode>` with index-based references for efficiency
//! and cache-friendliness. The tree is rebuilt for every search.

use super::node::{MCTSNode, NodeId};

/// Arena-based MCTS tree.
///
/// Nodes are stored in a flat vector and referenced by `NodeId` indices.
/// This avoids reference counting overhead.
#[derive(Clone, Debug)]
pub struct MCTSTree<B, M> {
    /// All nodes in the tree.
    nodes: Vec<MCTSNode<B, M>>,

    /// The root node ID (always 0 after initialization).
    root: NodeId,
}

impl<B, M> MCTSTree<B, M> {
    /// Create a new tree with a root node.
    pub fn new(root_board: B) -> Self {
        Self::with_capacity(root_board, 256)
    }

    /// Create a tree with custom initial capacity.
    pub fn with_capacity(root_board: B, capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity.max(1));
        nodes.push(MCTSNode::root(root_board));
        Self {
            nodes,
            root: NodeId::new(0),
        }
    }

    /// Get the root node ID.
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get a node by ID.
    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> &MCTSNode<B, M> {
        &self.nodes[id.0 as usize]
    }

    /// Get a mutable node by ID.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut MCTSNode<B, M> {
        &mut self.nodes[id.0 as usize]
    }

    fn alloc(&mut self, node: MCTSNode<B, M>) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Allocate `node` and append it to `parent`'s children.
    pub fn add_child(&mut self, parent: NodeId, node: MCTSNode<B, M>) -> NodeId {
        let id = self.alloc(node);
        self.get_mut(parent).children.push(id);
        id
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tree is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of `id` with their nodes, in insertion order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &MCTSNode<B, M>)> {
        self.get(id).children.iter().map(move |&c| (c, self.get(c)))
    }

    /// Get statistics about the tree.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        let max_depth = self.nodes.iter().map(|n| n.depth).max().unwrap_or(0);
        let terminal_count = self.nodes.iter().filter(|n| n.is_terminal).count();
        let expanded_count = self.nodes.iter().filter(|n| n.expanded).count();
        let total_children: usize = self.nodes.iter().map(|n| n.children.len()).sum();

        TreeStats {
            node_count: self.nodes.len(),
            max_depth,
            terminal_count,
            expanded_count,
            total_children,
        }
    }

    /// Clear the tree and reset with a new root.
    pub fn reset(&mut self, root_board: B) {
        self.nodes.clear();
        self.nodes.push(MCTSNode::root(root_board));
        self.root = NodeId::new(0);
    }

    /// Get the root node.
    #[must_use]
    pub fn root_node(&self) -> &MCTSNode<B, M> {
        self.get(self.root)
    }

    /// Iterate over all nodes.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &MCTSNode<B, M>)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::new(i as u32), n))
    }
}

/// Statistics about the MCTS tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeStats {
    /// Total number of nodes.
    pub node_count: usize,

    /// Maximum depth reached.
    pub max_depth: u16,

    /// Number of terminal nodes.
    pub terminal_count: usize,

    /// Nodes whose children have been generated.
    pub expanded_count: usize,

    /// Sum of child counts over all nodes.
    pub total_children: usize,
}

impl TreeStats {
    /// Average children per expanded node.
    #[must_use]
    pub fn branching_factor(&self) -> f64 {
        if self.expanded_count == 0 {
            0.0
        } else {
            self.total_children as f64 / self.expanded_count as f64
        }
    }
}
