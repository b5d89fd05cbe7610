//! ConversationGraph: the canonical node/edge forest of one project.
//!
//! [`ConversationGraph`] is the single entry point for building and querying
//! a conversation. The underlying `StableGraph` is private; every mutation
//! goes through a method here so the forest invariant (each node has at most
//! one parent, no cycles) can be enforced in one place.
//!
//! # Failure model
//!
//! Operations that reference a missing node, or that are not allowed right
//! now (branching from a node that is still generating), return `None`,
//! `false` or an empty list and leave the graph untouched. Only
//! [`ConversationGraph::connect`] can be asked to do something structurally
//! invalid; it rejects the call with [`CoreError::StructuralViolation`].
//!
//! In debug builds every mutation ends with a full forest check that panics
//! on violation.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{EdgeId, NodeId};
use crate::layout::{self, zigzag_offset, CHILD_V_GAP, ROOT_GAP, SIBLING_GAP};
use crate::node::{ChatEdge, ChatNode, NodeKind, Position, Size};

/// Plain-data copy of a graph, as persisted and as kept in undo history.
///
/// Nodes are in creation order; edges are ordered by their target node.
/// Canvas interaction flags are always cleared.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<ChatNode>,
    pub edges: Vec<ChatEdge>,
}

/// The conversation forest of a single project.
#[derive(Debug, Clone, Default)]
pub struct ConversationGraph {
    /// Node weights are the messages, edge weights their stable ids.
    tree: StableGraph<ChatNode, EdgeId, Directed, u32>,
    /// NodeId -> petgraph index
    node_index: HashMap<NodeId, NodeIndex<u32>>,
    /// EdgeId -> petgraph index
    edge_index: HashMap<EdgeId, EdgeIndex<u32>>,
    /// Largest `created_at` handed out or loaded so far.
    last_created_at: i64,
}

impl ConversationGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a graph from a snapshot.
    ///
    /// Duplicate nodes and edges that would break the forest invariant (or
    /// that reference missing nodes) are skipped; each skipped entry is
    /// reported in the returned error list.
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> (Self, Vec<CoreError>) {
        let mut graph = ConversationGraph::new();
        let mut problems = Vec::new();

        for node in &snapshot.nodes {
            if graph.node_index.contains_key(&node.id) {
                problems.push(CoreError::DuplicateNode { id: node.id });
                continue;
            }
            graph.insert_node(node.without_ui_flags());
        }

        for edge in &snapshot.edges {
            if graph.edge_index.contains_key(&edge.id) {
                problems.push(CoreError::DuplicateEdge { id: edge.id });
                continue;
            }
            if let Err(err) = graph.link(edge.id, edge.source_id, edge.target_id) {
                problems.push(err);
            }
        }

        #[cfg(debug_assertions)]
        graph.assert_forest();

        (graph, problems)
    }

    /// Replaces the whole graph with the contents of `snapshot`.
    ///
    /// The creation clock never moves backwards, so nodes created after a
    /// restore still sort after everything that existed before it.
    pub fn restore(&mut self, snapshot: &GraphSnapshot) -> Vec<CoreError> {
        let (restored, problems) = Self::from_snapshot(snapshot);
        let clock = self.last_created_at.max(restored.last_created_at);
        *self = restored;
        self.last_created_at = clock;
        problems
    }

    /// Returns a snapshot of the current graph without UI flags.
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .nodes()
            .into_iter()
            .map(ChatNode::without_ui_flags)
            .collect();
        GraphSnapshot {
            nodes,
            edges: self.edges(),
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn get(&self, id: &NodeId) -> Option<&ChatNode> {
        self.node_index
            .get(id)
            .and_then(|&idx| self.tree.node_weight(idx))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.tree.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.tree.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.node_count() == 0
    }

    /// All nodes, oldest first.
    pub fn nodes(&self) -> Vec<&ChatNode> {
        let mut nodes: Vec<&ChatNode> = self.tree.node_weights().collect();
        nodes.sort_by_key(|n| (n.created_at, n.id));
        nodes
    }

    /// All edges, ordered by the creation order of their target node.
    pub fn edges(&self) -> Vec<ChatEdge> {
        let mut edges: Vec<(i64, ChatEdge)> = self
            .edge_index
            .iter()
            .filter_map(|(&id, &eidx)| {
                let (source, target) = self.tree.edge_endpoints(eidx)?;
                let target_node = &self.tree[target];
                Some((
                    target_node.created_at,
                    ChatEdge {
                        id,
                        source_id: self.tree[source].id,
                        target_id: target_node.id,
                    },
                ))
            })
            .collect();
        edges.sort_by_key(|(created, e)| (*created, e.target_id));
        edges.into_iter().map(|(_, e)| e).collect()
    }

    /// The parent of `id`, if it has one.
    pub fn parent_of(&self, id: &NodeId) -> Option<NodeId> {
        let idx = *self.node_index.get(id)?;
        self.tree
            .neighbors_directed(idx, Direction::Incoming)
            .next()
            .map(|p| self.tree[p].id)
    }

    /// The incoming edge of `id`, if it has one.
    pub fn parent_edge(&self, id: &NodeId) -> Option<ChatEdge> {
        let idx = *self.node_index.get(id)?;
        self.tree
            .edges_directed(idx, Direction::Incoming)
            .next()
            .map(|e| ChatEdge {
                id: *e.weight(),
                source_id: self.tree[e.source()].id,
                target_id: self.tree[e.target()].id,
            })
    }

    /// Direct children of `id`, oldest first.
    pub fn children_of(&self, id: &NodeId) -> Vec<NodeId> {
        let Some(&idx) = self.node_index.get(id) else {
            return Vec::new();
        };
        self.sorted_ids(self.tree.neighbors_directed(idx, Direction::Outgoing))
    }

    /// Nodes without a parent, oldest first.
    pub fn roots(&self) -> Vec<NodeId> {
        let roots = self.tree.node_indices().filter(|&idx| {
            self.tree
                .neighbors_directed(idx, Direction::Incoming)
                .next()
                .is_none()
        });
        self.sorted_ids(roots)
    }

    /// Every node reachable from `id` via outgoing edges, excluding `id`.
    pub fn descendants(&self, id: &NodeId) -> Vec<NodeId> {
        let Some(&start) = self.node_index.get(id) else {
            return Vec::new();
        };
        let mut dfs = Dfs::new(&self.tree, start);
        let mut found = Vec::new();
        while let Some(idx) = dfs.next(&self.tree) {
            if idx != start {
                found.push(idx);
            }
        }
        self.sorted_ids(found)
    }

    /// The chain root→`id` inclusive. Empty if `id` is unknown.
    pub fn ancestor_chain(&self, id: &NodeId) -> Vec<NodeId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut chain = vec![*id];
        let mut current = *id;
        while let Some(parent) = self.parent_of(&current) {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    // -----------------------------------------------------------------------
    // Structural mutations
    // -----------------------------------------------------------------------

    /// Starts a new, disconnected tree to the right of everything on the
    /// canvas.
    pub fn add_root(&mut self, kind: NodeKind, text: impl Into<String>) -> ChatNode {
        let x = self
            .tree
            .node_weights()
            .map(|n| n.position.x + n.size.width + ROOT_GAP)
            .fold(0.0_f64, f64::max);
        let created_at = self.next_created_at();
        let node = ChatNode::new(kind, text, created_at, Position::new(x, 0.0));
        self.insert_node(node.clone());

        #[cfg(debug_assertions)]
        self.assert_forest();

        node
    }

    /// Branches a new, empty node of `kind` off `parent`.
    ///
    /// A branch with the parent's own role becomes a sibling (it hangs off
    /// the parent's parent, or becomes a new root); any other role becomes a
    /// child. Returns `None` if the parent is missing or still generating.
    pub fn add_branch(&mut self, parent: &NodeId, kind: NodeKind) -> Option<ChatNode> {
        let parent_node = self.branchable(parent)?.clone();

        if kind != parent_node.kind {
            return Some(self.spawn_child(*parent, kind, false));
        }

        let position = Position::new(
            parent_node.position.x + parent_node.size.width + SIBLING_GAP,
            parent_node.position.y,
        );
        let created_at = self.next_created_at();
        let node = ChatNode::new(kind, "", created_at, position);
        let idx = self.insert_node(node.clone());
        if let Some(grandparent) = self.parent_of(parent) {
            let gp_idx = self.node_index[&grandparent];
            self.insert_edge(EdgeId::new(), gp_idx, idx);
        }

        #[cfg(debug_assertions)]
        self.assert_forest();

        Some(node)
    }

    /// Adds an assistant reply under `parent`, marked as generating.
    ///
    /// Returns `None` if the parent is missing or still generating. The
    /// caller is responsible for building the prompt context and queueing
    /// the generation.
    pub fn add_assistant_child(&mut self, parent: &NodeId) -> Option<ChatNode> {
        self.branchable(parent)?;
        Some(self.spawn_child(*parent, NodeKind::Assistant, true))
    }

    /// Links `child` under `parent`.
    ///
    /// Rejected (graph unchanged) if either node is missing, if `child`
    /// already has a parent, or if the link would close a cycle.
    pub fn connect(&mut self, parent: &NodeId, child: &NodeId) -> Result<EdgeId, CoreError> {
        let id = EdgeId::new();
        self.link(id, *parent, *child)?;

        #[cfg(debug_assertions)]
        self.assert_forest();

        Ok(id)
    }

    /// Removes exactly `id` and its edges. Its children become roots.
    ///
    /// Returns the removed ids (empty if `id` was unknown).
    pub fn delete_node_only(&mut self, id: &NodeId) -> Vec<NodeId> {
        let Some(&idx) = self.node_index.get(id) else {
            return Vec::new();
        };
        self.remove_indices(&[idx])
    }

    /// Removes `id` together with all of its descendants.
    ///
    /// Returns the removed ids (empty if `id` was unknown).
    pub fn delete_subtree(&mut self, id: &NodeId) -> Vec<NodeId> {
        let Some(&start) = self.node_index.get(id) else {
            return Vec::new();
        };
        let mut dfs = Dfs::new(&self.tree, start);
        let mut doomed = Vec::new();
        while let Some(idx) = dfs.next(&self.tree) {
            doomed.push(idx);
        }
        self.remove_indices(&doomed)
    }

    /// Removes isolated nodes (no parent, no children).
    ///
    /// Generating nodes are kept, and so is a lone node that makes up the
    /// whole graph.
    pub fn remove_orphans(&mut self) -> Vec<NodeId> {
        if self.tree.node_count() <= 1 {
            return Vec::new();
        }
        let orphans: Vec<NodeIndex<u32>> = self
            .tree
            .node_indices()
            .filter(|&idx| {
                !self.tree[idx].is_generating
                    && self
                        .tree
                        .neighbors_undirected(idx)
                        .next()
                        .is_none()
            })
            .collect();
        self.remove_indices(&orphans)
    }

    /// Removes blank leaf nodes until none are left.
    ///
    /// Blank interior nodes survive so no subtree is ever disconnected.
    pub fn remove_empty_nodes(&mut self) -> Vec<NodeId> {
        let mut removed = Vec::new();
        loop {
            let leaves: Vec<NodeIndex<u32>> = self
                .tree
                .node_indices()
                .filter(|&idx| {
                    let node = &self.tree[idx];
                    node.is_blank()
                        && !node.is_generating
                        && self
                            .tree
                            .neighbors_directed(idx, Direction::Outgoing)
                            .next()
                            .is_none()
                })
                .collect();
            if leaves.is_empty() {
                break;
            }
            removed.extend(self.remove_indices(&leaves));
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Field updates (no structural change)
    // -----------------------------------------------------------------------

    /// Replaces the text of a node. Returns false if the node is unknown.
    pub fn update_text(&mut self, id: &NodeId, text: impl Into<String>) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.text = text.into();
                true
            }
            None => false,
        }
    }

    pub fn set_generating(&mut self, id: &NodeId, generating: bool) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.is_generating = generating;
                true
            }
            None => false,
        }
    }

    pub fn set_position(&mut self, id: &NodeId, position: Position) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    pub fn set_size(&mut self, id: &NodeId, size: Size) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.size = size;
                true
            }
            None => false,
        }
    }

    pub fn set_selected(&mut self, id: &NodeId, selected: bool) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.ui.selected = selected;
                true
            }
            None => false,
        }
    }

    pub fn set_dragging(&mut self, id: &NodeId, dragging: bool) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.ui.dragging = dragging;
                true
            }
            None => false,
        }
    }

    /// Clears `is_generating` on every node not listed in `live`.
    ///
    /// Used after loading or restoring a snapshot, where a stored
    /// generating flag no longer has a request behind it.
    pub fn settle_generating(&mut self, live: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut settled = Vec::new();
        for node in self.tree.node_weights_mut() {
            if node.is_generating && !live.contains(&node.id) {
                node.is_generating = false;
                settled.push(node.id);
            }
        }
        settled.sort();
        settled
    }

    /// Recomputes every node position with the size-aware layout.
    ///
    /// Returns the number of nodes that moved.
    pub fn relayout(&mut self) -> usize {
        let positions = layout::relayout(self);
        let mut moved = 0;
        for (id, position) in positions {
            if let Some(node) = self.node_mut(&id) {
                if node.position != position {
                    node.position = position;
                    moved += 1;
                }
            }
        }
        moved
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Hands out a strictly increasing creation timestamp.
    fn next_created_at(&mut self) -> i64 {
        let stamp = now_millis().max(self.last_created_at + 1);
        self.last_created_at = stamp;
        stamp
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut ChatNode> {
        let idx = *self.node_index.get(id)?;
        self.tree.node_weight_mut(idx)
    }

    /// The node behind `id` if new branches may hang off it.
    fn branchable(&self, id: &NodeId) -> Option<&ChatNode> {
        self.get(id).filter(|node| !node.is_generating)
    }

    fn spawn_child(&mut self, parent: NodeId, kind: NodeKind, generating: bool) -> ChatNode {
        let parent_idx = self.node_index[&parent];
        let parent_node = &self.tree[parent_idx];
        let existing = self
            .tree
            .neighbors_directed(parent_idx, Direction::Outgoing)
            .count();
        let position = Position::new(
            parent_node.position.x + zigzag_offset(existing),
            parent_node.position.y + parent_node.size.height + CHILD_V_GAP,
        );

        let created_at = self.next_created_at();
        let mut node = ChatNode::new(kind, "", created_at, position);
        node.is_generating = generating;
        let idx = self.insert_node(node.clone());
        self.insert_edge(EdgeId::new(), parent_idx, idx);

        #[cfg(debug_assertions)]
        self.assert_forest();

        node
    }

    fn insert_node(&mut self, node: ChatNode) -> NodeIndex<u32> {
        self.last_created_at = self.last_created_at.max(node.created_at);
        let id = node.id;
        let idx = self.tree.add_node(node);
        self.node_index.insert(id, idx);
        idx
    }

    /// Adds an edge without any checks. Callers guarantee the invariant.
    fn insert_edge(&mut self, id: EdgeId, parent: NodeIndex<u32>, child: NodeIndex<u32>) {
        let eidx = self.tree.add_edge(parent, child, id);
        self.edge_index.insert(id, eidx);
    }

    /// Validates and adds a parent→child edge with a known id.
    fn link(&mut self, id: EdgeId, parent: NodeId, child: NodeId) -> Result<(), CoreError> {
        let parent_idx = *self
            .node_index
            .get(&parent)
            .ok_or(CoreError::NodeNotFound { id: parent })?;
        let child_idx = *self
            .node_index
            .get(&child)
            .ok_or(CoreError::NodeNotFound { id: child })?;

        if parent == child {
            return Err(CoreError::StructuralViolation {
                reason: format!("node {} cannot be its own parent", child),
            });
        }
        if let Some(existing) = self.parent_of(&child) {
            return Err(CoreError::StructuralViolation {
                reason: format!("node {} already has parent {}", child, existing),
            });
        }
        if self.ancestor_chain(&parent).contains(&child) {
            return Err(CoreError::StructuralViolation {
                reason: format!("linking {} under {} would create a cycle", child, parent),
            });
        }

        self.insert_edge(id, parent_idx, child_idx);
        Ok(())
    }

    /// Removes the given nodes (and their edges) and returns their ids.
    fn remove_indices(&mut self, indices: &[NodeIndex<u32>]) -> Vec<NodeId> {
        let mut removed = Vec::with_capacity(indices.len());
        for &idx in indices {
            let touching: Vec<EdgeId> = self
                .tree
                .edges_directed(idx, Direction::Incoming)
                .chain(self.tree.edges_directed(idx, Direction::Outgoing))
                .map(|e| *e.weight())
                .collect();
            for edge in touching {
                self.edge_index.remove(&edge);
            }
            if let Some(node) = self.tree.remove_node(idx) {
                self.node_index.remove(&node.id);
                removed.push(node.id);
            }
        }

        #[cfg(debug_assertions)]
        self.assert_forest();

        removed
    }

    fn sorted_ids(&self, indices: impl IntoIterator<Item = NodeIndex<u32>>) -> Vec<NodeId> {
        let mut nodes: Vec<&ChatNode> = indices.into_iter().map(|idx| &self.tree[idx]).collect();
        nodes.sort_by_key(|n| (n.created_at, n.id));
        nodes.into_iter().map(|n| n.id).collect()
    }

    /// Panics if the forest invariant or the index maps are broken.
    #[cfg(debug_assertions)]
    fn assert_forest(&self) {
        assert_eq!(self.node_index.len(), self.tree.node_count(), "node index out of sync");
        assert_eq!(self.edge_index.len(), self.tree.edge_count(), "edge index out of sync");
        for idx in self.tree.node_indices() {
            let parents = self
                .tree
                .neighbors_directed(idx, Direction::Incoming)
                .count();
            assert!(parents <= 1, "node {} has {} parents", self.tree[idx].id, parents);
        }
        assert!(
            !petgraph::algo::is_cyclic_directed(&self.tree),
            "conversation graph contains a cycle"
        );
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::H_GAP;
    use proptest::prelude::*;

    fn chain(graph: &mut ConversationGraph) -> (NodeId, NodeId, NodeId) {
        let root = graph.add_root(NodeKind::User, "root").id;
        let u1 = graph.add_branch(&root, NodeKind::Assistant).unwrap().id;
        graph.update_text(&u1, "reply");
        let a1 = graph.add_branch(&u1, NodeKind::User).unwrap().id;
        (root, u1, a1)
    }

    #[test]
    fn branch_on_missing_parent_returns_none() {
        let mut graph = ConversationGraph::new();
        assert!(graph.add_branch(&NodeId::new(), NodeKind::User).is_none());
        assert!(graph.add_assistant_child(&NodeId::new()).is_none());
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn assistant_child_is_generating_and_linked() {
        let mut graph = ConversationGraph::new();
        let u1 = graph.add_root(NodeKind::User, "hello").id;
        let a1 = graph.add_assistant_child(&u1).unwrap();

        assert!(a1.is_generating);
        assert_eq!(a1.kind, NodeKind::Assistant);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.parent_of(&a1.id), Some(u1));
        let edge = graph.parent_edge(&a1.id).unwrap();
        assert_eq!(edge.source_id, u1);
        assert_eq!(edge.target_id, a1.id);
    }

    #[test]
    fn generating_node_blocks_branching() {
        let mut graph = ConversationGraph::new();
        let u1 = graph.add_root(NodeKind::User, "hello").id;
        let a1 = graph.add_assistant_child(&u1).unwrap().id;

        assert!(graph.add_branch(&a1, NodeKind::User).is_none());
        assert!(graph.add_assistant_child(&a1).is_none());

        graph.set_generating(&a1, false);
        assert!(graph.add_branch(&a1, NodeKind::User).is_some());
    }

    #[test]
    fn same_role_branch_becomes_sibling() {
        let mut graph = ConversationGraph::new();
        let root = graph.add_root(NodeKind::User, "q").id;
        let reply = graph.add_branch(&root, NodeKind::Assistant).unwrap();
        let sibling = graph.add_branch(&reply.id, NodeKind::Assistant).unwrap();

        assert_eq!(graph.parent_of(&sibling.id), Some(root));
        assert_eq!(sibling.position.y, reply.position.y);
        assert_eq!(
            sibling.position.x,
            reply.position.x + reply.size.width + SIBLING_GAP
        );
        assert_eq!(graph.children_of(&root), vec![reply.id, sibling.id]);
    }

    #[test]
    fn same_role_branch_of_root_is_new_root() {
        let mut graph = ConversationGraph::new();
        let root = graph.add_root(NodeKind::User, "q").id;
        let other = graph.add_branch(&root, NodeKind::User).unwrap().id;

        assert_eq!(graph.parent_of(&other), None);
        assert_eq!(graph.roots(), vec![root, other]);
    }

    #[test]
    fn children_are_zigzagged_below_parent() {
        let mut graph = ConversationGraph::new();
        let root = graph.add_root(NodeKind::User, "q").id;
        let parent = graph.get(&root).unwrap().clone();

        let xs: Vec<f64> = (0..5)
            .map(|_| graph.add_branch(&root, NodeKind::Assistant).unwrap().position.x)
            .collect();
        let x0 = parent.position.x;
        assert_eq!(
            xs,
            vec![x0, x0 - H_GAP, x0 + H_GAP, x0 - 2.0 * H_GAP, x0 + 2.0 * H_GAP]
        );

        let child = graph.get(&graph.children_of(&root)[0]).unwrap();
        assert_eq!(
            child.position.y,
            parent.position.y + parent.size.height + CHILD_V_GAP
        );
    }

    #[test]
    fn delete_node_only_disconnects_children() {
        let mut graph = ConversationGraph::new();
        let (root, u1, a1) = chain(&mut graph);
        let extra = graph.add_branch(&u1, NodeKind::User).unwrap().id;

        let removed = graph.delete_node_only(&u1);
        assert_eq!(removed, vec![u1]);
        assert!(graph.contains(&a1));
        assert!(graph.contains(&extra));
        assert_eq!(graph.parent_of(&a1), None);
        assert_eq!(graph.roots(), vec![root, a1, extra]);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn delete_leaf_of_three_level_chain() {
        let mut graph = ConversationGraph::new();
        let (root, u1, a1) = chain(&mut graph);

        assert_eq!(graph.delete_node_only(&a1), vec![a1]);
        assert!(graph.contains(&root));
        assert!(graph.contains(&u1));
        assert!(!graph.contains(&a1));
        assert!(graph.children_of(&u1).is_empty());
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.parent_of(&u1), Some(root));
    }

    #[test]
    fn delete_subtree_removes_exactly_descendants() {
        let mut graph = ConversationGraph::new();
        let (root, u1, a1) = chain(&mut graph);
        let a2 = graph.add_branch(&a1, NodeKind::Assistant).unwrap().id;
        let side = graph.add_branch(&root, NodeKind::Assistant).unwrap().id;

        let mut expected = vec![u1];
        expected.extend(graph.descendants(&u1));
        let mut removed = graph.delete_subtree(&u1);
        removed.sort();
        expected.sort();
        assert_eq!(removed, expected);
        assert!(!graph.contains(&a2));
        assert!(graph.contains(&side));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn deleting_unknown_node_is_noop() {
        let mut graph = ConversationGraph::new();
        chain(&mut graph);
        assert!(graph.delete_node_only(&NodeId::new()).is_empty());
        assert!(graph.delete_subtree(&NodeId::new()).is_empty());
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn connect_rejects_second_parent_and_cycles() {
        let mut graph = ConversationGraph::new();
        let (root, u1, a1) = chain(&mut graph);
        let loose = graph.add_root(NodeKind::User, "loose").id;

        assert!(matches!(
            graph.connect(&loose, &a1),
            Err(CoreError::StructuralViolation { .. })
        ));
        assert!(matches!(
            graph.connect(&a1, &root),
            Err(CoreError::StructuralViolation { .. })
        ));
        assert!(matches!(
            graph.connect(&u1, &u1),
            Err(CoreError::StructuralViolation { .. })
        ));
        assert!(matches!(
            graph.connect(&u1, &NodeId::new()),
            Err(CoreError::NodeNotFound { .. })
        ));
        assert_eq!(graph.edge_count(), 2);

        graph.connect(&a1, &loose).unwrap();
        assert_eq!(graph.parent_of(&loose), Some(a1));
    }

    #[test]
    fn ancestor_chain_runs_root_to_target() {
        let mut graph = ConversationGraph::new();
        let (root, u1, a1) = chain(&mut graph);
        assert_eq!(graph.ancestor_chain(&a1), vec![root, u1, a1]);
        assert_eq!(graph.ancestor_chain(&root), vec![root]);
        assert!(graph.ancestor_chain(&NodeId::new()).is_empty());
    }

    #[test]
    fn remove_orphans_keeps_connected_and_lone_nodes() {
        let mut graph = ConversationGraph::new();
        let only = graph.add_root(NodeKind::User, "only").id;
        assert!(graph.remove_orphans().is_empty());

        let (root, _, _) = chain(&mut graph);
        let busy = graph.add_root(NodeKind::Assistant, "").id;
        graph.set_generating(&busy, true);

        let removed = graph.remove_orphans();
        assert_eq!(removed, vec![only]);
        assert!(graph.contains(&root));
        assert!(graph.contains(&busy));
    }

    #[test]
    fn remove_empty_nodes_collapses_blank_chains() {
        let mut graph = ConversationGraph::new();
        let root = graph.add_root(NodeKind::User, "keep").id;
        let blank_a = graph.add_branch(&root, NodeKind::Assistant).unwrap().id;
        let blank_b = graph.add_branch(&blank_a, NodeKind::User).unwrap().id;
        let blank_mid = graph.add_branch(&root, NodeKind::Assistant).unwrap().id;
        let text_leaf = graph.add_branch(&blank_mid, NodeKind::User).unwrap().id;
        graph.update_text(&text_leaf, "content");

        let mut removed = graph.remove_empty_nodes();
        removed.sort();
        let mut expected = vec![blank_a, blank_b];
        expected.sort();
        assert_eq!(removed, expected);
        assert!(graph.contains(&blank_mid));
        assert_eq!(graph.parent_of(&text_leaf), Some(blank_mid));
    }

    #[test]
    fn snapshot_strips_ui_flags_and_restores() {
        let mut graph = ConversationGraph::new();
        let (root, u1, a1) = chain(&mut graph);
        graph.set_selected(&u1, true);
        graph.set_dragging(&a1, true);

        let snap = graph.snapshot();
        assert!(snap.nodes.iter().all(|n| n.ui.is_clear()));
        assert_eq!(snap.nodes.len(), 3);
        assert_eq!(snap.edges.len(), 2);

        graph.delete_subtree(&root);
        assert!(graph.restore(&snap).is_empty());
        assert_eq!(graph.ancestor_chain(&a1), vec![root, u1, a1]);
        assert!(!graph.get(&u1).unwrap().ui.selected);
        assert_eq!(graph.snapshot(), snap);
    }

    #[test]
    fn from_snapshot_drops_edges_that_break_the_forest() {
        let mut graph = ConversationGraph::new();
        let (root, u1, _) = chain(&mut graph);
        let mut snap = graph.snapshot();
        snap.edges.push(ChatEdge {
            id: EdgeId::new(),
            source_id: root,
            target_id: u1,
        });
        snap.edges.push(ChatEdge {
            id: EdgeId::new(),
            source_id: NodeId::new(),
            target_id: root,
        });

        let (loaded, problems) = ConversationGraph::from_snapshot(&snap);
        assert_eq!(problems.len(), 2);
        assert_eq!(loaded.edge_count(), 2);
    }

    #[test]
    fn restore_keeps_creation_clock_monotonic() {
        let mut graph = ConversationGraph::new();
        let (root, _, a1) = chain(&mut graph);
        let old = graph.snapshot();
        let latest = graph.add_branch(&a1, NodeKind::Assistant).unwrap();

        graph.restore(&old);
        let fresh = graph.add_branch(&root, NodeKind::Assistant).unwrap();
        assert!(fresh.created_at > latest.created_at);
    }

    #[test]
    fn settle_generating_clears_stale_flags() {
        let mut graph = ConversationGraph::new();
        let u1 = graph.add_root(NodeKind::User, "q").id;
        let live = graph.add_assistant_child(&u1).unwrap().id;
        let stale = graph.add_assistant_child(&u1).unwrap().id;

        let keep: HashSet<NodeId> = [live].into_iter().collect();
        assert_eq!(graph.settle_generating(&keep), vec![stale]);
        assert!(graph.get(&live).unwrap().is_generating);
        assert!(!graph.get(&stale).unwrap().is_generating);
    }

    #[test]
    fn created_at_is_strictly_increasing() {
        let mut graph = ConversationGraph::new();
        let root = graph.add_root(NodeKind::User, "q").id;
        let mut last = graph.get(&root).unwrap().created_at;
        for _ in 0..20 {
            let node = graph.add_branch(&root, NodeKind::Assistant).unwrap();
            assert!(node.created_at > last);
            last = node.created_at;
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Root(bool),
        Branch(usize, bool),
        Assistant(usize),
        Finish(usize),
        DeleteOnly(usize),
        DeleteSubtree(usize),
        Connect(usize, usize),
        Text(usize, bool),
        RemoveOrphans,
        RemoveEmpty,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<bool>().prop_map(Op::Root),
            (any::<usize>(), any::<bool>()).prop_map(|(i, k)| Op::Branch(i, k)),
            any::<usize>().prop_map(Op::Assistant),
            any::<usize>().prop_map(Op::Finish),
            any::<usize>().prop_map(Op::DeleteOnly),
            any::<usize>().prop_map(Op::DeleteSubtree),
            (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Connect(a, b)),
            (any::<usize>(), any::<bool>()).prop_map(|(i, e)| Op::Text(i, e)),
            Just(Op::RemoveOrphans),
            Just(Op::RemoveEmpty),
        ]
    }

    fn kind(flag: bool) -> NodeKind {
        if flag {
            NodeKind::User
        } else {
            NodeKind::Assistant
        }
    }

    fn pick(graph: &ConversationGraph, i: usize) -> Option<NodeId> {
        let ids: Vec<NodeId> = graph.nodes().iter().map(|n| n.id).collect();
        if ids.is_empty() {
            None
        } else {
            Some(ids[i % ids.len()])
        }
    }

    fn check_forest(graph: &ConversationGraph) {
        let mut targets = HashSet::new();
        for edge in graph.edges() {
            assert!(graph.contains(&edge.source_id));
            assert!(graph.contains(&edge.target_id));
            assert!(targets.insert(edge.target_id), "two incoming edges");
        }
        for node in graph.nodes() {
            let chain = graph.ancestor_chain(&node.id);
            assert!(chain.len() <= graph.node_count(), "cycle through {}", node.id);
            assert!(graph.parent_of(&chain[0]).is_none());
        }
    }

    proptest! {
        #[test]
        fn random_operations_preserve_forest(ops in prop::collection::vec(op_strategy(), 0..60)) {
            let mut graph = ConversationGraph::new();
            for op in ops {
                match op {
                    Op::Root(k) => {
                        graph.add_root(kind(k), "r");
                    }
                    Op::Branch(i, k) => {
                        if let Some(id) = pick(&graph, i) {
                            graph.add_branch(&id, kind(k));
                        }
                    }
                    Op::Assistant(i) => {
                        if let Some(id) = pick(&graph, i) {
                            graph.add_assistant_child(&id);
                        }
                    }
                    Op::Finish(i) => {
                        if let Some(id) = pick(&graph, i) {
                            graph.set_generating(&id, false);
                        }
                    }
                    Op::DeleteOnly(i) => {
                        if let Some(id) = pick(&graph, i) {
                            let before = graph.node_count();
                            prop_assert_eq!(graph.delete_node_only(&id), vec![id]);
                            prop_assert_eq!(graph.node_count(), before - 1);
                        }
                    }
                    Op::DeleteSubtree(i) => {
                        if let Some(id) = pick(&graph, i) {
                            let mut expected = graph.descendants(&id);
                            expected.push(id);
                            expected.sort();
                            let mut removed = graph.delete_subtree(&id);
                            removed.sort();
                            prop_assert_eq!(removed, expected);
                        }
                    }
                    Op::Connect(a, b) => {
                        if let (Some(p), Some(c)) = (pick(&graph, a), pick(&graph, b)) {
                            let edges = graph.edge_count();
                            if graph.connect(&p, &c).is_err() {
                                prop_assert_eq!(graph.edge_count(), edges);
                            }
                        }
                    }
                    Op::Text(i, empty) => {
                        if let Some(id) = pick(&graph, i) {
                            graph.update_text(&id, if empty { "" } else { "text" });
                        }
                    }
                    Op::RemoveOrphans => {
                        graph.remove_orphans();
                    }
                    Op::RemoveEmpty => {
                        graph.remove_empty_nodes();
                    }
                }
                check_forest(&graph);
            }
        }
    }
}
