//! Placement rules for the conversation canvas.
//!
//! Two things live here: the quick placement used when a single node is
//! created ([`zigzag_offset`] and the gap constants), and [`relayout`], which
//! repositions an entire forest using each node's measured size.
//!
//! # Size-aware packing
//!
//! Each subtree is given a horizontal span wide enough for the node itself
//! and for all child spans side by side:
//!
//! ```text
//! width(n) = max(n.width, Σ width(child) + (k - 1) · MIN_H_GAP)
//! ```
//!
//! A node is centred in its span and its children are laid out left to
//! right (oldest first) beneath it. Every depth level of a tree starts below
//! the tallest node of the level above. Separate trees are packed left to
//! right with [`ROOT_GAP`] between them.
//!
//! The result depends only on structure and sizes, never on current
//! positions, so running it twice gives identical output.

use std::collections::HashMap;

use crate::graph::ConversationGraph;
use crate::id::NodeId;
use crate::node::Position;

/// Horizontal step between zig-zagged children of one parent.
pub const H_GAP: f64 = 300.0;

/// Vertical gap between a parent's bottom edge and a new child.
pub const CHILD_V_GAP: f64 = 80.0;

/// Horizontal gap between a node and a same-role sibling branched from it.
pub const SIBLING_GAP: f64 = 50.0;

/// Minimum horizontal gap between neighbouring subtrees.
pub const MIN_H_GAP: f64 = 40.0;

/// Minimum vertical gap between depth levels.
pub const MIN_V_GAP: f64 = 60.0;

/// Extra separation between independent trees.
pub const ROOT_GAP: f64 = 120.0;

/// Horizontal offset of the `i`-th child relative to its parent.
///
/// `0, -1, +1, -2, +2, ...` times [`H_GAP`].
pub fn zigzag_offset(i: usize) -> f64 {
    if i == 0 {
        return 0.0;
    }
    let rank = i.div_ceil(2) as f64;
    let sign = if i % 2 == 1 { -1.0 } else { 1.0 };
    sign * rank * H_GAP
}

/// Computes new positions for every node in the graph.
///
/// Returns `(id, position)` pairs in creation order. The graph itself is not
/// modified; see [`ConversationGraph::relayout`].
pub fn relayout(graph: &ConversationGraph) -> Vec<(NodeId, Position)> {
    let mut packer = Packer {
        graph,
        widths: HashMap::new(),
        positions: HashMap::new(),
    };

    let mut cursor = 0.0;
    for root in graph.roots() {
        let span = packer.subtree_width(root);

        let mut heights = Vec::new();
        packer.level_heights(root, 0, &mut heights);
        let mut tops = Vec::with_capacity(heights.len());
        let mut y = 0.0;
        for height in &heights {
            tops.push(y);
            y += height + MIN_V_GAP;
        }

        packer.place(root, cursor, 0, &tops);
        cursor += span + ROOT_GAP;
    }

    graph
        .nodes()
        .into_iter()
        .filter_map(|n| packer.positions.get(&n.id).map(|p| (n.id, *p)))
        .collect()
}

struct Packer<'a> {
    graph: &'a ConversationGraph,
    /// Memoised subtree spans.
    widths: HashMap<NodeId, f64>,
    positions: HashMap<NodeId, Position>,
}

impl Packer<'_> {
    fn own_width(&self, id: NodeId) -> f64 {
        self.graph.get(&id).map(|n| n.size.width).unwrap_or(0.0)
    }

    fn subtree_width(&mut self, id: NodeId) -> f64 {
        if let Some(&w) = self.widths.get(&id) {
            return w;
        }
        let children = self.graph.children_of(&id);
        let mut total = 0.0;
        for child in &children {
            total += self.subtree_width(*child);
        }
        if children.len() > 1 {
            total += (children.len() - 1) as f64 * MIN_H_GAP;
        }
        let width = self.own_width(id).max(total);
        self.widths.insert(id, width);
        width
    }

    /// Records the tallest node per depth level below `id`.
    fn level_heights(&self, id: NodeId, depth: usize, heights: &mut Vec<f64>) {
        let height = self.graph.get(&id).map(|n| n.size.height).unwrap_or(0.0);
        if heights.len() <= depth {
            heights.push(height);
        } else if heights[depth] < height {
            heights[depth] = height;
        }
        for child in self.graph.children_of(&id) {
            self.level_heights(child, depth + 1, heights);
        }
    }

    /// Centres `id` in the span starting at `left` and recurses into its
    /// children. Spans must already be memoised.
    fn place(&mut self, id: NodeId, left: f64, depth: usize, tops: &[f64]) {
        let span = self.widths[&id];
        let own = self.own_width(id);
        self.positions
            .insert(id, Position::new(left + (span - own) / 2.0, tops[depth]));

        let children = self.graph.children_of(&id);
        if children.is_empty() {
            return;
        }
        let needed: f64 = children.iter().map(|c| self.widths[c]).sum::<f64>()
            + (children.len() - 1) as f64 * MIN_H_GAP;
        let mut child_left = left + (span - needed) / 2.0;
        for child in children {
            self.place(child, child_left, depth + 1, tops);
            child_left += self.widths[&child] + MIN_H_GAP;
        }
    }
}
