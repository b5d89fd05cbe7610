//! Prompt-context selection for the next assistant reply.
//!
//! The transcript sent to the model is deliberately pruned: long branches
//! would otherwise grow the prompt without bound. [`select_context`] keeps
//!
//! 1. the last [`RECENT_WINDOW`] nodes of the ancestor chain ending at the
//!    target,
//! 2. the root of that chain, so the opening question is never lost,
//! 3. the target's uncles (other children of its grandparent), so parallel
//!    branches stay visible,
//!
//! then orders everything by creation time. Blank nodes are dropped and
//! consecutive messages of the same role are merged, because chat
//! transports require strictly alternating roles.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::graph::ConversationGraph;
use crate::id::NodeId;
use crate::node::NodeKind;

/// How many of the most recent ancestors are always included.
pub const RECENT_WINDOW: usize = 3;

/// Inserted between two merged messages of the same role.
pub const MERGE_SEPARATOR: &str = "\n\n---\n\n";

/// Speaker of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl From<NodeKind> for Role {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::User => Role::User,
            NodeKind::Assistant => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub text: String,
}

/// Everything the transport needs for one generation.
///
/// Built fresh for every request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub system_prompt: String,
    pub messages: Vec<ContextMessage>,
}

/// Ids of the nodes that feed the context for a reply to `target`, oldest
/// first. Empty if `target` is unknown.
pub fn context_nodes(graph: &ConversationGraph, target: &NodeId) -> Vec<NodeId> {
    let chain = graph.ancestor_chain(target);
    let Some(&root) = chain.first() else {
        return Vec::new();
    };

    let mut picked: Vec<NodeId> = chain[chain.len().saturating_sub(RECENT_WINDOW)..].to_vec();
    picked.push(root);

    if let Some(parent) = graph.parent_of(target) {
        if let Some(grandparent) = graph.parent_of(&parent) {
            picked.extend(
                graph
                    .children_of(&grandparent)
                    .into_iter()
                    .filter(|uncle| *uncle != parent),
            );
        }
    }

    let mut seen = HashSet::new();
    let mut nodes: Vec<_> = picked
        .into_iter()
        .filter(|id| seen.insert(*id))
        .filter_map(|id| graph.get(&id))
        .collect();
    nodes.sort_by_key(|n| (n.created_at, n.id));
    nodes.into_iter().map(|n| n.id).collect()
}

/// Builds the transcript for a reply to `target`.
///
/// Returns `None` if `target` does not exist.
pub fn select_context(
    graph: &ConversationGraph,
    target: &NodeId,
    system_prompt: &str,
) -> Option<ContextSnapshot> {
    if !graph.contains(target) {
        return None;
    }

    let mut messages: Vec<ContextMessage> = Vec::new();
    for id in context_nodes(graph, target) {
        let Some(node) = graph.get(&id) else {
            continue;
        };
        if node.is_blank() {
            continue;
        }
        let role = Role::from(node.kind);
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.text.push_str(MERGE_SEPARATOR);
                last.text.push_str(&node.text);
            }
            _ => messages.push(ContextMessage {
                role,
                text: node.text.clone(),
            }),
        }
    }

    Some(ContextSnapshot {
        system_prompt: system_prompt.to_string(),
        messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds an alternating chain of `len` nodes and returns their ids.
    fn linear(graph: &mut ConversationGraph, len: usize) -> Vec<NodeId> {
        let mut ids = vec![graph.add_root(NodeKind::User, "n0").id];
        for i in 1..len {
            let prev = ids[i - 1];
            let kind = graph.get(&prev).unwrap().kind.other();
            let id = graph.add_branch(&prev, kind).unwrap().id;
            graph.update_text(&id, format!("n{}", i));
            ids.push(id);
        }
        ids
    }

    #[test]
    fn unknown_target_yields_none() {
        let graph = ConversationGraph::new();
        assert!(select_context(&graph, &NodeId::new(), "sys").is_none());
        assert!(context_nodes(&graph, &NodeId::new()).is_empty());
    }

    #[test]
    fn root_target_is_singleton() {
        let mut graph = ConversationGraph::new();
        let ids = linear(&mut graph, 1);
        let ctx = select_context(&graph, &ids[0], "be nice").unwrap();
        assert_eq!(ctx.system_prompt, "be nice");
        assert_eq!(
            ctx.messages,
            vec![ContextMessage {
                role: Role::User,
                text: "n0".into()
            }]
        );
    }

    #[test]
    fn short_chain_is_included_whole() {
        for len in 1..=3 {
            let mut graph = ConversationGraph::new();
            let ids = linear(&mut graph, len);
            assert_eq!(context_nodes(&graph, ids.last().unwrap()), ids);
        }
    }

    #[test]
    fn long_chain_keeps_root_and_three_most_recent() {
        let mut graph = ConversationGraph::new();
        let ids = linear(&mut graph, 7);
        let picked = context_nodes(&graph, &ids[6]);
        assert_eq!(picked, vec![ids[0], ids[4], ids[5], ids[6]]);
    }

    #[test]
    fn uncles_are_included_in_creation_order() {
        let mut graph = ConversationGraph::new();
        let root = graph.add_root(NodeKind::User, "question").id;
        let answer_a = graph.add_branch(&root, NodeKind::Assistant).unwrap().id;
        graph.update_text(&answer_a, "answer a");
        let answer_b = graph.add_branch(&root, NodeKind::Assistant).unwrap().id;
        graph.update_text(&answer_b, "answer b");
        let follow_up = graph.add_branch(&answer_a, NodeKind::User).unwrap().id;
        graph.update_text(&follow_up, "follow up");

        let picked = context_nodes(&graph, &follow_up);
        assert_eq!(picked, vec![root, answer_a, answer_b, follow_up]);

        let ctx = select_context(&graph, &follow_up, "").unwrap();
        assert_eq!(ctx.messages.len(), 3);
        assert_eq!(ctx.messages[1].role, Role::Assistant);
        assert_eq!(
            ctx.messages[1].text,
            format!("answer a{}answer b", MERGE_SEPARATOR)
        );
        assert_eq!(ctx.messages[2].text, "follow up");
    }

    #[test]
    fn no_grandparent_means_no_uncles() {
        let mut graph = ConversationGraph::new();
        let root = graph.add_root(NodeKind::User, "q").id;
        let reply = graph.add_branch(&root, NodeKind::Assistant).unwrap().id;
        let unrelated = graph.add_root(NodeKind::User, "other tree").id;

        let picked = context_nodes(&graph, &reply);
        assert_eq!(picked, vec![root, reply]);
        assert!(!picked.contains(&unrelated));
    }

    #[test]
    fn blank_nodes_are_skipped_and_roles_merge() {
        let mut graph = ConversationGraph::new();
        let root = graph.add_root(NodeKind::User, "first").id;
        let blank = graph.add_branch(&root, NodeKind::Assistant).unwrap().id;
        let second = graph.add_branch(&blank, NodeKind::User).unwrap().id;
        graph.update_text(&second, "second");

        let ctx = select_context(&graph, &second, "").unwrap();
        assert_eq!(
            ctx.messages,
            vec![ContextMessage {
                role: Role::User,
                text: format!("first{}second", MERGE_SEPARATOR),
            }]
        );
    }

    #[test]
    fn messages_always_alternate() {
        let mut graph = ConversationGraph::new();
        let ids = linear(&mut graph, 9);
        let side = graph.add_branch(&ids[6], NodeKind::User).unwrap().id;
        graph.update_text(&side, "side");

        let ctx = select_context(&graph, &ids[8], "").unwrap();
        for pair in ctx.messages.windows(2) {
            assert_ne!(pair[0].role, pair[1].role);
        }
    }
}
