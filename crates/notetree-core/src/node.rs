//! Node and edge types for the conversation forest.
//!
//! A [`ChatNode`] is one message on the canvas: either a user prompt or an
//! assistant reply. A [`ChatEdge`] links a message to the reply (or
//! follow-up) that continues it.

use serde::{Deserialize, Serialize};

use crate::id::{EdgeId, NodeId};

/// Width of a freshly created node before the canvas reports its real size.
pub const DEFAULT_NODE_WIDTH: f64 = 250.0;

/// Height of a freshly created node before the canvas reports its real size.
pub const DEFAULT_NODE_HEIGHT: f64 = 100.0;

/// Who authored a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    User,
    Assistant,
}

impl NodeKind {
    /// The opposite role.
    pub fn other(self) -> NodeKind {
        match self {
            NodeKind::User => NodeKind::Assistant,
            NodeKind::Assistant => NodeKind::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::User => "user",
            NodeKind::Assistant => "assistant",
        }
    }

    /// Parses the storage representation produced by [`NodeKind::as_str`].
    pub fn parse(s: &str) -> Option<NodeKind> {
        match s {
            "user" => Some(NodeKind::User),
            "assistant" => Some(NodeKind::Assistant),
            _ => None,
        }
    }
}

/// Top-left corner of a node on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }
}

/// Rendered size of a node, as measured by the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Size { width, height }
    }
}

impl Default for Size {
    fn default() -> Self {
        Size {
            width: DEFAULT_NODE_WIDTH,
            height: DEFAULT_NODE_HEIGHT,
        }
    }
}

/// Interaction state owned by the canvas.
///
/// Never persisted and never captured in undo history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UiFlags {
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub dragging: bool,
}

impl UiFlags {
    pub fn is_clear(&self) -> bool {
        !self.selected && !self.dragging
    }
}

/// A single message in the conversation forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNode {
    /// Unique, immutable identifier.
    pub id: NodeId,
    /// Author role.
    pub kind: NodeKind,
    /// Message body. Grows chunk by chunk while an assistant reply streams.
    #[serde(default)]
    pub text: String,
    /// True while an assistant reply is waiting for its first chunk.
    #[serde(default)]
    pub is_generating: bool,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub size: Size,
    #[serde(default, skip_serializing_if = "UiFlags::is_clear")]
    pub ui: UiFlags,
}

impl ChatNode {
    /// Creates a node with default size at the given position.
    pub fn new(kind: NodeKind, text: impl Into<String>, created_at: i64, position: Position) -> Self {
        ChatNode {
            id: NodeId::new(),
            kind,
            text: text.into(),
            is_generating: false,
            created_at,
            position,
            size: Size::default(),
            ui: UiFlags::default(),
        }
    }

    /// Returns true if the node has no visible text.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Copy of this node with the canvas interaction flags cleared.
    pub fn without_ui_flags(&self) -> ChatNode {
        ChatNode {
            ui: UiFlags::default(),
            ..self.clone()
        }
    }
}

/// A directed parent→child link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEdge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
}
