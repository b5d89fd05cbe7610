//! Node operation request/response types.

use notetree_core::{ChatNode, NodeId, NodeKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct AddRootRequest {
    pub kind: NodeKind,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchRequest {
    /// Same kind as the parent branches a sibling, the other kind a child.
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditTextRequest {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveRequest {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResizeRequest {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagRequest {
    pub value: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeResponse {
    pub node: ChatNode,
}

/// Ids removed by a delete or cleanup.
#[derive(Debug, Clone, Serialize)]
pub struct RemovedResponse {
    pub removed: Vec<NodeId>,
}
