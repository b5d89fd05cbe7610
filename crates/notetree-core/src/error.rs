//! Core error types for notetree-core.
//!
//! Most graph operations report "nothing happened" through `Option` or an
//! empty result rather than an error. [`CoreError`] is reserved for calls
//! that would break the forest invariant and for inconsistent snapshots.

use crate::id::{EdgeId, NodeId};
use thiserror::Error;

/// Core errors produced by the notetree-core crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A node id was not found in the graph.
    #[error("node not found: {id}")]
    NodeNotFound { id: NodeId },

    /// A snapshot contained the same node id twice.
    #[error("duplicate node: {id}")]
    DuplicateNode { id: NodeId },

    /// A snapshot contained the same edge id twice.
    #[error("duplicate edge: {id}")]
    DuplicateEdge { id: EdgeId },

    /// The requested change would break the forest invariant.
    #[error("structural violation: {reason}")]
    StructuralViolation { reason: String },
}
