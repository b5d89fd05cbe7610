//! Storage error types for notetree-storage.
//!
//! [`StorageError`] covers all anticipated failure modes in the storage layer:
//! database and migration failures, serialization, missing records, and rows
//! that cannot be turned back into graph values.

use notetree_core::NodeId;
use thiserror::Error;

use crate::types::ProjectId;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying SQLite call failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A project with the given ID was not found.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// A node was not found in the given project.
    #[error("node not found: project={project}, node={node}")]
    NodeNotFound { project: ProjectId, node: NodeId },

    /// A stored row could not be decoded.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },
}
