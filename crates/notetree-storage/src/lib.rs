//! Storage abstraction for NoteTree projects.
//!
//! Provides the [`ProjectStore`] trait defining the storage contract that all
//! backends implement, plus the [`InMemoryStore`] and [`SqliteStore`] as
//! first-class backends.
//!
//! # Record sets
//!
//! Each backend keeps three record sets per project:
//! - **projects**: name, system prompt, model and timestamps
//! - **nodes**: every [`ChatNode`](notetree_core::ChatNode) tagged with its project
//! - **edges**: every [`ChatEdge`](notetree_core::ChatEdge) tagged with its project
//!
//! Whole-graph writes replace a project's nodes and edges in one transaction.
//! Streaming checkpoints use the single-node text update instead.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: ProjectId, Project, ProjectUpdate
//! - [`traits`]: ProjectStore trait definition
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQL schema migrations and connection setup
//! - [`sqlite`]: SqliteStore implementation

pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use error::StorageError;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::ProjectStore;
pub use types::{Project, ProjectId, ProjectUpdate};
