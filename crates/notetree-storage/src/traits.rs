//! The [`ProjectStore`] trait defining the storage contract for projects.
//!
//! Two kinds of graph writes exist:
//! - **Whole-graph** writes (`replace_nodes`, `replace_edges`, `save_graph`)
//!   overwrite everything stored for a project. These back the debounced
//!   autosave.
//! - **Point** writes (`update_node_text`) touch a single row. These back the
//!   periodic checkpoints taken while a reply streams in.
//!
//! All backends (InMemoryStore, SqliteStore) implement this trait with the
//! same observable semantics.

use notetree_core::{ChatEdge, ChatNode, GraphSnapshot, NodeId};

use crate::error::StorageError;
use crate::types::{Project, ProjectId, ProjectUpdate};

/// The storage contract for NoteTree projects.
///
/// The trait is synchronous; async callers hold it behind a mutex and keep
/// each call short.
pub trait ProjectStore {
    // -------------------------------------------------------------------
    // Project records
    // -------------------------------------------------------------------

    /// Creates an empty project and returns its stored record.
    fn create_project(
        &mut self,
        name: &str,
        system_prompt: &str,
        model: &str,
    ) -> Result<Project, StorageError>;

    fn get_project(&self, id: ProjectId) -> Result<Project, StorageError>;

    /// Lists all projects, most recently modified first.
    fn list_projects(&self) -> Result<Vec<Project>, StorageError>;

    /// Applies `update` and bumps `last_modified`.
    fn update_project(
        &mut self,
        id: ProjectId,
        update: &ProjectUpdate,
    ) -> Result<Project, StorageError>;

    /// Deletes a project together with all of its nodes and edges, atomically.
    fn delete_project(&mut self, id: ProjectId) -> Result<(), StorageError>;

    // -------------------------------------------------------------------
    // Graph records
    // -------------------------------------------------------------------

    /// Replaces every stored node of a project with `nodes`.
    fn replace_nodes(&mut self, project: ProjectId, nodes: &[ChatNode]) -> Result<(), StorageError>;

    /// Replaces every stored edge of a project with `edges`.
    fn replace_edges(&mut self, project: ProjectId, edges: &[ChatEdge]) -> Result<(), StorageError>;

    /// Replaces nodes and edges together and bumps `last_modified`, as one
    /// atomic write.
    fn save_graph(&mut self, project: ProjectId, graph: &GraphSnapshot) -> Result<(), StorageError>;

    /// Overwrites the text of one stored node.
    ///
    /// Returns [`StorageError::NodeNotFound`] if the node has not been saved
    /// yet.
    fn update_node_text(
        &mut self,
        project: ProjectId,
        node: NodeId,
        text: &str,
    ) -> Result<(), StorageError>;

    /// Loads a project's nodes (oldest first) and edges.
    fn load_graph(&self, project: ProjectId) -> Result<GraphSnapshot, StorageError>;
}
