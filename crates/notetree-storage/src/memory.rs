//! In-memory implementation of [`ProjectStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests and ephemeral
//! sessions. It stores all data in a HashMap with identical semantics to the
//! SQLite backend.

use std::collections::HashMap;

use notetree_core::{ChatEdge, ChatNode, GraphSnapshot, NodeId};

use crate::error::StorageError;
use crate::traits::ProjectStore;
use crate::types::{bump, now_millis, Project, ProjectId, ProjectUpdate};

#[derive(Debug, Clone)]
struct StoredProject {
    project: Project,
    nodes: Vec<ChatNode>,
    edges: Vec<ChatEdge>,
}

/// In-memory storage backend.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    projects: HashMap<ProjectId, StoredProject>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn stored(&self, id: ProjectId) -> Result<&StoredProject, StorageError> {
        self.projects
            .get(&id)
            .ok_or(StorageError::ProjectNotFound(id))
    }

    fn stored_mut(&mut self, id: ProjectId) -> Result<&mut StoredProject, StorageError> {
        self.projects
            .get_mut(&id)
            .ok_or(StorageError::ProjectNotFound(id))
    }
}

/// Nodes as they are persisted: canvas interaction flags dropped.
fn persisted(nodes: &[ChatNode]) -> Vec<ChatNode> {
    nodes.iter().map(ChatNode::without_ui_flags).collect()
}

impl ProjectStore for InMemoryStore {
    fn create_project(
        &mut self,
        name: &str,
        system_prompt: &str,
        model: &str,
    ) -> Result<Project, StorageError> {
        let now = now_millis();
        let project = Project {
            id: ProjectId::new(),
            name: name.to_string(),
            system_prompt: system_prompt.to_string(),
            model: model.to_string(),
            created_at: now,
            last_modified: now,
        };
        self.projects.insert(
            project.id,
            StoredProject {
                project: project.clone(),
                nodes: Vec::new(),
                edges: Vec::new(),
            },
        );
        Ok(project)
    }

    fn get_project(&self, id: ProjectId) -> Result<Project, StorageError> {
        Ok(self.stored(id)?.project.clone())
    }

    fn list_projects(&self) -> Result<Vec<Project>, StorageError> {
        let mut projects: Vec<Project> =
            self.projects.values().map(|s| s.project.clone()).collect();
        projects.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then(b.created_at.cmp(&a.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(projects)
    }

    fn update_project(
        &mut self,
        id: ProjectId,
        update: &ProjectUpdate,
    ) -> Result<Project, StorageError> {
        let stored = self.stored_mut(id)?;
        let project = &mut stored.project;
        if let Some(name) = &update.name {
            project.name = name.clone();
        }
        if let Some(prompt) = &update.system_prompt {
            project.system_prompt = prompt.clone();
        }
        if let Some(model) = &update.model {
            project.model = model.clone();
        }
        project.last_modified = bump(project.last_modified);
        Ok(project.clone())
    }

    fn delete_project(&mut self, id: ProjectId) -> Result<(), StorageError> {
        self.projects
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::ProjectNotFound(id))
    }

    fn replace_nodes(&mut self, project: ProjectId, nodes: &[ChatNode]) -> Result<(), StorageError> {
        self.stored_mut(project)?.nodes = persisted(nodes);
        Ok(())
    }

    fn replace_edges(&mut self, project: ProjectId, edges: &[ChatEdge]) -> Result<(), StorageError> {
        self.stored_mut(project)?.edges = edges.to_vec();
        Ok(())
    }

    fn save_graph(&mut self, project: ProjectId, graph: &GraphSnapshot) -> Result<(), StorageError> {
        let stored = self.stored_mut(project)?;
        stored.nodes = persisted(&graph.nodes);
        stored.edges = graph.edges.clone();
        stored.project.last_modified = bump(stored.project.last_modified);
        Ok(())
    }

    fn update_node_text(
        &mut self,
        project: ProjectId,
        node: NodeId,
        text: &str,
    ) -> Result<(), StorageError> {
        let stored = self.stored_mut(project)?;
        let target = stored
            .nodes
            .iter_mut()
            .find(|n| n.id == node)
            .ok_or(StorageError::NodeNotFound { project, node })?;
        target.text = text.to_string();
        Ok(())
    }

    fn load_graph(&self, project: ProjectId) -> Result<GraphSnapshot, StorageError> {
        let stored = self.stored(project)?;
        let mut nodes = stored.nodes.clone();
        nodes.sort_by_key(|n| (n.created_at, n.id));
        Ok(GraphSnapshot {
            nodes,
            edges: stored.edges.clone(),
        })
    }
}
