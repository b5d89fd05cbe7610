//! User-facing operations on [`AppState`].
//!
//! Every operation the canvas can trigger lives here; HTTP handlers only
//! parse requests and call these methods. Graph edits go through
//! [`WorkspaceHandle`](crate::workspace::WorkspaceHandle) so the autosave and
//! undo observers see them.

use std::collections::HashSet;

use notetree_core::{
    select_context, ChatEdge, ChatNode, ConversationGraph, CoreError, NodeId, NodeKind, Position,
    Size,
};
use notetree_storage::{Project, ProjectId, ProjectUpdate};
use serde::Serialize;

use crate::error::ApiError;
use crate::history::HistoryDepth;
use crate::notices::Notice;
use crate::persistence::SaveStatus;
use crate::queue::{QueueItem, QueueStats};
use crate::state::AppState;
use crate::workspace::Workspace;

/// The open project with everything the canvas draws.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphView {
    pub project: Project,
    pub nodes: Vec<ChatNode>,
    pub edges: Vec<ChatEdge>,
}

fn no_project() -> ApiError {
    ApiError::Conflict("no project is open".to_string())
}

fn node_not_found(id: NodeId) -> ApiError {
    CoreError::NodeNotFound { id }.into()
}

fn active(ws: &mut Workspace) -> Result<&mut ConversationGraph, ApiError> {
    if ws.project.is_none() {
        return Err(no_project());
    }
    Ok(&mut ws.graph)
}

impl AppState {
    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Creates a project and opens it.
    pub async fn create_project(
        &self,
        name: &str,
        system_prompt: Option<&str>,
        model: Option<&str>,
    ) -> Result<Project, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::BadRequest("project name must not be empty".into()));
        }
        let model = model.unwrap_or(self.config.provider.default_model.as_str());
        let project = self.store.lock().await.create_project(
            name,
            system_prompt.unwrap_or_default(),
            model,
        )?;
        tracing::info!("created project {} ({})", project.id, project.name);
        self.open_project(project.id).await
    }

    /// All projects, most recently modified first.
    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        Ok(self.store.lock().await.list_projects()?)
    }

    pub async fn active_project(&self) -> Option<Project> {
        self.workspace.read(|ws| ws.project.clone()).await
    }

    /// Makes `id` the active project.
    ///
    /// Work of the previous project is abandoned and its graph saved first.
    pub async fn open_project(&self, id: ProjectId) -> Result<Project, ApiError> {
        self.leave_current_project().await;

        let (project, snapshot) = {
            let store = self.store.lock().await;
            (store.get_project(id)?, store.load_graph(id)?)
        };
        let (mut graph, problems) = ConversationGraph::from_snapshot(&snapshot);
        for problem in &problems {
            tracing::warn!("project {}: skipped stored entry: {}", id, problem);
        }
        let settled = graph.settle_generating(&HashSet::new());
        if !settled.is_empty() {
            tracing::debug!("cleared {} stale generating flag(s)", settled.len());
        }

        self.workspace
            .switch_project(Some(project.clone()), graph)
            .await;
        self.history.reset().await;
        tracing::info!("opened project {} ({} nodes)", id, snapshot.nodes.len());
        Ok(project)
    }

    /// Saves and closes the active project, if any.
    pub async fn close_project(&self) {
        self.leave_current_project().await;
        self.workspace
            .switch_project(None, ConversationGraph::new())
            .await;
        self.history.reset().await;
    }

    pub async fn rename_project(&self, id: ProjectId, name: &str) -> Result<Project, ApiError> {
        self.update_project(
            id,
            &ProjectUpdate {
                name: Some(name.to_string()),
                ..ProjectUpdate::default()
            },
        )
        .await
    }

    /// Changes name, system prompt or model of a project.
    pub async fn update_project(
        &self,
        id: ProjectId,
        update: &ProjectUpdate,
    ) -> Result<Project, ApiError> {
        let mut update = update.clone();
        if let Some(name) = &update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ApiError::BadRequest("project name must not be empty".into()));
            }
            update.name = Some(name.to_string());
        }
        let project = self.store.lock().await.update_project(id, &update)?;
        let refreshed = project.clone();
        self.workspace
            .mutate_if(|ws| {
                let open = ws.project.as_mut().filter(|p| p.id == id)?;
                *open = refreshed;
                Some(())
            })
            .await;
        Ok(project)
    }

    /// Deletes a project with all of its nodes and edges.
    pub async fn delete_project(&self, id: ProjectId) -> Result<(), ApiError> {
        if self.workspace.read(|ws| ws.project_id()).await == Some(id) {
            self.queue.abandon_project(id).await;
            self.workspace
                .switch_project(None, ConversationGraph::new())
                .await;
            self.history.reset().await;
        }
        self.store.lock().await.delete_project(id)?;
        tracing::info!("deleted project {}", id);
        Ok(())
    }

    async fn leave_current_project(&self) {
        let Some(current) = self.workspace.read(|ws| ws.project_id()).await else {
            return;
        };
        self.queue.abandon_project(current).await;
        if let Err(err) = self.persistence.save_now().await {
            tracing::warn!("project {} closed with unsaved changes: {}", current, err);
        }
    }

    // -----------------------------------------------------------------------
    // Graph
    // -----------------------------------------------------------------------

    pub async fn graph(&self) -> Result<GraphView, ApiError> {
        self.workspace
            .read(|ws| {
                let project = ws.project.clone().ok_or_else(no_project)?;
                Ok::<_, ApiError>(GraphView {
                    project,
                    nodes: ws.graph.nodes().into_iter().cloned().collect(),
                    edges: ws.graph.edges(),
                })
            })
            .await
    }

    /// Starts a new conversation tree.
    pub async fn add_root(&self, kind: NodeKind, text: &str) -> Result<ChatNode, ApiError> {
        self.workspace
            .try_mutate(|ws| Ok::<_, ApiError>(active(ws)?.add_root(kind, text)))
            .await
    }

    /// Branches a new node off `parent`.
    pub async fn branch(&self, parent: NodeId, kind: NodeKind) -> Result<ChatNode, ApiError> {
        self.workspace
            .try_mutate(|ws| {
                let graph = active(ws)?;
                check_branchable(graph, parent)?;
                graph
                    .add_branch(&parent, kind)
                    .ok_or_else(|| node_not_found(parent))
            })
            .await
    }

    /// Adds an assistant reply under `parent` and queues its generation.
    pub async fn add_ai_child(&self, parent: NodeId) -> Result<ChatNode, ApiError> {
        let default_model = self.config.provider.default_model.clone();
        let (node, item) = self
            .workspace
            .try_mutate(|ws| {
                let project = ws.project.clone().ok_or_else(no_project)?;
                check_branchable(&ws.graph, parent)?;
                let node = ws
                    .graph
                    .add_assistant_child(&parent)
                    .ok_or_else(|| node_not_found(parent))?;
                let snapshot = select_context(&ws.graph, &parent, &project.system_prompt)
                    .ok_or_else(|| node_not_found(parent))?;
                let model = if project.model.trim().is_empty() {
                    default_model
                } else {
                    project.model
                };
                let item = QueueItem {
                    node_id: node.id,
                    project_id: project.id,
                    model,
                    snapshot,
                };
                Ok::<_, ApiError>((node, item))
            })
            .await?;

        self.queue.enqueue(item).await;
        Ok(node)
    }

    /// Removes one node; its children become roots.
    pub async fn delete_node(&self, id: NodeId) -> Result<Vec<NodeId>, ApiError> {
        self.queue.discard(&[id]).await;
        self.workspace
            .try_mutate(|ws| {
                let removed = active(ws)?.delete_node_only(&id);
                if removed.is_empty() {
                    return Err(node_not_found(id));
                }
                Ok(removed)
            })
            .await
    }

    /// Removes a node together with everything below it.
    pub async fn delete_subtree(&self, id: NodeId) -> Result<Vec<NodeId>, ApiError> {
        let mut doomed = self.workspace.read(|ws| ws.graph.descendants(&id)).await;
        doomed.push(id);
        self.queue.discard(&doomed).await;
        self.workspace
            .try_mutate(|ws| {
                let removed = active(ws)?.delete_subtree(&id);
                if removed.is_empty() {
                    return Err(node_not_found(id));
                }
                Ok(removed)
            })
            .await
    }

    pub async fn edit_text(&self, id: NodeId, text: &str) -> Result<(), ApiError> {
        self.update_node(id, |graph| graph.update_text(&id, text)).await
    }

    pub async fn move_node(&self, id: NodeId, position: Position) -> Result<(), ApiError> {
        self.update_node(id, |graph| graph.set_position(&id, position))
            .await
    }

    /// Records the size the canvas measured for a node.
    pub async fn resize_node(&self, id: NodeId, size: Size) -> Result<(), ApiError> {
        self.update_node(id, |graph| graph.set_size(&id, size)).await
    }

    pub async fn select_node(&self, id: NodeId, selected: bool) -> Result<(), ApiError> {
        self.update_node(id, |graph| graph.set_selected(&id, selected))
            .await
    }

    pub async fn set_dragging(&self, id: NodeId, dragging: bool) -> Result<(), ApiError> {
        self.update_node(id, |graph| graph.set_dragging(&id, dragging))
            .await
    }

    async fn update_node(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut ConversationGraph) -> bool,
    ) -> Result<(), ApiError> {
        self.workspace
            .try_mutate(|ws| {
                if f(active(ws)?) {
                    Ok(())
                } else {
                    Err(node_not_found(id))
                }
            })
            .await
    }

    /// Stops a pending or streaming generation and removes its node.
    pub async fn stop_generation(&self, id: NodeId) -> Result<(), ApiError> {
        if self.queue.stop(id).await {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("no generation running for node {}", id)))
        }
    }

    /// Removes isolated nodes.
    pub async fn remove_orphans(&self) -> Result<Vec<NodeId>, ApiError> {
        self.workspace
            .try_mutate(|ws| Ok::<_, ApiError>(active(ws)?.remove_orphans()))
            .await
    }

    /// Removes blank leaves until none remain.
    pub async fn remove_empty_nodes(&self) -> Result<Vec<NodeId>, ApiError> {
        self.workspace
            .try_mutate(|ws| Ok::<_, ApiError>(active(ws)?.remove_empty_nodes()))
            .await
    }

    /// Repositions every node; returns how many moved.
    pub async fn relayout(&self) -> Result<usize, ApiError> {
        self.workspace
            .try_mutate(|ws| Ok::<_, ApiError>(active(ws)?.relayout()))
            .await
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Saves immediately, bypassing the autosave debounce.
    pub async fn force_save(&self) -> Result<SaveStatus, ApiError> {
        self.persistence.save_now().await?;
        Ok(self.persistence.status())
    }

    pub fn save_status(&self) -> SaveStatus {
        self.persistence.status()
    }

    pub async fn undo(&self) -> bool {
        let live = self.queue.live_nodes().await;
        self.history.undo(&live).await
    }

    pub async fn redo(&self) -> bool {
        let live = self.queue.live_nodes().await;
        self.history.redo(&live).await
    }

    pub async fn history_depth(&self) -> HistoryDepth {
        self.history.depth().await
    }

    pub async fn drain_notices(&self) -> Vec<Notice> {
        self.notices.drain().await
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.queue.stats().await
    }
}

/// Missing parents are `NotFound`, parents still streaming a `Conflict`.
fn check_branchable(graph: &ConversationGraph, parent: NodeId) -> Result<(), ApiError> {
    match graph.get(&parent) {
        None => Err(node_not_found(parent)),
        Some(node) if node.is_generating => Err(ApiError::Conflict(format!(
            "node {} is still generating",
            parent
        ))),
        Some(_) => Ok(()),
    }
}
