//! The active project and its conversation graph, shared by every component.
//!
//! [`WorkspaceHandle`] is the only way to reach the graph. Every mutation goes
//! through [`WorkspaceHandle::mutate`] (or one of its variants), which bumps a
//! [`Revision`] published on a `tokio::sync::watch` channel. The autosave and
//! undo observers subscribe to that channel instead of being called directly.
//!
//! Guards are never held across an await that waits on the network, a timer
//! or storage: callers pass a synchronous closure and get its result back.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use notetree_core::ConversationGraph;
use notetree_storage::{Project, ProjectId};

/// Published after every workspace change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Revision {
    /// Bumped by every graph or project-settings mutation.
    pub seq: u64,
    /// Bumped whenever the active project is replaced.
    pub epoch: u64,
}

#[derive(Debug, Default)]
pub struct Workspace {
    /// The open project, if any.
    pub project: Option<Project>,
    pub graph: ConversationGraph,
    epoch: u64,
}

impl Workspace {
    pub fn project_id(&self) -> Option<ProjectId> {
        self.project.as_ref().map(|p| p.id)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[derive(Clone)]
pub struct WorkspaceHandle {
    inner: Arc<Mutex<Workspace>>,
    revision: Arc<watch::Sender<Revision>>,
}

impl Default for WorkspaceHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceHandle {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(Revision::default());
        WorkspaceHandle {
            inner: Arc::new(Mutex::new(Workspace::default())),
            revision: Arc::new(revision),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Revision> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> Revision {
        *self.revision.borrow()
    }

    /// Runs `f` against the workspace without publishing a revision.
    pub async fn read<R>(&self, f: impl FnOnce(&Workspace) -> R) -> R {
        let workspace = self.inner.lock().await;
        f(&workspace)
    }

    /// Runs `f` and publishes a new revision.
    pub async fn mutate<R>(&self, f: impl FnOnce(&mut Workspace) -> R) -> R {
        let mut workspace = self.inner.lock().await;
        let result = f(&mut workspace);
        self.bump_seq();
        result
    }

    /// Runs `f` and publishes a new revision only if it returns `Some`.
    pub async fn mutate_if<R>(&self, f: impl FnOnce(&mut Workspace) -> Option<R>) -> Option<R> {
        let mut workspace = self.inner.lock().await;
        let result = f(&mut workspace);
        if result.is_some() {
            self.bump_seq();
        }
        result
    }

    /// Runs `f` and publishes a new revision only if it succeeds.
    pub async fn try_mutate<R, E>(
        &self,
        f: impl FnOnce(&mut Workspace) -> Result<R, E>,
    ) -> Result<R, E> {
        let mut workspace = self.inner.lock().await;
        let result = f(&mut workspace);
        if result.is_ok() {
            self.bump_seq();
        }
        result
    }

    /// Replaces the active project and graph.
    ///
    /// Publishes a new epoch without touching `seq`, so observers can tell a
    /// project switch from an edit.
    pub async fn switch_project(&self, project: Option<Project>, graph: ConversationGraph) {
        let mut workspace = self.inner.lock().await;
        workspace.project = project;
        workspace.graph = graph;
        workspace.epoch += 1;
        let epoch = workspace.epoch;
        self.revision.send_modify(|rev| rev.epoch = epoch);
    }

    fn bump_seq(&self) {
        self.revision.send_modify(|rev| rev.seq += 1);
    }
}
