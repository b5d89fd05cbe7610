//! Debounced autosave of the active project.
//!
//! [`PersistenceCoordinator`] watches the workspace revision. Once edits have
//! been quiet for the debounce period it writes the whole graph of the active
//! project in one transaction. [`PersistenceCoordinator::save_now`] is the
//! same routine without the wait; both paths update [`SaveStatus`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use notetree_storage::StorageError;

use crate::state::SharedStore;
use crate::workspace::{Revision, WorkspaceHandle};

/// How long `Saved` stays visible before falling back to `Idle`.
pub const SAVED_DISPLAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
    /// The last save failed; local edits are not on disk.
    Unsaved { message: String },
}

pub struct PersistenceCoordinator {
    workspace: WorkspaceHandle,
    store: SharedStore,
    debounce: Duration,
    status: Arc<watch::Sender<SaveStatus>>,
    /// Serializes the save routine.
    saving: Mutex<()>,
    /// Bumped by every save so a stale `Saved -> Idle` reset is skipped.
    saves: Arc<AtomicU64>,
}

impl PersistenceCoordinator {
    pub fn new(workspace: WorkspaceHandle, store: SharedStore, debounce: Duration) -> Self {
        let (status, _) = watch::channel(SaveStatus::Idle);
        PersistenceCoordinator {
            workspace,
            store,
            debounce,
            status: Arc::new(status),
            saving: Mutex::new(()),
            saves: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.status.subscribe()
    }

    /// Spawns the autosave observer. It runs until `shutdown` fires.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let revisions = self.workspace.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = coordinator.observe(revisions) => {}
            }
        })
    }

    async fn observe(&self, mut revisions: watch::Receiver<Revision>) {
        let mut saved_seq = revisions.borrow_and_update().seq;
        loop {
            if revisions.changed().await.is_err() {
                return;
            }
            // Restart the quiet period on every further change.
            loop {
                tokio::select! {
                    changed = revisions.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(self.debounce) => break,
                }
            }

            let seq = revisions.borrow_and_update().seq;
            if seq == saved_seq {
                // Only the active project changed; nothing was edited.
                continue;
            }
            saved_seq = seq;
            // Failures are reported through the status.
            let _ = self.save_now().await;
        }
    }

    /// Saves the active project immediately.
    ///
    /// Does nothing when no project is open.
    pub async fn save_now(&self) -> Result<(), StorageError> {
        let _guard = self.saving.lock().await;

        let target = self
            .workspace
            .read(|ws| ws.project_id().map(|id| (id, ws.graph.snapshot())))
            .await;
        let Some((project, snapshot)) = target else {
            return Ok(());
        };

        self.status.send_replace(SaveStatus::Saving);
        let result = self.store.lock().await.save_graph(project, &snapshot);
        let save = self.saves.fetch_add(1, Ordering::SeqCst) + 1;

        match result {
            Ok(()) => {
                tracing::debug!(
                    "saved project {} ({} nodes, {} edges)",
                    project,
                    snapshot.nodes.len(),
                    snapshot.edges.len()
                );
                self.status.send_replace(SaveStatus::Saved);
                self.schedule_idle(save);
                Ok(())
            }
            Err(err) => {
                tracing::error!("saving project {} failed: {}", project, err);
                self.status.send_replace(SaveStatus::Unsaved {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn schedule_idle(&self, save: u64) {
        let status = Arc::clone(&self.status);
        let saves = Arc::clone(&self.saves);
        tokio::spawn(async move {
            tokio::time::sleep(SAVED_DISPLAY).await;
            if saves.load(Ordering::SeqCst) != save {
                return;
            }
            status.send_if_modified(|s| {
                if *s == SaveStatus::Saved {
                    *s = SaveStatus::Idle;
                    true
                } else {
                    false
                }
            });
        });
    }
}
