//! Serialized AI generation queue.
//!
//! [`GenerationQueue`] runs at most one generation at a time, in FIFO order,
//! on a single worker task. Each item streams its reply into the workspace
//! graph chunk by chunk:
//!
//! ```text
//! Queued -> Streaming -> Succeeded | SafetyBlocked | Failed | Aborted
//! ```
//!
//! The worker re-reads the workspace after every await. A write only lands if
//! the item was not cancelled, its project is still the active one and its
//! node still exists; otherwise the item ends as `Aborted` without touching
//! the graph again.
//!
//! Connectivity failures are retried with [`RETRY_DELAYS`]. Any other failure
//! is terminal: a notice is posted and the placeholder node is removed.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use notetree_core::{ContextSnapshot, NodeId};
use notetree_storage::{ProjectId, StorageError};

use crate::notices::NoticeBoard;
use crate::persistence::PersistenceCoordinator;
use crate::state::SharedStore;
use crate::transport::{AiTransport, GenerationRequest, StreamEvent, TransportError};
use crate::workspace::{Workspace, WorkspaceHandle};

/// Backoff before each retry of a connectivity failure.
pub const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Streamed text is written to storage every this many deltas.
pub const CHECKPOINT_EVERY: usize = 10;

/// Appended to a reply the provider stopped for safety reasons.
pub const SAFETY_WARNING: &str =
    "\n\n[Response stopped: the content was blocked by safety filters.]";

const OUTCOME_CAPACITY: usize = 64;

/// One pending generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub node_id: NodeId,
    pub project_id: ProjectId,
    pub model: String,
    pub snapshot: ContextSnapshot,
}

/// How an item left the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum GenerationOutcome {
    Succeeded,
    SafetyBlocked,
    Failed { message: String },
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    /// Items currently streaming. Never above one.
    pub streaming_now: usize,
    pub max_streaming_observed: usize,
    /// Items that reached a terminal state.
    pub processed: u64,
    pub pending: usize,
}

#[derive(Debug)]
struct InFlight {
    node_id: NodeId,
    project_id: ProjectId,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<QueueItem>,
    current: Option<InFlight>,
    stats: QueueStats,
}

pub struct GenerationQueue {
    inner: Mutex<QueueInner>,
    wake: Notify,
    outcomes: broadcast::Sender<(NodeId, GenerationOutcome)>,
    transport: Arc<dyn AiTransport>,
    workspace: WorkspaceHandle,
    store: SharedStore,
    persistence: Arc<PersistenceCoordinator>,
    notices: Arc<NoticeBoard>,
}

/// Result of streaming one attempt.
enum Attempt {
    Finished(GenerationOutcome),
    Failed(TransportError),
}

impl GenerationQueue {
    pub fn new(
        transport: Arc<dyn AiTransport>,
        workspace: WorkspaceHandle,
        store: SharedStore,
        persistence: Arc<PersistenceCoordinator>,
        notices: Arc<NoticeBoard>,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);
        GenerationQueue {
            inner: Mutex::new(QueueInner::default()),
            wake: Notify::new(),
            outcomes,
            transport,
            workspace,
            store,
            persistence,
            notices,
        }
    }

    /// Spawns the worker. It runs until `shutdown` fires.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    queue.cancel_current().await;
                }
                _ = queue.run() => {}
            }
        })
    }

    /// Adds an item at the back of the queue.
    ///
    /// A pending item for the same node is replaced. An item for a node that
    /// is already streaming is ignored.
    pub async fn enqueue(&self, item: QueueItem) {
        {
            let mut inner = self.inner.lock().await;
            if inner.current.as_ref().map(|c| c.node_id) == Some(item.node_id) {
                tracing::debug!("node {} is already streaming, ignoring enqueue", item.node_id);
                return;
            }
            inner.pending.retain(|p| p.node_id != item.node_id);
            tracing::debug!("queued generation for node {}", item.node_id);
            inner.pending.push_back(item);
            inner.stats.pending = inner.pending.len();
        }
        self.wake.notify_one();
    }

    /// Stops the generation for `node`, whether pending or streaming, and
    /// removes its node from the graph.
    ///
    /// Returns false if the node had nothing queued.
    pub async fn stop(&self, node: NodeId) -> bool {
        if !self.discard(&[node]).await {
            return false;
        }
        self.workspace
            .mutate(|ws| ws.graph.delete_node_only(&node))
            .await;
        tracing::info!("generation for node {} stopped", node);
        true
    }

    /// Forgets any queued or streaming work for `nodes` without touching the
    /// graph. Pending items never reach the transport.
    pub async fn discard(&self, nodes: &[NodeId]) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.pending.len();
        inner.pending.retain(|p| !nodes.contains(&p.node_id));
        let mut found = inner.pending.len() != before;
        inner.stats.pending = inner.pending.len();

        if let Some(current) = &inner.current {
            if nodes.contains(&current.node_id) {
                current.cancel.cancel();
                found = true;
            }
        }
        found
    }

    /// Drops all work belonging to `project` before it is closed.
    ///
    /// Pending placeholders are deleted from the graph. The streaming item is
    /// cancelled; its partial text is kept and its generating flag cleared.
    pub async fn abandon_project(&self, project: ProjectId) {
        let (dropped, interrupted) = {
            let mut inner = self.inner.lock().await;
            let mut dropped = Vec::new();
            inner.pending.retain(|p| {
                if p.project_id == project {
                    dropped.push(p.node_id);
                    false
                } else {
                    true
                }
            });
            inner.stats.pending = inner.pending.len();

            let interrupted = inner
                .current
                .as_ref()
                .filter(|c| c.project_id == project)
                .map(|c| {
                    c.cancel.cancel();
                    c.node_id
                });
            (dropped, interrupted)
        };

        if dropped.is_empty() && interrupted.is_none() {
            return;
        }
        tracing::info!(
            "abandoning {} pending generation(s) for project {}",
            dropped.len(),
            project
        );
        self.workspace
            .mutate(|ws| {
                if ws.project_id() != Some(project) {
                    return;
                }
                for node in &dropped {
                    ws.graph.delete_node_only(node);
                }
                if let Some(node) = interrupted {
                    ws.graph.set_generating(&node, false);
                }
            })
            .await;
    }

    /// Nodes with pending or streaming work.
    pub async fn live_nodes(&self) -> HashSet<NodeId> {
        let inner = self.inner.lock().await;
        inner
            .pending
            .iter()
            .map(|p| p.node_id)
            .chain(inner.current.as_ref().map(|c| c.node_id))
            .collect()
    }

    pub async fn stats(&self) -> QueueStats {
        self.inner.lock().await.stats
    }

    /// Receives `(node, outcome)` for every item that finishes.
    pub fn subscribe(&self) -> broadcast::Receiver<(NodeId, GenerationOutcome)> {
        self.outcomes.subscribe()
    }

    // -----------------------------------------------------------------------
    // Worker
    // -----------------------------------------------------------------------

    async fn run(&self) {
        loop {
            let Some((item, cancel)) = self.next_item().await else {
                self.wake.notified().await;
                continue;
            };
            let outcome = self.process(&item, &cancel).await;
            self.finish(&item, outcome).await;
        }
    }

    async fn next_item(&self) -> Option<(QueueItem, CancellationToken)> {
        let mut inner = self.inner.lock().await;
        let item = inner.pending.pop_front()?;
        let cancel = CancellationToken::new();
        inner.current = Some(InFlight {
            node_id: item.node_id,
            project_id: item.project_id,
            cancel: cancel.clone(),
        });
        inner.stats.pending = inner.pending.len();
        inner.stats.streaming_now += 1;
        inner.stats.max_streaming_observed = inner
            .stats
            .max_streaming_observed
            .max(inner.stats.streaming_now);
        Some((item, cancel))
    }

    async fn finish(&self, item: &QueueItem, outcome: GenerationOutcome) {
        {
            let mut inner = self.inner.lock().await;
            inner.current = None;
            inner.stats.streaming_now = inner.stats.streaming_now.saturating_sub(1);
            inner.stats.processed += 1;
        }
        tracing::info!("generation for node {} finished: {:?}", item.node_id, outcome);
        let _ = self.outcomes.send((item.node_id, outcome));
    }

    async fn cancel_current(&self) {
        if let Some(current) = &self.inner.lock().await.current {
            current.cancel.cancel();
        }
    }

    async fn process(&self, item: &QueueItem, cancel: &CancellationToken) -> GenerationOutcome {
        let mut retries = 0;
        loop {
            let err = match self.attempt(item, cancel).await {
                Attempt::Finished(outcome) => return outcome,
                Attempt::Failed(err) => err,
            };

            if err.is_retryable() && retries < RETRY_DELAYS.len() {
                let delay = RETRY_DELAYS[retries];
                retries += 1;
                tracing::warn!(
                    "generation for node {} failed ({}), retry {} in {:?}",
                    item.node_id,
                    err,
                    retries,
                    delay
                );
                let placeholder = format!(
                    "Connection issue, retrying in {}s\u{2026}",
                    delay.as_secs()
                );
                let written = self
                    .write(item, cancel, |ws| {
                        ws.graph.update_text(&item.node_id, placeholder);
                        ws.graph.set_generating(&item.node_id, true);
                    })
                    .await;
                if !written {
                    return GenerationOutcome::Aborted;
                }
                tokio::select! {
                    _ = cancel.cancelled() => return GenerationOutcome::Aborted,
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }

            return self.fail(item, cancel, err).await;
        }
    }

    /// One transport call, streamed to completion.
    async fn attempt(&self, item: &QueueItem, cancel: &CancellationToken) -> Attempt {
        let request = GenerationRequest::new(&item.model, &item.snapshot);
        let tokens = self.transport.count_tokens(
            &request.model,
            &request.messages,
            &request.system_prompt,
        );
        tracing::debug!(
            "requesting reply for node {} ({} messages, ~{} tokens)",
            item.node_id,
            request.messages.len(),
            tokens
        );

        let mut events = self.transport.generate(request, cancel.child_token());
        let mut text = String::new();
        let mut deltas = 0usize;

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Attempt::Finished(GenerationOutcome::Aborted),
                event = events.recv() => event,
            };

            match event {
                Some(StreamEvent::Delta(chunk)) => {
                    text.push_str(&chunk);
                    deltas += 1;
                    let snapshot = text.clone();
                    let written = self
                        .write(item, cancel, |ws| {
                            ws.graph.update_text(&item.node_id, snapshot);
                            ws.graph.set_generating(&item.node_id, false);
                        })
                        .await;
                    if !written {
                        return Attempt::Finished(GenerationOutcome::Aborted);
                    }
                    if deltas % CHECKPOINT_EVERY == 0 {
                        self.checkpoint(item, &text).await;
                    }
                }
                Some(StreamEvent::SafetyStop) => {
                    text.push_str(SAFETY_WARNING);
                    let final_text = text.clone();
                    let written = self
                        .write(item, cancel, |ws| {
                            ws.graph.update_text(&item.node_id, final_text);
                            ws.graph.set_generating(&item.node_id, false);
                        })
                        .await;
                    if !written {
                        return Attempt::Finished(GenerationOutcome::Aborted);
                    }
                    self.checkpoint(item, &text).await;
                    return Attempt::Finished(GenerationOutcome::SafetyBlocked);
                }
                Some(StreamEvent::Error(err)) => return Attempt::Failed(err),
                None => break,
            }
        }

        let final_text = text.clone();
        let written = self
            .write(item, cancel, |ws| {
                ws.graph.update_text(&item.node_id, final_text);
                ws.graph.set_generating(&item.node_id, false);
            })
            .await;
        if !written {
            return Attempt::Finished(GenerationOutcome::Aborted);
        }
        self.checkpoint(item, &text).await;
        Attempt::Finished(GenerationOutcome::Succeeded)
    }

    /// Terminal failure: notice, clear the thinking state, remove the node.
    async fn fail(
        &self,
        item: &QueueItem,
        cancel: &CancellationToken,
        err: TransportError,
    ) -> GenerationOutcome {
        tracing::error!("generation for node {} failed: {}", item.node_id, err);
        let message = err.user_message();
        let removed = self
            .write(item, cancel, |ws| {
                ws.graph.set_generating(&item.node_id, false);
                ws.graph.delete_node_only(&item.node_id);
            })
            .await;
        if !removed {
            return GenerationOutcome::Aborted;
        }
        self.notices.push(Some(item.node_id), message).await;
        GenerationOutcome::Failed {
            message: message.to_string(),
        }
    }

    /// Applies `f` if the item is still current; returns whether it did.
    async fn write(
        &self,
        item: &QueueItem,
        cancel: &CancellationToken,
        f: impl FnOnce(&mut Workspace),
    ) -> bool {
        self.workspace
            .mutate_if(|ws| {
                if cancel.is_cancelled()
                    || ws.project_id() != Some(item.project_id)
                    || !ws.graph.contains(&item.node_id)
                {
                    return None;
                }
                f(ws);
                Some(())
            })
            .await
            .is_some()
    }

    async fn checkpoint(&self, item: &QueueItem, text: &str) {
        let result = self
            .store
            .lock()
            .await
            .update_node_text(item.project_id, item.node_id, text);
        match result {
            Ok(()) => {}
            // A streaming reply keeps the autosave debounce from firing, so
            // the node may not be stored yet. Write the whole graph instead.
            Err(StorageError::NodeNotFound { .. }) => {
                tracing::debug!("node {} not stored yet, saving full graph", item.node_id);
                if let Err(err) = self.persistence.save_now().await {
                    tracing::warn!("checkpoint save for node {} failed: {}", item.node_id, err);
                }
            }
            Err(err) => {
                tracing::warn!("checkpoint for node {} failed: {}", item.node_id, err);
            }
        }
    }
}
