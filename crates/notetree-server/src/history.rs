//! Snapshot-based undo/redo.
//!
//! [`UndoHistory`] is the plain two-stack structure. [`HistoryRecorder`]
//! feeds it: an observer with its own debounce timer captures a snapshot of
//! the graph once edits go quiet, so a burst of edits becomes one undo step.
//! It is independent of the autosave observer.
//!
//! Snapshots never contain canvas interaction flags, and history is reset
//! whenever the active project changes.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use notetree_core::{GraphSnapshot, NodeId};

use crate::workspace::{Revision, WorkspaceHandle};

/// Maximum number of undo steps kept.
pub const HISTORY_CAP: usize = 200;

/// Past and future snapshots around the current baseline.
#[derive(Debug, Clone, Default)]
pub struct UndoHistory {
    past: VecDeque<GraphSnapshot>,
    future: Vec<GraphSnapshot>,
    /// The state the graph was in at the last capture, undo or redo.
    baseline: Option<GraphSnapshot>,
}

impl UndoHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything and starts over from `baseline`.
    pub fn reset(&mut self, baseline: GraphSnapshot) {
        self.past.clear();
        self.future.clear();
        self.baseline = Some(baseline);
    }

    /// Records `snapshot` as the new current state.
    ///
    /// Returns false if it equals the current baseline.
    pub fn capture(&mut self, snapshot: GraphSnapshot) -> bool {
        match self.baseline.take() {
            Some(baseline) if baseline == snapshot => {
                self.baseline = Some(baseline);
                false
            }
            Some(baseline) => {
                self.past.push_back(baseline);
                if self.past.len() > HISTORY_CAP {
                    self.past.pop_front();
                }
                self.future.clear();
                self.baseline = Some(snapshot);
                true
            }
            None => {
                self.baseline = Some(snapshot);
                false
            }
        }
    }

    /// Steps back; returns the snapshot to restore.
    pub fn undo(&mut self) -> Option<GraphSnapshot> {
        let previous = self.past.pop_back()?;
        if let Some(current) = self.baseline.replace(previous.clone()) {
            self.future.push(current);
        }
        Some(previous)
    }

    /// Steps forward again; returns the snapshot to restore.
    pub fn redo(&mut self) -> Option<GraphSnapshot> {
        let next = self.future.pop()?;
        if let Some(current) = self.baseline.replace(next.clone()) {
            self.past.push_back(current);
        }
        Some(next)
    }

    /// Replaces the baseline without touching either stack.
    pub fn rebase(&mut self, baseline: GraphSnapshot) {
        self.baseline = Some(baseline);
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn depth(&self) -> HistoryDepth {
        HistoryDepth {
            undo: self.past.len(),
            redo: self.future.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryDepth {
    pub undo: usize,
    pub redo: usize,
}

#[derive(Debug, Default)]
struct Recorded {
    history: UndoHistory,
    /// Workspace epoch the history belongs to.
    epoch: u64,
}

/// Keeps [`UndoHistory`] in step with the workspace.
pub struct HistoryRecorder {
    workspace: WorkspaceHandle,
    debounce: Duration,
    state: Mutex<Recorded>,
}

impl HistoryRecorder {
    pub fn new(workspace: WorkspaceHandle, debounce: Duration) -> Self {
        HistoryRecorder {
            workspace,
            debounce,
            state: Mutex::new(Recorded::default()),
        }
    }

    /// Spawns the capture observer. It runs until `shutdown` fires.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let recorder = Arc::clone(self);
        let revisions = self.workspace.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = recorder.observe(revisions) => {}
            }
        })
    }

    async fn observe(&self, mut revisions: watch::Receiver<Revision>) {
        loop {
            if revisions.changed().await.is_err() {
                return;
            }
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
            revisions.borrow_and_update();
            self.flush().await;
        }
    }

    /// Captures the current graph right away.
    ///
    /// Returns true if a new undo step was recorded.
    pub async fn flush(&self) -> bool {
        let (epoch, snapshot) = self
            .workspace
            .read(|ws| (ws.epoch(), ws.graph.snapshot()))
            .await;
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            state.epoch = epoch;
            state.history.reset(snapshot);
            return false;
        }
        state.history.capture(snapshot)
    }

    /// Starts a fresh history from the current graph.
    pub async fn reset(&self) {
        let (epoch, snapshot) = self
            .workspace
            .read(|ws| (ws.epoch(), ws.graph.snapshot()))
            .await;
        let mut state = self.state.lock().await;
        state.epoch = epoch;
        state.history.reset(snapshot);
        tracing::debug!("undo history reset for epoch {}", epoch);
    }

    /// Restores the previous snapshot.
    ///
    /// Generating flags are cleared on every node not in `live`.
    pub async fn undo(&self, live: &HashSet<NodeId>) -> bool {
        self.step(live, UndoHistory::undo).await
    }

    /// Re-applies the snapshot last undone.
    pub async fn redo(&self, live: &HashSet<NodeId>) -> bool {
        self.step(live, UndoHistory::redo).await
    }

    pub async fn depth(&self) -> HistoryDepth {
        self.state.lock().await.history.depth()
    }

    async fn step(
        &self,
        live: &HashSet<NodeId>,
        pick: fn(&mut UndoHistory) -> Option<GraphSnapshot>,
    ) -> bool {
        self.flush().await;

        let mut state = self.state.lock().await;
        let Some(target) = pick(&mut state.history) else {
            return false;
        };
        let epoch = state.epoch;
        let restored = self
            .workspace
            .mutate_if(|ws| {
                if ws.epoch() != epoch {
                    return None;
                }
                let problems = ws.graph.restore(&target);
                if !problems.is_empty() {
                    tracing::warn!("restore skipped {} invalid entries", problems.len());
                }
                ws.graph.settle_generating(live);
                Some(ws.graph.snapshot())
            })
            .await;

        match restored {
            Some(snapshot) => {
                state.history.rebase(snapshot);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notetree_core::{ConversationGraph, NodeKind};

    fn graph_with(texts: &[&str]) -> GraphSnapshot {
        let mut graph = ConversationGraph::new();
        for text in texts {
            graph.add_root(NodeKind::User, *text);
        }
        graph.snapshot()
    }

    #[test]
    fn first_capture_only_sets_baseline() {
        let mut history = UndoHistory::new();
        assert!(!history.capture(graph_with(&["a"])));
        assert!(!history.can_undo());
    }

    #[test]
    fn identical_capture_is_ignored() {
        let mut history = UndoHistory::new();
        let snapshot = graph_with(&["a"]);
        history.reset(snapshot.clone());
        assert!(!history.capture(snapshot));
        assert_eq!(history.depth(), HistoryDepth { undo: 0, redo: 0 });
    }

    #[test]
    fn undo_then_redo_round_trip() {
        let mut history = UndoHistory::new();
        let first = graph_with(&["a"]);
        let second = graph_with(&["a", "b"]);
        history.reset(first.clone());
        assert!(history.capture(second.clone()));

        assert_eq!(history.undo(), Some(first));
        assert!(history.can_redo());
        assert_eq!(history.redo(), Some(second));
        assert!(history.undo().is_some());
        assert!(history.undo().is_none());
    }

    #[test]
    fn new_capture_clears_redo() {
        let mut history = UndoHistory::new();
        history.reset(graph_with(&["a"]));
        history.capture(graph_with(&["b"]));
        history.undo();
        assert!(history.can_redo());
        history.capture(graph_with(&["c"]));
        assert!(!history.can_redo());
    }

    #[test]
    fn past_is_capped() {
        let mut history = UndoHistory::new();
        history.reset(GraphSnapshot::default());
        for i in 0..(HISTORY_CAP + 25) {
            let name = format!("n{}", i);
            history.capture(graph_with(&[name.as_str()]));
        }
        assert_eq!(history.depth().undo, HISTORY_CAP);
    }

    #[tokio::test]
    async fn recorder_resets_on_epoch_change() {
        let workspace = WorkspaceHandle::new();
        let recorder = HistoryRecorder::new(workspace.clone(), Duration::from_millis(500));
        recorder.reset().await;

        workspace
            .mutate(|ws| ws.graph.add_root(NodeKind::User, "one"))
            .await;
        assert!(recorder.flush().await);
        assert_eq!(recorder.depth().await.undo, 1);

        workspace
            .switch_project(None, ConversationGraph::new())
            .await;
        assert!(!recorder.flush().await);
        assert_eq!(recorder.depth().await, HistoryDepth { undo: 0, redo: 0 });
    }

    #[tokio::test]
    async fn undo_restores_and_clears_stale_generating() {
        let workspace = WorkspaceHandle::new();
        let recorder = HistoryRecorder::new(workspace.clone(), Duration::from_millis(500));
        let root = workspace
            .mutate(|ws| ws.graph.add_root(NodeKind::User, "q").id)
            .await;
        recorder.reset().await;

        let reply = workspace
            .mutate(|ws| ws.graph.add_assistant_child(&root).map(|n| n.id))
            .await
            .unwrap();
        recorder.flush().await;
        workspace
            .mutate(|ws| ws.graph.update_text(&root, "edited"))
            .await;

        // Pending edit is flushed first, so undo goes back one step to the
        // state with the reply.
        assert!(recorder.undo(&HashSet::new()).await);
        let (text, generating) = workspace
            .read(|ws| {
                (
                    ws.graph.get(&root).map(|n| n.text.clone()),
                    ws.graph.get(&reply).map(|n| n.is_generating),
                )
            })
            .await;
        assert_eq!(text.as_deref(), Some("q"));
        assert_eq!(generating, Some(false));

        assert!(recorder.redo(&HashSet::new()).await);
        let text = workspace
            .read(|ws| ws.graph.get(&root).map(|n| n.text.clone()))
            .await;
        assert_eq!(text.as_deref(), Some("edited"));
    }
}
