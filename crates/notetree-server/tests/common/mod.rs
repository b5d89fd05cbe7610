//! Shared fixtures for the notetree-server integration tests.
//!
//! [`ScriptedTransport`] replays a canned event script per `generate` call
//! and records every request it sees. [`FlakyStore`] wraps the in-memory
//! backend so tests can count graph saves and make them fail on demand.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use notetree_core::{ChatEdge, ChatNode, GraphSnapshot, NodeId};
use notetree_server::config::ServerConfig;
use notetree_server::queue::GenerationOutcome;
use notetree_server::state::AppState;
use notetree_server::transport::{AiTransport, GenerationRequest, StreamEvent, TransportError};
use notetree_storage::{
    InMemoryStore, Project, ProjectId, ProjectStore, ProjectUpdate, StorageError,
};

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

/// One step of a scripted reply.
#[derive(Debug, Clone)]
pub enum Step {
    Wait(Duration),
    Delta(&'static str),
    Safety,
    Fail(TransportError),
}

pub fn wait_ms(ms: u64) -> Step {
    Step::Wait(Duration::from_millis(ms))
}

pub fn connectivity() -> Step {
    Step::Fail(TransportError::Connectivity("fetch failed".into()))
}

/// Replays one script per call; calls past the end get a short "ok" reply.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_scripts(scripts: Vec<Vec<Step>>) -> Arc<Self> {
        let transport = Self::default();
        *transport.scripts.lock().unwrap() = scripts.into();
        Arc::new(transport)
    }

    pub fn push_script(&self, script: Vec<Step>) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl AiTransport for ScriptedTransport {
    fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StreamEvent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Step::Delta("ok")]);

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for step in script {
                let event = match step {
                    Step::Wait(delay) => {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(delay) => continue,
                        }
                    }
                    Step::Delta(text) => StreamEvent::Delta(text.to_string()),
                    Step::Safety => StreamEvent::SafetyStop,
                    Step::Fail(err) => StreamEvent::Error(err),
                };
                if cancel.is_cancelled() || tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        rx
    }
}

// ---------------------------------------------------------------------------
// Store wrapper
// ---------------------------------------------------------------------------

/// Switches shared between a test and its [`FlakyStore`].
#[derive(Clone, Default)]
pub struct StoreProbe {
    pub saves: Arc<AtomicUsize>,
    pub text_updates: Arc<AtomicUsize>,
    pub failing: Arc<AtomicBool>,
}

impl StoreProbe {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn text_updates(&self) -> usize {
        self.text_updates.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

/// In-memory store whose graph writes can be counted and broken.
pub struct FlakyStore {
    inner: InMemoryStore,
    probe: StoreProbe,
}

impl FlakyStore {
    pub fn new(probe: StoreProbe) -> Self {
        FlakyStore {
            inner: InMemoryStore::new(),
            probe,
        }
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.probe.failing.load(Ordering::SeqCst) {
            return Err(StorageError::IntegrityError {
                reason: "disk unavailable".into(),
            });
        }
        Ok(())
    }
}

impl ProjectStore for FlakyStore {
    fn create_project(
        &mut self,
        name: &str,
        system_prompt: &str,
        model: &str,
    ) -> Result<Project, StorageError> {
        self.inner.create_project(name, system_prompt, model)
    }

    fn get_project(&self, id: ProjectId) -> Result<Project, StorageError> {
        self.inner.get_project(id)
    }

    fn list_projects(&self) -> Result<Vec<Project>, StorageError> {
        self.inner.list_projects()
    }

    fn update_project(
        &mut self,
        id: ProjectId,
        update: &ProjectUpdate,
    ) -> Result<Project, StorageError> {
        self.inner.update_project(id, update)
    }

    fn delete_project(&mut self, id: ProjectId) -> Result<(), StorageError> {
        self.inner.delete_project(id)
    }

    fn replace_nodes(&mut self, project: ProjectId, nodes: &[ChatNode]) -> Result<(), StorageError> {
        self.check()?;
        self.inner.replace_nodes(project, nodes)
    }

    fn replace_edges(&mut self, project: ProjectId, edges: &[ChatEdge]) -> Result<(), StorageError> {
        self.check()?;
        self.inner.replace_edges(project, edges)
    }

    fn save_graph(&mut self, project: ProjectId, graph: &GraphSnapshot) -> Result<(), StorageError> {
        self.check()?;
        self.probe.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_graph(project, graph)
    }

    fn update_node_text(
        &mut self,
        project: ProjectId,
        node: NodeId,
        text: &str,
    ) -> Result<(), StorageError> {
        self.check()?;
        self.probe.text_updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_node_text(project, node, text)
    }

    fn load_graph(&self, project: ProjectId) -> Result<GraphSnapshot, StorageError> {
        self.inner.load_graph(project)
    }
}

// ---------------------------------------------------------------------------
// State helpers
// ---------------------------------------------------------------------------

/// App state over the in-memory store and the given transport.
pub fn test_state(transport: Arc<ScriptedTransport>) -> AppState {
    AppState::in_memory(transport)
}

/// App state whose store is observed through the returned probe.
pub fn probed_state(transport: Arc<ScriptedTransport>) -> (AppState, StoreProbe) {
    let probe = StoreProbe::default();
    let state = AppState::with_parts(
        ServerConfig::default(),
        Box::new(FlakyStore::new(probe.clone())),
        transport,
    );
    (state, probe)
}

/// Waits for the next finished generation.
pub async fn next_outcome(
    outcomes: &mut broadcast::Receiver<(NodeId, GenerationOutcome)>,
) -> (NodeId, GenerationOutcome) {
    tokio::time::timeout(Duration::from_secs(120), outcomes.recv())
        .await
        .expect("timed out waiting for a generation outcome")
        .expect("outcome channel closed")
}

pub async fn node_text(state: &AppState, id: NodeId) -> Option<String> {
    state
        .workspace
        .read(|ws| ws.graph.get(&id).map(|n| n.text.clone()))
        .await
}

/// Text of `id` as last written to the store, if it is stored at all.
pub async fn stored_text(state: &AppState, project: ProjectId, id: NodeId) -> Option<String> {
    let snapshot = state.store.lock().await.load_graph(project).ok()?;
    snapshot
        .nodes
        .into_iter()
        .find(|n| n.id == id)
        .map(|n| n.text)
}

pub async fn node_generating(state: &AppState, id: NodeId) -> Option<bool> {
    state
        .workspace
        .read(|ws| ws.graph.get(&id).map(|n| n.is_generating))
        .await
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn request_json(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(path);
    let request = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&v).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(json!(null));
    (status, json)
}

pub async fn get_json(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    request_json(app, Method::GET, path, None).await
}

pub async fn post_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    request_json(app, Method::POST, path, Some(body)).await
}

pub async fn post_empty(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    request_json(app, Method::POST, path, None).await
}

pub async fn put_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    request_json(app, Method::PUT, path, Some(body)).await
}

pub async fn patch_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    request_json(app, Method::PATCH, path, Some(body)).await
}

pub async fn delete(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    request_json(app, Method::DELETE, path, None).await
}
