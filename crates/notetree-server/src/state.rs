//! Application state wiring every component together.
//!
//! [`AppState`] is constructed explicitly at startup (or per test) and handed
//! to axum as router state. There are no globals: each component receives
//! the handles it needs here.
//!
//! The store sits behind `Arc<tokio::sync::Mutex<>>` because
//! `rusqlite::Connection` is `!Sync`; calls on it are synchronous and short.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use notetree_storage::{InMemoryStore, ProjectStore, SqliteStore};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::history::HistoryRecorder;
use crate::llm_provider::OpenAiCompatibleTransport;
use crate::notices::NoticeBoard;
use crate::persistence::PersistenceCoordinator;
use crate::queue::GenerationQueue;
use crate::transport::AiTransport;
use crate::workspace::WorkspaceHandle;

/// A storage backend shared between async tasks.
pub type SharedStore = Arc<tokio::sync::Mutex<Box<dyn ProjectStore + Send>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: SharedStore,
    pub workspace: WorkspaceHandle,
    pub queue: Arc<GenerationQueue>,
    pub persistence: Arc<PersistenceCoordinator>,
    pub history: Arc<HistoryRecorder>,
    pub notices: Arc<NoticeBoard>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Opens the SQLite database from `config` and talks to the configured
    /// provider.
    ///
    /// Must be called inside a tokio runtime; background workers are spawned.
    pub fn new(config: ServerConfig) -> Result<Self, ApiError> {
        let store = SqliteStore::new(&config.db_path)?;
        let transport = OpenAiCompatibleTransport::from_config(&config.provider)?;
        Ok(Self::with_parts(config, Box::new(store), Arc::new(transport)))
    }

    /// In-memory storage with default timings, for tests.
    pub fn in_memory(transport: Arc<dyn AiTransport>) -> Self {
        Self::with_parts(
            ServerConfig::default(),
            Box::new(InMemoryStore::new()),
            transport,
        )
    }

    /// Wires the given store and transport and starts the queue worker and
    /// both observers.
    pub fn with_parts(
        config: ServerConfig,
        store: Box<dyn ProjectStore + Send>,
        transport: Arc<dyn AiTransport>,
    ) -> Self {
        let store: SharedStore = Arc::new(tokio::sync::Mutex::new(store));
        let workspace = WorkspaceHandle::new();
        let notices = Arc::new(NoticeBoard::new());
        let shutdown = CancellationToken::new();

        let persistence = Arc::new(PersistenceCoordinator::new(
            workspace.clone(),
            Arc::clone(&store),
            config.autosave_debounce,
        ));
        let queue = Arc::new(GenerationQueue::new(
            transport,
            workspace.clone(),
            Arc::clone(&store),
            Arc::clone(&persistence),
            Arc::clone(&notices),
        ));
        let history = Arc::new(HistoryRecorder::new(
            workspace.clone(),
            config.history_debounce,
        ));

        queue.start(shutdown.child_token());
        persistence.start(shutdown.child_token());
        history.start(shutdown.child_token());

        AppState {
            config: Arc::new(config),
            store,
            workspace,
            queue,
            persistence,
            history,
            notices,
            shutdown,
        }
    }

    /// Stops the background workers. Any in-flight generation is cancelled.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
