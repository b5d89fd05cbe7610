//! NoteTree engine service: generation queue, persistence, undo history and
//! the HTTP/JSON API used by the canvas front end.
//!
//! The pure graph logic lives in `notetree-core` and storage in
//! `notetree-storage`. This crate wires them together with the async parts:
//! a single-worker [`queue::GenerationQueue`] streaming replies from an
//! [`transport::AiTransport`], the debounced autosave in [`persistence`], and
//! the undo/redo recorder in [`history`]. All of them share one
//! [`workspace::WorkspaceHandle`] holding the active project and its graph.

pub mod config;
pub mod error;
pub mod handlers;
pub mod history;
pub mod llm_provider;
pub mod notices;
pub mod persistence;
pub mod queue;
pub mod router;
pub mod schema;
pub mod service;
pub mod state;
pub mod transport;
pub mod workspace;
