//! HTTP handler modules for the NoteTree API.
//!
//! Each sub-module implements thin handlers that parse requests, delegate to
//! the operations on [`AppState`](crate::state::AppState) and return JSON
//! responses. No business logic lives in handlers.

pub mod nodes;
pub mod projects;
pub mod session;
