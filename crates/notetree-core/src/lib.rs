//! Tree-state engine for branching AI conversations.
//!
//! A conversation is a forest of [`ChatNode`]s (user prompts and assistant
//! replies) connected by parent→child [`ChatEdge`]s. This crate owns the
//! canonical graph and every pure algorithm that runs over it:
//!
//! - [`graph`]: [`ConversationGraph`], the structural mutation API
//! - [`context`]: prompt-context selection for the next assistant reply
//! - [`layout`]: size-aware auto-layout of the whole forest
//!
//! Nothing here performs I/O. Persistence lives in `notetree-storage`, and
//! generation/autosave orchestration lives in `notetree-server`.

pub mod context;
pub mod error;
pub mod graph;
pub mod id;
pub mod layout;
pub mod node;

// Re-export commonly used types
pub use context::{select_context, ContextMessage, ContextSnapshot, Role};
pub use error::CoreError;
pub use graph::{ConversationGraph, GraphSnapshot};
pub use id::{EdgeId, NodeId};
pub use node::{ChatEdge, ChatNode, NodeKind, Position, Size, UiFlags};
