//! Save status, history, notices and queue types.

use serde::Serialize;

use crate::history::HistoryDepth;
use crate::notices::Notice;
use crate::persistence::SaveStatus;

#[derive(Debug, Clone, Serialize)]
pub struct SaveStatusResponse {
    pub status: SaveStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    /// False when there was nothing to undo or redo.
    pub changed: bool,
    pub depth: HistoryDepth,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoticesResponse {
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayoutResponse {
    pub moved: usize,
}
