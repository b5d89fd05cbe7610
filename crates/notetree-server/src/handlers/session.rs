//! Save, undo/redo, notices and queue status handlers.

use axum::extract::State;
use axum::Json;

use crate::error::ApiError;
use crate::queue::QueueStats;
use crate::schema::session::{HistoryResponse, NoticesResponse, SaveStatusResponse};
use crate::state::AppState;

/// `GET /save`
pub async fn save_status(State(state): State<AppState>) -> Json<SaveStatusResponse> {
    Json(SaveStatusResponse {
        status: state.save_status(),
    })
}

/// Saves now instead of waiting for the autosave.
///
/// `POST /save`
pub async fn force_save(
    State(state): State<AppState>,
) -> Result<Json<SaveStatusResponse>, ApiError> {
    let status = state.force_save().await?;
    Ok(Json(SaveStatusResponse { status }))
}

/// `POST /undo`
pub async fn undo(State(state): State<AppState>) -> Json<HistoryResponse> {
    let changed = state.undo().await;
    Json(HistoryResponse {
        changed,
        depth: state.history_depth().await,
    })
}

/// `POST /redo`
pub async fn redo(State(state): State<AppState>) -> Json<HistoryResponse> {
    let changed = state.redo().await;
    Json(HistoryResponse {
        changed,
        depth: state.history_depth().await,
    })
}

/// Returns and clears pending notices.
///
/// `POST /notices/drain`
pub async fn drain_notices(State(state): State<AppState>) -> Json<NoticesResponse> {
    Json(NoticesResponse {
        notices: state.drain_notices().await,
    })
}

/// `GET /queue`
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.queue_stats().await)
}
