//! Graph and node handlers.

use axum::extract::{Path, State};
use axum::Json;

use notetree_core::{NodeId, Position, Size};

use crate::error::ApiError;
use crate::schema::nodes::{
    AddRootRequest, BranchRequest, EditTextRequest, FlagRequest, MoveRequest, NodeResponse,
    RemovedResponse, ResizeRequest,
};
use crate::schema::session::RelayoutResponse;
use crate::service::GraphView;
use crate::state::AppState;

fn ok() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true }))
}

/// `GET /graph`
pub async fn get_graph(State(state): State<AppState>) -> Result<Json<GraphView>, ApiError> {
    Ok(Json(state.graph().await?))
}

/// `POST /graph/roots`
pub async fn add_root(
    State(state): State<AppState>,
    Json(req): Json<AddRootRequest>,
) -> Result<Json<NodeResponse>, ApiError> {
    let node = state.add_root(req.kind, &req.text).await?;
    Ok(Json(NodeResponse { node }))
}

/// `POST /nodes/{id}/branch`
pub async fn branch(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
    Json(req): Json<BranchRequest>,
) -> Result<Json<NodeResponse>, ApiError> {
    let node = state.branch(id, req.kind).await?;
    Ok(Json(NodeResponse { node }))
}

/// Adds an assistant reply under the node and queues its generation.
///
/// `POST /nodes/{id}/reply`
pub async fn reply(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> Result<Json<NodeResponse>, ApiError> {
    let node = state.add_ai_child(id).await?;
    Ok(Json(NodeResponse { node }))
}

/// `DELETE /nodes/{id}`
pub async fn delete_node(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> Result<Json<RemovedResponse>, ApiError> {
    let removed = state.delete_node(id).await?;
    Ok(Json(RemovedResponse { removed }))
}

/// `DELETE /nodes/{id}/subtree`
pub async fn delete_subtree(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> Result<Json<RemovedResponse>, ApiError> {
    let removed = state.delete_subtree(id).await?;
    Ok(Json(RemovedResponse { removed }))
}

/// `PUT /nodes/{id}/text`
pub async fn edit_text(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
    Json(req): Json<EditTextRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.edit_text(id, &req.text).await?;
    Ok(ok())
}

/// `PUT /nodes/{id}/position`
pub async fn move_node(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.move_node(id, Position::new(req.x, req.y)).await?;
    Ok(ok())
}

/// `PUT /nodes/{id}/size`
pub async fn resize_node(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
    Json(req): Json<ResizeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !(req.width > 0.0 && req.height > 0.0) {
        return Err(ApiError::BadRequest("size must be positive".into()));
    }
    state.resize_node(id, Size::new(req.width, req.height)).await?;
    Ok(ok())
}

/// `PUT /nodes/{id}/selected`
pub async fn select_node(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
    Json(req): Json<FlagRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.select_node(id, req.value).await?;
    Ok(ok())
}

/// `PUT /nodes/{id}/dragging`
pub async fn set_dragging(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
    Json(req): Json<FlagRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.set_dragging(id, req.value).await?;
    Ok(ok())
}

/// `POST /nodes/{id}/stop`
pub async fn stop_generation(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.stop_generation(id).await?;
    Ok(ok())
}

/// `POST /graph/remove-orphans`
pub async fn remove_orphans(
    State(state): State<AppState>,
) -> Result<Json<RemovedResponse>, ApiError> {
    let removed = state.remove_orphans().await?;
    Ok(Json(RemovedResponse { removed }))
}

/// `POST /graph/remove-empty`
pub async fn remove_empty_nodes(
    State(state): State<AppState>,
) -> Result<Json<RemovedResponse>, ApiError> {
    let removed = state.remove_empty_nodes().await?;
    Ok(Json(RemovedResponse { removed }))
}

/// `POST /graph/relayout`
pub async fn relayout(
    State(state): State<AppState>,
) -> Result<Json<RelayoutResponse>, ApiError> {
    let moved = state.relayout().await?;
    Ok(Json(RelayoutResponse { moved }))
}
