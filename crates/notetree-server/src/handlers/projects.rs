//! Project management handlers (create, list, open, update, delete).

use axum::extract::{Path, State};
use axum::Json;

use notetree_storage::{ProjectId, ProjectUpdate};

use crate::error::ApiError;
use crate::schema::projects::{
    ActiveProjectResponse, CreateProjectRequest, ProjectListResponse, ProjectResponse,
};
use crate::service::GraphView;
use crate::state::AppState;

/// `GET /projects`
pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<ProjectListResponse>, ApiError> {
    let projects = state.list_projects().await?;
    Ok(Json(ProjectListResponse { projects }))
}

/// Creates a project and makes it the active one.
///
/// `POST /projects`
pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = state
        .create_project(&req.name, req.system_prompt.as_deref(), req.model.as_deref())
        .await?;
    Ok(Json(ProjectResponse { project }))
}

/// `GET /projects/active`
pub async fn active_project(State(state): State<AppState>) -> Json<ActiveProjectResponse> {
    Json(ActiveProjectResponse {
        project: state.active_project().await,
    })
}

/// `POST /projects/{id}/open`
pub async fn open_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
) -> Result<Json<GraphView>, ApiError> {
    state.open_project(id).await?;
    Ok(Json(state.graph().await?))
}

/// `POST /projects/close`
pub async fn close_project(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.close_project().await;
    Json(serde_json::json!({ "success": true }))
}

/// Renames a project or changes its system prompt or model.
///
/// `PATCH /projects/{id}`
pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
    Json(update): Json<ProjectUpdate>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = state.update_project(id, &update).await?;
    Ok(Json(ProjectResponse { project }))
}

/// `DELETE /projects/{id}`
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.delete_project(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
