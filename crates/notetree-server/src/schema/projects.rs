//! Project management request/response types.

use notetree_storage::Project;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Falls back to the server's default model.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectResponse {
    pub project: Project,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectListResponse {
    /// Most recently modified first.
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveProjectResponse {
    pub project: Option<Project>,
}
