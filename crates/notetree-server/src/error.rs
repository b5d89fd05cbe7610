//! API error types with HTTP status code mapping.
//!
//! [`ApiError`] is the unified error type for all user-facing operations. It
//! implements `axum::response::IntoResponse` to produce structured JSON error
//! responses with appropriate HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use notetree_core::CoreError;
use notetree_storage::StorageError;

use crate::config::ConfigError;

/// Structured error detail in API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "CONFLICT").
    pub code: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Entity not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request is valid but the current state forbids it (409), e.g.
    /// branching from a node that is still generating.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500).
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let detail = ApiErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
        };
        let body = serde_json::json!({
            "success": false,
            "error": detail,
        });
        (status, axum::Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::NodeNotFound { .. } => ApiError::NotFound(err.to_string()),
            CoreError::DuplicateNode { .. } | CoreError::DuplicateEdge { .. } => {
                ApiError::Conflict(err.to_string())
            }
            CoreError::StructuralViolation { .. } => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::ProjectNotFound(_) | StorageError::NodeNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            StorageError::IntegrityError { .. } => ApiError::Conflict(err.to_string()),
            _ => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notetree_core::NodeId;
    use notetree_storage::ProjectId;

    #[test]
    fn error_envelope_shape() {
        let response = ApiError::Conflict("busy".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn seam_conversions() {
        let not_found: ApiError = CoreError::NodeNotFound { id: NodeId::new() }.into();
        assert!(matches!(not_found, ApiError::NotFound(_)));

        let structural: ApiError = CoreError::StructuralViolation {
            reason: "cycle".into(),
        }
        .into();
        assert!(matches!(structural, ApiError::BadRequest(_)));

        let missing: ApiError = StorageError::ProjectNotFound(ProjectId::new()).into();
        assert!(matches!(missing, ApiError::NotFound(_)));

        let db: ApiError = StorageError::Migration("boom".into()).into();
        assert!(matches!(db, ApiError::InternalError(_)));
    }
}
