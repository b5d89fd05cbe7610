//! Router assembly for the NoteTree HTTP API.
//!
//! [`build_router`] wires all handler functions to their routes with CORS and
//! tracing middleware layers. Routes use axum 0.8 `/{param}` path syntax.

use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Projects
        .route(
            "/projects",
            get(handlers::projects::list_projects).post(handlers::projects::create_project),
        )
        .route("/projects/active", get(handlers::projects::active_project))
        .route("/projects/close", post(handlers::projects::close_project))
        .route(
            "/projects/{id}",
            patch(handlers::projects::update_project).delete(handlers::projects::delete_project),
        )
        .route("/projects/{id}/open", post(handlers::projects::open_project))
        // Graph of the active project
        .route("/graph", get(handlers::nodes::get_graph))
        .route("/graph/roots", post(handlers::nodes::add_root))
        .route("/graph/remove-orphans", post(handlers::nodes::remove_orphans))
        .route("/graph/remove-empty", post(handlers::nodes::remove_empty_nodes))
        .route("/graph/relayout", post(handlers::nodes::relayout))
        // Nodes
        .route("/nodes/{id}", delete(handlers::nodes::delete_node))
        .route("/nodes/{id}/subtree", delete(handlers::nodes::delete_subtree))
        .route("/nodes/{id}/branch", post(handlers::nodes::branch))
        .route("/nodes/{id}/reply", post(handlers::nodes::reply))
        .route("/nodes/{id}/stop", post(handlers::nodes::stop_generation))
        .route("/nodes/{id}/text", put(handlers::nodes::edit_text))
        .route("/nodes/{id}/position", put(handlers::nodes::move_node))
        .route("/nodes/{id}/size", put(handlers::nodes::resize_node))
        .route("/nodes/{id}/selected", put(handlers::nodes::select_node))
        .route("/nodes/{id}/dragging", put(handlers::nodes::set_dragging))
        // Session
        .route(
            "/save",
            get(handlers::session::save_status).post(handlers::session::force_save),
        )
        .route("/undo", post(handlers::session::undo))
        .route("/redo", post(handlers::session::redo))
        .route("/notices/drain", post(handlers::session::drain_notices))
        .route("/queue", get(handlers::session::queue_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
