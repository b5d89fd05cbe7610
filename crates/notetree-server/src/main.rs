//! Binary entrypoint for the NoteTree HTTP server.
//!
//! Configuration comes from `NOTETREE_*` environment variables; see
//! [`ServerConfig::from_env`].

use std::process::ExitCode;

use notetree_server::config::ServerConfig;
use notetree_server::router::build_router;
use notetree_server::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("invalid configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let addr = format!("0.0.0.0:{}", config.port);

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(err) => {
            tracing::error!("failed to initialize application state: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let app = build_router(state.clone());

    tracing::info!("notetree server starting on {}", addr);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind {}: {}", addr, err);
            return ExitCode::FAILURE;
        }
    };

    let shutdown_state = state.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down, saving active project");
            if let Err(err) = shutdown_state.force_save().await {
                tracing::error!("final save failed: {}", err);
            }
            shutdown_state.shutdown();
        })
        .await;

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("server error: {}", err);
            ExitCode::FAILURE
        }
    }
}
