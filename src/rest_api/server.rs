//! Axum HTTP server for the REST API

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::dispatcher::TaskQueue;
use crate::error::{Error, Result};
use crate::planner::Planner;
use crate::settings::Settings;
use crate::storage::ObjectStore;

use super::handlers;

/// Shared state behind every handler.
pub struct AppState {
    pub planner: Planner,
    pub store: Arc<dyn ObjectStore>,
    pub task_queue: Option<TaskQueue>,
    pub settings: Settings,
}

/// Full planner-service router: planning, health, submissions, dispatch.
pub fn planner_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/run", post(handlers::run_plan))
        .route("/health", get(handlers::health))
        .route("/submit", post(handlers::submit))
        .route("/dispatch", post(handlers::dispatch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Minimal router for the standalone dispatcher binary.
pub fn dispatcher_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/dispatch", post(handlers::dispatch))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve a router until the process is stopped.
pub async fn run_server(router: Router, bind_addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind to {}: {}", bind_addr, e)))?;
    info!("HTTP server listening on {}", bind_addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| Error::Config(format!("server error: {}", e)))?;
    Ok(())
}
