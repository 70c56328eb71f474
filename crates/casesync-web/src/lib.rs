//! casesync web server
//!
//! Axum router exposing the manual sync trigger.

pub mod routes;
pub mod state;

use axum::{routing::get, Router};
use casesync_graph::SyncEngine;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/hello", get(routes::sync::hello))
        .route("/start-sync", get(routes::sync::start_sync))
        .route("/status", get(routes::sync::status))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the web server.
pub async fn run_server(engine: Arc<SyncEngine>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(AppState::new(engine));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("Web server listening on http://{}:{}", host, port);

    axum::serve(listener, app).await?;
    Ok(())
}
