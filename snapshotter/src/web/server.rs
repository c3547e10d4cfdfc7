// File: snapshotter/src/web/server.rs
use crate::web::{handlers, AppState};
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub async fn start_web_server(listen_addr: &str, state: AppState) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP server to {}: {}", listen_addr, e))?;
    tracing::info!("Server running on http://{}", listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === READ ROUTES ===
        .route("/api/v1/runs", get(handlers::list_runs))
        .route("/api/v1/runs/{id}", get(handlers::get_run))
        .route("/api/v1/targets", get(handlers::list_targets))
        .route("/api/v1/targets/{id}", get(handlers::get_target))
        .route("/api/v1/status", get(handlers::get_status))
        // === PERSISTENCE ROUTES (TOKEN REQUIRED) ===
        .route("/api/v1/runs/{id}/persist", post(handlers::persist_run))
        .route("/api/v1/runs/{id}/unpersist", post(handlers::unpersist_run))
        .route("/api/v1/targets/{id}/persist", post(handlers::persist_target))
        .route(
            "/api/v1/targets/{id}/unpersist",
            post(handlers::unpersist_target),
        )
        // Add middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
