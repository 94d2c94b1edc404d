use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Page served at `/`, relative to the static directory
pub const RECORDER_PAGE: &str = "realtime.html";

/// Create the HTTP router with all routes
pub fn create_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    let static_dir = static_dir.as_ref();
    let recorder_page = ServeFile::new(static_dir.join(RECORDER_PAGE));
    let static_files = ServeDir::new(static_dir).append_index_html_on_directories(false);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Live audio relay
        .route("/api/v1/ws", get(handlers::relay_socket))
        // Text endpoints
        .route("/api/v1/readability", post(handlers::enhance_readability))
        .route("/api/v1/correctness", post(handlers::check_correctness))
        .route("/api/v1/ask_ai", post(handlers::ask_ai))
        // Recorder page
        .route_service("/", recorder_page)
        .fallback_service(static_files)
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
