//! Route table for the extraction API.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// Uploads can be large; cap the request body well above typical
/// document sizes instead of axum's 2 MB default.
const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/process_files_by_stream",
            post(handlers::process_files_by_stream),
        )
        .route(
            "/process_files_by_path",
            post(handlers::process_files_by_path),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
