//! HTTP API route definitions

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/fetch", post(handlers::fetch_page))
        .route("/batch", post(handlers::fetch_batch))
        .route("/health", get(handlers::health))
        .route("/cache/:hash", delete(handlers::invalidate_cache))
        .with_state(state)
}
