//! HTTP API surface
//!
//! Axum router, request handlers, and the serve loop.

mod handlers;
mod routes;
mod server;
mod types;

pub use handlers::AppState;
pub use routes::create_router;
pub use server::HttpServer;
pub use types::{
    BatchFetchRequest, BatchFetchResponse, BrowserHealth, CacheHealth, ErrorResponse,
    HealthResponse,
};
