// crates/server/src/lib.rs
//! Jobwatch server library.
//!
//! Axum HTTP server that runs background jobs, persists finished ones, and
//! pushes lifecycle events to WebSocket and SSE observers.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::*;
pub use crate::metrics::init_metrics;
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, jobs, ws) and `/metrics`
/// - CORS (allows any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
