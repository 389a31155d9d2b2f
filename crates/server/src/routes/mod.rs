//! API route handlers for the jobwatch server.

pub mod health;
pub mod jobs;
pub mod metrics;
pub mod ws;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router.
///
/// Routes:
/// - GET  /api/health - Health check
/// - GET  /api/jobs - Active and completed jobs
/// - POST /api/jobs - Create a job
/// - GET  /api/jobs/stream - SSE stream of job lifecycle events
/// - GET  /api/jobs/{id} - One job
/// - GET  /api/jobs/{id}/artifact - Stored results for a job
/// - POST /api/jobs/{id}/cancel - Cancel a running job
/// - GET  /api/ws - WebSocket with job events and room subscriptions
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .nest("/api", ws::router())
        .merge(metrics::router())
        .with_state(state)
}
