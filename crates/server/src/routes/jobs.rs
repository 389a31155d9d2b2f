// crates/server/src/routes/jobs.rs
//! API routes for job management.
//!
//! - GET  /jobs              - Active and completed jobs
//! - POST /jobs              - Create a job and start its runner
//! - GET  /jobs/stream       - SSE stream of job lifecycle events
//! - GET  /jobs/{id}         - One job
//! - GET  /jobs/{id}/artifact - Results stored at the artifact milestone
//! - POST /jobs/{id}/cancel  - Cancel a running job

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use jobwatch_core::{Job, JobListing, NewJob};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/jobs - List active and completed jobs.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<JobListing> {
    Json(state.jobs.store().list_all())
}

/// POST /api/jobs - Create a job.
async fn create_job(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewJob>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let Json(req) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let job = state.jobs.start(req)?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/jobs/{id} - Fetch one job from either set.
async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<Job>> {
    state
        .jobs
        .store()
        .get(&id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(id))
}

/// GET /api/jobs/{id}/artifact - Fetch the stored results payload.
async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    match state.jobs.persistence().read_artifact(&id).await? {
        Some(payload) => Ok(Json(payload)),
        None => Err(ApiError::ArtifactNotFound(id)),
    }
}

/// POST /api/jobs/{id}/cancel - Stop a running job.
async fn cancel_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<Job>> {
    Ok(Json(state.jobs.cancel(&id).await?))
}

/// GET /api/jobs/stream - SSE stream of all job lifecycle events.
async fn stream_jobs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.jobs.broadcaster().connect();

    let stream = async_stream::stream! {
        let mut subscription = subscription;
        while let Some(event) = subscription.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize job event");
                    continue;
                }
            };
            yield Ok(Event::default().event(event.name()).data(json));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs).post(create_job))
        .route("/jobs/stream", get(stream_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/artifact", get(get_artifact))
        .route("/jobs/{id}/cancel", post(cancel_job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::RunnerConfig;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn test_app(dir: &std::path::Path) -> (Router, Arc<AppState>) {
        // Long tick: jobs stay at 0% for the duration of these tests.
        let state = AppState::open(dir, RunnerConfig::with_tick(Duration::from_secs(60))).await;
        let app = Router::new().nest("/api", router()).with_state(state.clone());
        (app, state)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_list_jobs_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state) = test_app(dir.path()).await;

        let (status, json) = send(app, "GET", "/api/jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "active": [], "completed": [] }));
    }

    #[tokio::test]
    async fn test_create_job_returns_201() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = test_app(dir.path()).await;

        let (status, json) = send(app.clone(), "POST", "/api/jobs", Some(r#"{"name":"Crawl X"}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["status"], "running");
        assert_eq!(json["progress"], 0);
        assert_eq!(json["name"], "Crawl X");

        let id = json["id"].as_str().unwrap().to_string();
        let (status, listing) = send(app, "GET", "/api/jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing["active"][0]["id"], id.as_str());
        state.jobs.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_job_without_name_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = test_app(dir.path()).await;

        let (status, json) = send(app.clone(), "POST", "/api/jobs", Some(r#"{"description":"x"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Bad request");

        let (status, _) = send(app.clone(), "POST", "/api/jobs", Some(r#"{"name":42}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(app, "POST", "/api/jobs", Some("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.jobs.store().counts().active, 0);
    }

    #[tokio::test]
    async fn test_create_after_shutdown_is_503() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = test_app(dir.path()).await;
        state.jobs.shutdown().await;

        let (status, json) = send(app, "POST", "/api/jobs", Some(r#"{"name":"late"}"#)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "Service unavailable");
        assert_eq!(state.jobs.store().counts().active, 0);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state) = test_app(dir.path()).await;

        let (status, json) = send(app.clone(), "GET", "/api/jobs/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Job not found");

        let (status, _) = send(app.clone(), "GET", "/api/jobs/nope/artifact", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(app, "POST", "/api/jobs/nope/cancel", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_artifact_missing_before_milestone() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = test_app(dir.path()).await;

        let (_, job) = send(app.clone(), "POST", "/api/jobs", Some(r#"{"name":"Crawl X"}"#)).await;
        let uri = format!("/api/jobs/{}/artifact", job["id"].as_str().unwrap());
        let (status, json) = send(app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Artifact not found");
        state.jobs.shutdown().await;
    }

    #[tokio::test]
    async fn test_stream_is_event_stream() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = test_app(dir.path()).await;

        let response = app
            .oneshot(Request::builder().uri("/api/jobs/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/event-stream"));
        assert_eq!(state.jobs.broadcaster().observer_count(), 1);

        drop(response);
        assert_eq!(state.jobs.broadcaster().observer_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_job_then_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state) = test_app(dir.path()).await;

        let (_, job) = send(app.clone(), "POST", "/api/jobs", Some(r#"{"name":"Crawl X"}"#)).await;
        let uri = format!("/api/jobs/{}/cancel", job["id"].as_str().unwrap());

        let (status, json) = send(app.clone(), "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "cancelled");
        assert!(json["endTime"].is_string());

        let (status, _) = send(app.clone(), "POST", &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, listing) = send(app, "GET", "/api/jobs", None).await;
        assert_eq!(listing["active"], serde_json::json!([]));
        assert_eq!(listing["completed"][0]["status"], "cancelled");
    }
}
