// crates/server/src/routes/ws.rs
//! WebSocket subscription surface.
//!
//! Every connected socket receives global lifecycle events. Clients send
//! `{"type":"join","jobId":"..."}` to also receive that job's log lines, and
//! `{"type":"leave","jobId":"..."}` to stop.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broadcast::{catch_up_lines, ObserverId};
use crate::jobs::JobRunner;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Join {
        #[serde(rename = "jobId")]
        job_id: String,
    },
    Leave {
        #[serde(rename = "jobId")]
        job_id: String,
    },
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let mut subscription = state.jobs.broadcaster().connect();
    let observer = subscription.id();
    info!(observer, "observer connected");

    // Error replies from the read loop share the socket sink with job events.
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

    let forward_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                Some(event) = subscription.recv() => match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize job event");
                        continue;
                    }
                },
                Some(reply) = reply_rx.recv() => reply,
                else => break,
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                if let Err(reason) = apply_client_message(&state.jobs, observer, text.as_str()) {
                    let reply = serde_json::json!({
                        "event": "error",
                        "data": { "message": reason },
                    });
                    let _ = reply_tx.send(reply.to_string());
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Dropping the subscription inside the task discards room memberships.
    forward_task.abort();
    info!(observer, "observer disconnected");
}

/// Apply one client control message. Malformed input is logged and
/// returned as an error; it never closes the connection.
pub(crate) fn apply_client_message(jobs: &JobRunner, observer: ObserverId, text: &str) -> Result<(), String> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Join { job_id }) => {
            let job = jobs.store().get(&job_id);
            if !jobs.broadcaster().join(observer, &job_id, catch_up_lines(job.as_ref())) {
                return Err("observer is not connected".to_string());
            }
            debug!(observer, job_id = %job_id, known = job.is_some(), "joined job room");
            Ok(())
        }
        Ok(ClientMessage::Leave { job_id }) => {
            jobs.broadcaster().leave(observer, &job_id);
            Ok(())
        }
        Err(e) => {
            warn!(observer, error = %e, "Rejected malformed subscription message");
            Err(format!("invalid subscription message: {e}"))
        }
    }
}

/// Build the WebSocket router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::jobs::{RunnerConfig, SimulatedCrawl};
    use jobwatch_core::{JobEvent, JobStore, NewJob, SnapshotStore};
    use std::time::Duration;

    fn runner(dir: &std::path::Path) -> JobRunner {
        JobRunner::new(
            Arc::new(JobStore::new()),
            Arc::new(SnapshotStore::new(dir)),
            Broadcaster::new(),
            Arc::new(SimulatedCrawl),
            RunnerConfig::with_tick(Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_join_with_catch_up_at_forty_percent() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = runner(dir.path());
        let job = jobs.store().create(NewJob::named("Crawl X")).unwrap();
        jobs.store().update(&job.id, |j| j.set_progress(40));

        let mut sub = jobs.broadcaster().connect();
        let msg = format!(r#"{{"type":"join","jobId":"{}"}}"#, job.id);
        apply_client_message(&jobs, sub.id(), &msg).unwrap();

        let events: Vec<JobEvent> = std::iter::from_fn(|| sub.try_recv()).collect();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, JobEvent::JobLog(_))));
        assert_eq!(jobs.broadcaster().room_size(&job.id), 1);
    }

    #[test]
    fn test_join_unknown_job_has_no_catch_up() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = runner(dir.path());
        let mut sub = jobs.broadcaster().connect();

        apply_client_message(&jobs, sub.id(), r#"{"type":"join","jobId":"later"}"#).unwrap();
        assert!(sub.try_recv().is_none());
        assert_eq!(jobs.broadcaster().room_size("later"), 1);
    }

    #[test]
    fn test_malformed_messages_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = runner(dir.path());
        let sub = jobs.broadcaster().connect();

        for bad in [
            r#"{"type":"join","jobId":42}"#,
            r#"{"type":"join","jobId":null}"#,
            r#"{"type":"join"}"#,
            r#"{"type":"subscribe","jobId":"x"}"#,
            "not json",
        ] {
            assert!(apply_client_message(&jobs, sub.id(), bad).is_err(), "accepted {bad}");
        }
        assert_eq!(jobs.broadcaster().observer_count(), 1);
    }

    #[test]
    fn test_leave_message() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = runner(dir.path());
        let sub = jobs.broadcaster().connect();

        apply_client_message(&jobs, sub.id(), r#"{"type":"join","jobId":"j1"}"#).unwrap();
        apply_client_message(&jobs, sub.id(), r#"{"type":"leave","jobId":"j1"}"#).unwrap();
        assert_eq!(jobs.broadcaster().room_size("j1"), 0);
    }
}
