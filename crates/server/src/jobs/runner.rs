// crates/server/src/jobs/runner.rs
//! Central job runner that schedules and tracks one task per active job.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::FutureExt;
use jobwatch_core::{
    Job, JobEvent, JobId, JobLogLine, JobStatus, JobStore, LogLevel, NewJob, Outcome,
    SnapshotStore,
};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::types::{CancelError, RunnerConfig, StartError};
use super::work::JobWork;
use crate::broadcast::Broadcaster;
use crate::metrics;

/// Everything a runner task needs, shared by all of them.
#[derive(Clone)]
struct Shared {
    store: Arc<JobStore>,
    persistence: Arc<SnapshotStore>,
    broadcaster: Broadcaster,
    work: Arc<dyn JobWork>,
    config: RunnerConfig,
    handles: Arc<DashMap<JobId, CancellationToken>>,
}

enum Tick {
    Continue,
    Done,
}

/// Central job runner.
///
/// Call `start` to create a job and spawn its runner; `cancel` to stop one
/// job; `shutdown` to stop every runner and wait for them to exit.
pub struct JobRunner {
    shared: Shared,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl JobRunner {
    pub fn new(
        store: Arc<JobStore>,
        persistence: Arc<SnapshotStore>,
        broadcaster: Broadcaster,
        work: Arc<dyn JobWork>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            shared: Shared {
                store,
                persistence,
                broadcaster,
                work,
                config,
                handles: Arc::new(DashMap::new()),
            },
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.shared.store
    }

    pub fn persistence(&self) -> &Arc<SnapshotStore> {
        &self.shared.persistence
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.shared.broadcaster
    }

    /// Number of runner tasks still scheduled.
    pub fn running(&self) -> usize {
        self.shared.handles.len()
    }

    /// Create a job and spawn its runner.
    pub fn start(&self, req: NewJob) -> Result<Job, StartError> {
        if self.shutdown.is_cancelled() {
            return Err(StartError::ShuttingDown);
        }
        let job = self.shared.store.create(req)?;
        metrics::record_job_started();
        tracing::info!(job_id = %job.id, name = %job.name, job_type = %job.job_type, "Job started");
        self.shared.broadcaster.emit_global(JobEvent::JobStarted(job.clone()));

        let token = self.shutdown.child_token();
        self.shared.handles.insert(job.id.clone(), token.clone());
        self.tracker
            .spawn(run_job(self.shared.clone(), job.id.clone(), token));
        Ok(job)
    }

    /// Stop a running job and move it to the `cancelled` state.
    pub async fn cancel(&self, id: &str) -> Result<Job, CancelError> {
        match self.shared.store.get(id) {
            None => return Err(CancelError::NotFound(id.to_string())),
            Some(job) if !job.is_active() => return Err(CancelError::AlreadyFinished(id.to_string())),
            Some(_) => {}
        }
        if let Some((_, token)) = self.shared.handles.remove(id) {
            token.cancel();
        }
        self.shared
            .finalize(id, Outcome::Cancelled)
            .await
            .ok_or_else(|| CancelError::AlreadyFinished(id.to_string()))
    }

    /// Stop every runner and wait for all of them to exit. Jobs stopped this
    /// way stay active in memory; they are not persisted.
    pub async fn shutdown(&self) {
        let running = self.running();
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!(stopped = running, "All job runners stopped");
    }
}

async fn run_job(shared: Shared, job_id: JobId, cancel: CancellationToken) {
    let tick = shared.config.tick;
    let mut interval = interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut progress = 0u8;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %job_id, "Runner cancelled");
                break;
            }
            _ = interval.tick() => {}
        }
        match shared.tick(&job_id, &mut progress, &cancel).await {
            Tick::Continue => {}
            Tick::Done => break,
        }
    }
    shared.handles.remove(&job_id);
}

impl Shared {
    /// One scheduling step: do work, advance progress, emit, maybe finish.
    async fn tick(&self, id: &str, progress: &mut u8, cancel: &CancellationToken) -> Tick {
        let Some(job) = self.store.get(id).filter(Job::is_active) else {
            return Tick::Done;
        };
        let next = progress.saturating_add(self.config.step).min(100);

        let step = AssertUnwindSafe(self.work.step(&job, next)).catch_unwind();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Tick::Done,
            result = step => result,
        };
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(reason)) => Some(reason),
            Err(_) => Some("work step panicked".to_string()),
        };
        if let Some(reason) = failure {
            tracing::warn!(job_id = %id, progress = *progress, reason = %reason, "Job step failed");
            self.finalize(id, Outcome::Failed(reason)).await;
            return Tick::Done;
        }

        let Some(job) = self.store.update(id, |j| j.set_progress(next)) else {
            return Tick::Done;
        };
        *progress = next;
        tracing::debug!(job_id = %id, progress = next, "Job progressed");
        self.broadcaster.emit_global(JobEvent::JobUpdated(job.clone()));
        self.broadcaster
            .log(JobLogLine::info(id, format!("Progress: {next}% - {}", job.message)));

        if next == self.config.artifact_at {
            let stored = self.store_artifact(&job).await;
            if cancel.is_cancelled() {
                return Tick::Done;
            }
            match stored {
                Ok(line) => self.broadcaster.log(line),
                Err(reason) => {
                    tracing::warn!(job_id = %id, progress = next, reason = %reason, "Job results failed");
                    self.finalize(id, Outcome::Failed(reason)).await;
                    return Tick::Done;
                }
            }
        }
        if next >= 100 {
            self.finalize(id, Outcome::Completed).await;
            return Tick::Done;
        }
        Tick::Continue
    }

    /// Build and write the results artifact. A panic while building the
    /// payload is an `Err`; a failed write is reported as a `warn` line.
    async fn store_artifact(&self, job: &Job) -> Result<JobLogLine, String> {
        let mut payload = std::panic::catch_unwind(AssertUnwindSafe(|| self.work.results(job)))
            .map_err(|_| "building results panicked".to_string())?;
        if let serde_json::Value::Object(map) = &mut payload {
            map.insert("jobId".to_string(), serde_json::Value::String(job.id.clone()));
        }
        match self.persistence.write_artifact(&job.id, &payload).await {
            Ok(()) => {
                tracing::info!(job_id = %job.id, progress = job.progress, "Job results stored");
                Ok(JobLogLine::info(
                    &job.id,
                    format!("Results stored at {}% milestone", job.progress),
                ))
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to store job results");
                Ok(JobLogLine::new(
                    &job.id,
                    LogLevel::Warn,
                    format!("Failed to store results: {e}"),
                ))
            }
        }
    }

    /// Move a job to its terminal state, flush the snapshot, then notify.
    /// Returns `None` if someone else already finished the job.
    async fn finalize(&self, id: &str, outcome: Outcome) -> Option<Job> {
        let job = match self.store.finish(id, outcome) {
            Ok(job) => job,
            Err(e) => {
                tracing::debug!(job_id = %id, error = %e, "Job already finalized");
                return None;
            }
        };
        let elapsed = job
            .end_time()
            .map(|end| (end - job.start_time).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or_default();
        metrics::record_job_finished(job.status.as_str(), elapsed);

        if let Err(e) = self.persistence.flush(&self.store).await {
            metrics::record_snapshot_failure();
            tracing::error!(job_id = %id, error = %e, "Failed to persist completed jobs");
        }

        let line = match &job.status {
            JobStatus::Failed { error, .. } => {
                JobLogLine::new(id, LogLevel::Error, format!("Job failed: {error}"))
            }
            JobStatus::Cancelled { .. } => JobLogLine::new(id, LogLevel::Warn, "Job cancelled"),
            _ => JobLogLine::new(
                id,
                LogLevel::Success,
                format!("Job completed in {}", job.duration().unwrap_or("0 seconds")),
            ),
        };
        self.broadcaster.emit_global(JobEvent::JobCompleted(job.clone()));
        self.broadcaster.log(line);
        tracing::info!(
            job_id = %id,
            status = job.status.as_str(),
            duration = job.duration().unwrap_or_default(),
            "Job finished"
        );
        Some(job)
    }
}
