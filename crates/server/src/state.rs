// crates/server/src/state.rs
//! Application state for the Axum server.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use jobwatch_core::{JobStore, SnapshotStore};

use crate::broadcast::Broadcaster;
use crate::jobs::{JobRunner, JobWork, RunnerConfig, SimulatedCrawl};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Job runner; owns the store, persistence and broadcaster handles.
    pub jobs: Arc<JobRunner>,
}

impl AppState {
    pub fn new(jobs: Arc<JobRunner>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            jobs,
        })
    }

    /// Load the completed-job snapshot from `data_dir` and wire up the runner
    /// with the simulated crawl workload.
    pub async fn open(data_dir: &Path, config: RunnerConfig) -> Arc<Self> {
        Self::open_with_work(data_dir, config, Arc::new(SimulatedCrawl)).await
    }

    pub async fn open_with_work(data_dir: &Path, config: RunnerConfig, work: Arc<dyn JobWork>) -> Arc<Self> {
        let persistence = Arc::new(SnapshotStore::new(data_dir));
        let store = Arc::new(JobStore::new());
        store.hydrate(persistence.load_or_empty().await);

        let runner = JobRunner::new(store, persistence, Broadcaster::new(), work, config);
        Self::new(Arc::new(runner))
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwatch_core::{NewJob, Outcome};

    #[tokio::test]
    async fn test_open_creates_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::open(dir.path(), RunnerConfig::default()).await;

        assert!(state.uptime_secs() < 5);
        assert!(dir.path().join("jobs.json").exists());
        assert_eq!(state.jobs.store().counts().completed, 0);
    }

    #[tokio::test]
    async fn test_open_rehydrates_completed_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let first = AppState::open(dir.path(), RunnerConfig::default()).await;
        let store = first.jobs.store();
        let job = store.create(NewJob::named("Crawl X")).unwrap();
        let done = store.finish(&job.id, Outcome::Completed).unwrap();
        first.jobs.persistence().flush(store).await.unwrap();

        let second = AppState::open(dir.path(), RunnerConfig::default()).await;
        assert_eq!(second.jobs.store().get(&job.id), Some(done));
    }
}
