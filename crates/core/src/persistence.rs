// crates/core/src/persistence.rs
//! Durable snapshot of the completed-job set plus per-job artifact files.
//!
//! Layout under the data directory:
//! - `jobs.json` - `{ "jobs": [Job, ...] }`, most-recent-first
//! - `artifacts/<job_id>.json` - arbitrary JSON payload per job

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::PersistError;
use crate::paths;
use crate::store::JobStore;
use crate::types::Job;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    jobs: Vec<Job>,
}

/// Retry schedule for snapshot writes: `attempts` tries, doubling the delay each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// File-backed persistence for completed jobs and artifacts.
pub struct SnapshotStore {
    snapshot_path: PathBuf,
    artifacts_dir: PathBuf,
    /// Serializes read-completed-set / serialize / write so concurrent
    /// completions cannot overwrite each other's records.
    write_lock: Mutex<()>,
    retry: RetryPolicy,
}

impl SnapshotStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            snapshot_path: paths::snapshot_path(data_dir),
            artifacts_dir: paths::artifacts_dir(data_dir),
            write_lock: Mutex::new(()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load the completed set, creating an empty snapshot if none exists yet.
    pub async fn load_or_init(&self) -> Result<Vec<Job>, PersistError> {
        let exists = tokio::fs::try_exists(&self.snapshot_path)
            .await
            .map_err(|e| PersistError::io(&self.snapshot_path, e))?;

        if !exists {
            let _guard = self.write_lock.lock().await;
            write_json_atomic(&self.snapshot_path, &Snapshot::default()).await?;
            tracing::info!(path = %self.snapshot_path.display(), "Created empty job snapshot");
            return Ok(Vec::new());
        }

        let bytes = tokio::fs::read(&self.snapshot_path)
            .await
            .map_err(|e| PersistError::io(&self.snapshot_path, e))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| PersistError::json(&self.snapshot_path, e))?;
        tracing::info!(
            path = %self.snapshot_path.display(),
            jobs = snapshot.jobs.len(),
            "Loaded job snapshot"
        );
        Ok(snapshot.jobs)
    }

    /// Like [`load_or_init`](Self::load_or_init), but a failure is logged and
    /// treated as an empty completed set so startup can continue.
    pub async fn load_or_empty(&self) -> Vec<Job> {
        match self.load_or_init().await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load job snapshot, starting empty");
                Vec::new()
            }
        }
    }

    /// Rewrite the snapshot with the store's current completed set.
    ///
    /// The completed set is read after the write lock is taken, so the last
    /// flush to finish always reflects every completion that preceded it.
    /// Returns the number of jobs written.
    pub async fn flush(&self, store: &JobStore) -> Result<usize, PersistError> {
        let _guard = self.write_lock.lock().await;
        let snapshot = Snapshot {
            jobs: store.completed(),
        };

        let mut attempt = 0;
        loop {
            match write_json_atomic(&self.snapshot_path, &snapshot).await {
                Ok(()) => {
                    tracing::debug!(jobs = snapshot.jobs.len(), "Job snapshot written");
                    return Ok(snapshot.jobs.len());
                }
                Err(e) if attempt + 1 < self.retry.attempts => {
                    let delay = self.retry.base_delay * 2u32.pow(attempt);
                    tracing::warn!(error = %e, attempt = attempt + 1, ?delay, "Snapshot write failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn write_artifact(&self, job_id: &str, payload: &serde_json::Value) -> Result<(), PersistError> {
        let path = paths::artifact_path(&self.artifacts_dir, job_id).ok_or_else(|| {
            PersistError::io(
                &self.artifacts_dir,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("unsafe job id: {job_id}")),
            )
        })?;
        write_json_atomic(&path, payload).await
    }

    /// Read a job's artifact. `Ok(None)` when none was ever written.
    pub async fn read_artifact(&self, job_id: &str) -> Result<Option<serde_json::Value>, PersistError> {
        let Some(path) = paths::artifact_path(&self.artifacts_dir, job_id) else {
            return Ok(None);
        };
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistError::io(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PersistError::json(&path, e))
    }
}

/// Write `value` as pretty JSON via a sibling temp file and rename.
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| PersistError::json(path, e))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PersistError::io(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| PersistError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| PersistError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewJob, Outcome};
    use std::sync::Arc;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_load_creates_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let persist = SnapshotStore::new(dir.path());

        let jobs = persist.load_or_init().await.unwrap();
        assert!(jobs.is_empty());

        let raw = std::fs::read_to_string(dir.path().join("jobs.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json, serde_json::json!({ "jobs": [] }));
    }

    #[tokio::test]
    async fn test_flush_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new();
        let persist = SnapshotStore::new(dir.path());
        persist.load_or_init().await.unwrap();

        let job = store.create(NewJob::named("Crawl X")).unwrap();
        let done = store.finish(&job.id, Outcome::Completed).unwrap();
        assert_eq!(persist.flush(&store).await.unwrap(), 1);

        let reloaded = SnapshotStore::new(dir.path()).load_or_init().await.unwrap();
        assert_eq!(reloaded, vec![done]);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("jobs.json"), b"{not json").unwrap();
        let persist = SnapshotStore::new(dir.path());

        assert!(matches!(
            persist.load_or_init().await,
            Err(PersistError::Json { .. })
        ));
        assert!(persist.load_or_empty().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_flushes_keep_every_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::new());
        let persist = Arc::new(SnapshotStore::new(dir.path()));

        let a = store.create(NewJob::named("a")).unwrap();
        let b = store.create(NewJob::named("b")).unwrap();

        let tasks: Vec<_> = [a.id.clone(), b.id.clone()]
            .into_iter()
            .map(|id| {
                let store = Arc::clone(&store);
                let persist = Arc::clone(&persist);
                tokio::spawn(async move {
                    store.finish(&id, Outcome::Completed).unwrap();
                    persist.flush(&store).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let ids: Vec<String> = persist
            .load_or_init()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.id));
        assert!(ids.contains(&b.id));
    }

    #[tokio::test]
    async fn test_flush_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the data directory should be.
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();
        let persist = SnapshotStore::new(&blocker).with_retry(fast_retry());

        let store = JobStore::new();
        assert!(matches!(
            persist.flush(&store).await,
            Err(PersistError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_artifact_roundtrip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let persist = SnapshotStore::new(dir.path());

        assert_eq!(persist.read_artifact("abc123").await.unwrap(), None);
        assert_eq!(persist.read_artifact("../jobs").await.unwrap(), None);

        let payload = serde_json::json!({ "jobId": "abc123", "pages": 12 });
        persist.write_artifact("abc123", &payload).await.unwrap();
        assert_eq!(persist.read_artifact("abc123").await.unwrap(), Some(payload));
        assert!(dir.path().join("artifacts/abc123.json").exists());
    }
}
