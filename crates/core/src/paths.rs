//! Centralized path functions for all on-disk job state.
//!
//! Single source of truth for the snapshot file and artifact directory layout.

use std::path::{Path, PathBuf};

/// Snapshot file name inside the data directory.
pub const SNAPSHOT_FILE: &str = "jobs.json";

/// Artifact directory name inside the data directory.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Default data root: `~/.local/share/jobwatch/` (Linux) or `~/Library/Application Support/jobwatch/` (macOS).
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("jobwatch"))
}

/// Completed-job snapshot: `<data_dir>/jobs.json`.
pub fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SNAPSHOT_FILE)
}

/// Artifact directory: `<data_dir>/artifacts/`.
pub fn artifacts_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(ARTIFACTS_DIR)
}

/// Artifact file for one job: `<artifacts_dir>/<job_id>.json`.
///
/// Returns `None` for ids that are not safe to use as a file name.
pub fn artifact_path(artifacts_dir: &Path, job_id: &str) -> Option<PathBuf> {
    let safe = !job_id.is_empty()
        && job_id.len() <= 128
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    safe.then(|| artifacts_dir.join(format!("{job_id}.json")))
}
