// crates/server/src/jobs/types.rs
//! Types for the background job runner.

use std::time::Duration;

use jobwatch_core::StoreError;
use thiserror::Error;

/// Progress added on every tick.
pub const PROGRESS_STEP: u8 = 5;

/// Progress value at which a job's results artifact is stored.
pub const ARTIFACT_MILESTONE: u8 = 50;

/// Default time between ticks.
pub const DEFAULT_TICK: Duration = Duration::from_secs(3);

/// Scheduling parameters shared by every runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    pub tick: Duration,
    pub step: u8,
    pub artifact_at: u8,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            step: PROGRESS_STEP,
            artifact_at: ARTIFACT_MILESTONE,
        }
    }
}

impl RunnerConfig {
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }
}

/// Why a cancel request could not be honoured.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CancelError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already finished: {0}")]
    AlreadyFinished(String),
}

/// Why a job could not be started.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Invalid(#[from] StoreError),

    #[error("Job runner is shutting down")]
    ShuttingDown,
}
