// crates/core/src/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque job identifier.
pub type JobId = String;

/// Description used when the caller leaves it out.
pub const DEFAULT_DESCRIPTION: &str = "No description provided";

/// Job type used when the caller leaves it out.
pub const DEFAULT_JOB_TYPE: &str = "crawl";

/// Request body for creating a job. Every field is optional on the wire so a
/// missing `name` surfaces as a validation error rather than a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub job_type: Option<String>,
}

impl NewJob {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Lifecycle state of a job. Serialized as the `status` tag with the
/// variant's fields flattened into the job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed {
        #[serde(rename = "endTime")]
        end_time: DateTime<Utc>,
        duration: String,
    },
    Failed {
        #[serde(rename = "endTime")]
        end_time: DateTime<Utc>,
        duration: String,
        error: String,
    },
    Cancelled {
        #[serde(rename = "endTime")]
        end_time: DateTime<Utc>,
        duration: String,
    },
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed { .. } => "completed",
            JobStatus::Failed { .. } => "failed",
            JobStatus::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    /// Human-readable line for display, derived from the state.
    pub fn describe(&self, progress: u8) -> String {
        match self {
            JobStatus::Running if progress == 0 => "Starting".to_string(),
            JobStatus::Running => format!("Processing data ({progress}%)"),
            JobStatus::Completed { .. } => "Completed".to_string(),
            JobStatus::Failed { error, .. } => format!("Failed: {error}"),
            JobStatus::Cancelled { .. } => "Cancelled".to_string(),
        }
    }
}

/// How a job left the running state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// One tracked unit of background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(flatten)]
    pub status: JobStatus,
    #[serde(default)]
    pub message: String,
    pub progress: u8,
    pub start_time: DateTime<Utc>,
}

impl Job {
    /// Build a freshly started job. `name` must already be validated.
    pub fn start(id: JobId, name: String, description: Option<String>, job_type: Option<String>) -> Self {
        let status = JobStatus::Running;
        Self {
            id,
            name,
            description: description.unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            job_type: job_type.unwrap_or_else(|| DEFAULT_JOB_TYPE.to_string()),
            message: status.describe(0),
            status,
            progress: 0,
            start_time: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Record a new progress value. Values never move backwards and are capped at 100.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
        self.message = self.status.describe(self.progress);
    }

    /// Move the job into a terminal state, stamping end time and duration once.
    /// Calling this on a job that already finished is a no-op.
    pub fn finish(&mut self, outcome: Outcome, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        let end_time = now.max(self.start_time);
        let duration = format_duration_secs(end_time - self.start_time);
        self.status = match outcome {
            Outcome::Completed => {
                self.progress = 100;
                JobStatus::Completed { end_time, duration }
            }
            Outcome::Failed(error) => JobStatus::Failed {
                end_time,
                duration,
                error,
            },
            Outcome::Cancelled => JobStatus::Cancelled { end_time, duration },
        };
        self.message = self.status.describe(self.progress);
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        match &self.status {
            JobStatus::Running => None,
            JobStatus::Completed { end_time, .. }
            | JobStatus::Failed { end_time, .. }
            | JobStatus::Cancelled { end_time, .. } => Some(*end_time),
        }
    }

    pub fn duration(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Running => None,
            JobStatus::Completed { duration, .. }
            | JobStatus::Failed { duration, .. }
            | JobStatus::Cancelled { duration, .. } => Some(duration),
        }
    }
}

/// Format an elapsed time as whole seconds, e.g. `"63 seconds"`.
pub fn format_duration_secs(elapsed: chrono::Duration) -> String {
    let millis = elapsed.num_milliseconds().max(0);
    let secs = (millis as f64 / 1000.0).round() as i64;
    format!("{secs} seconds")
}

/// Snapshot of both job sets, as returned by the listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListing {
    pub active: Vec<Job>,
    pub completed: Vec<Job>,
}

/// Severity of a job log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

/// A log line scoped to one job's room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogLine {
    pub job_id: JobId,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl JobLogLine {
    pub fn new(job_id: impl Into<JobId>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info(job_id: impl Into<JobId>, message: impl Into<String>) -> Self {
        Self::new(job_id, LogLevel::Info, message)
    }
}

/// Real-time event pushed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum JobEvent {
    JobStarted(Job),
    JobUpdated(Job),
    JobCompleted(Job),
    JobLog(JobLogLine),
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::JobStarted(_) => "job-started",
            JobEvent::JobUpdated(_) => "job-updated",
            JobEvent::JobCompleted(_) => "job-completed",
            JobEvent::JobLog(_) => "job-log",
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::JobStarted(job) | JobEvent::JobUpdated(job) | JobEvent::JobCompleted(job) => &job.id,
            JobEvent::JobLog(line) => &line.job_id,
        }
    }
}
