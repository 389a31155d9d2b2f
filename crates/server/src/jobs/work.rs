// crates/server/src/jobs/work.rs
//! The unit of work a runner performs on each tick.

use async_trait::async_trait;
use chrono::Utc;
use jobwatch_core::Job;
use serde_json::json;

/// Work driven by a job runner.
///
/// `step` is called once per tick before progress is advanced; an `Err`
/// moves the job to the `failed` state. `results` builds the payload stored
/// when the job crosses the artifact milestone.
#[async_trait]
pub trait JobWork: Send + Sync + 'static {
    async fn step(&self, job: &Job, next_progress: u8) -> Result<(), String>;

    fn results(&self, job: &Job) -> serde_json::Value;
}

/// Placeholder crawl: always succeeds and reports counters derived from progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedCrawl;

#[async_trait]
impl JobWork for SimulatedCrawl {
    async fn step(&self, _job: &Job, _next_progress: u8) -> Result<(), String> {
        Ok(())
    }

    fn results(&self, job: &Job) -> serde_json::Value {
        let progress = u64::from(job.progress);
        json!({
            "jobId": job.id,
            "jobName": job.name,
            "jobType": job.job_type,
            "generatedAt": Utc::now().to_rfc3339(),
            "progress": progress,
            "results": {
                "pagesCrawled": progress * 4,
                "domainsVisited": progress / 10,
                "imagesFound": progress * 2,
            },
        })
    }
}
