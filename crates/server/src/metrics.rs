//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Job lifecycle metric definitions
//! - Helper functions for recording metrics

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    let mut installed = false;
    // Concurrent callers block here until the first one has stored the handle.
    PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Failed to set global metrics recorder (already set)");
        } else {
            describe_metrics();
            installed = true;
            tracing::info!("Prometheus metrics initialized");
        }
        handle
    });
    installed
}

fn describe_metrics() {
    describe_counter!("jobs_started_total", "Total number of jobs created");
    describe_counter!(
        "jobs_finished_total",
        "Total number of jobs that reached a terminal state, by status"
    );
    describe_gauge!("jobs_active", "Number of jobs currently running");
    describe_histogram!(
        "job_duration_seconds",
        "Wall-clock time from job start to terminal state"
    );
    describe_counter!(
        "snapshot_flush_failures_total",
        "Completed-job snapshot writes that failed after retries"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_job_started() {
    counter!("jobs_started_total").increment(1);
    gauge!("jobs_active").increment(1.0);
}

/// Record a job reaching `status` after `duration_secs`.
pub fn record_job_finished(status: &str, duration_secs: f64) {
    counter!("jobs_finished_total", "status" => status.to_string()).increment(1);
    gauge!("jobs_active").decrement(1.0);
    histogram!("job_duration_seconds", "status" => status.to_string()).record(duration_secs);
}

pub fn record_snapshot_failure() {
    counter!("snapshot_flush_failures_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_job_started();
        record_job_finished("completed", 1.5);
        record_snapshot_failure();
    }

    #[test]
    fn test_init_then_render() {
        init_metrics();
        record_job_started();
        let output = render_metrics().expect("metrics initialized");
        assert!(output.contains("jobs_started_total"));
    }
}
