//! Observability metrics for the deployment trigger.
//!
//! Metrics are exposed via the `metrics` crate facade and are designed for
//! alerting on stuck pipelines and dashboards over dispatch volume.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `capstan_deploy_triggerings_total` | Counter | `lane`, `job` | Jobs dispatched to the build service |
//! | `capstan_deploy_triggering_failures_total` | Counter | `kind` | Dispatches the build service rejected |
//! | `capstan_deploy_completions_total` | Counter | `result` | Completion reports reconciled |
//! | `capstan_deploy_sweep_duration_seconds` | Histogram | - | `trigger_ready_jobs` pass duration |
//! | `capstan_deploy_ready_jobs` | Gauge | `lane` | Candidates the last sweep considered |

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: jobs dispatched to the build service.
    pub const TRIGGERINGS_TOTAL: &str = "capstan_deploy_triggerings_total";
    /// Counter: dispatches the build service rejected.
    pub const TRIGGERING_FAILURES_TOTAL: &str = "capstan_deploy_triggering_failures_total";
    /// Counter: completion reports reconciled.
    pub const COMPLETIONS_TOTAL: &str = "capstan_deploy_completions_total";
    /// Histogram: duration of one `trigger_ready_jobs` pass in seconds.
    pub const SWEEP_DURATION_SECONDS: &str = "capstan_deploy_sweep_duration_seconds";
    /// Gauge: candidates the last sweep considered.
    pub const READY_JOBS: &str = "capstan_deploy_ready_jobs";
}

/// Label keys used across metrics.
pub mod labels {
    /// Dispatch lane (`production` or `capacity`).
    pub const LANE: &str = "lane";
    /// Canonical job name.
    pub const JOB: &str = "job";
    /// Failure kind (`unknown_job`, `illegal_job`, `transient`).
    pub const KIND: &str = "kind";
    /// Completion result (`success`, `failure`, `dropped`).
    pub const RESULT: &str = "result";
}

/// High-level interface for recording trigger metrics.
///
/// Cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct TriggerMetrics;

impl TriggerMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records a successful dispatch.
    pub fn record_triggering(&self, lane: &str, job_name: &str) {
        counter!(
            names::TRIGGERINGS_TOTAL,
            labels::LANE => lane.to_string(),
            labels::JOB => job_name.to_string(),
        )
        .increment(1);
    }

    /// Records a rejected dispatch.
    pub fn record_triggering_failure(&self, kind: &str) {
        counter!(
            names::TRIGGERING_FAILURES_TOTAL,
            labels::KIND => kind.to_string(),
        )
        .increment(1);
    }

    /// Records a reconciled completion report.
    pub fn record_completion(&self, result: &str) {
        counter!(
            names::COMPLETIONS_TOTAL,
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }

    /// Records the duration of one ready-jobs sweep.
    pub fn observe_sweep_duration(&self, duration: Duration) {
        histogram!(names::SWEEP_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Sets the number of candidates the last sweep considered.
    #[allow(clippy::cast_precision_loss)] // Gauge values are small
    pub fn set_ready_jobs(&self, lane: &str, count: usize) {
        gauge!(
            names::READY_JOBS,
            labels::LANE => lane.to_string(),
        )
        .set(count as f64);
    }
}

/// RAII guard for timing operations.
///
/// Automatically records the elapsed duration when dropped.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a timing guard that calls `on_drop` with the elapsed duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_record_without_a_recorder_installed() {
        let metrics = TriggerMetrics::new();
        metrics.record_triggering("capacity", "system-test");
        metrics.record_triggering_failure("transient");
        metrics.record_completion("success");
        metrics.observe_sweep_duration(Duration::from_millis(10));
        metrics.set_ready_jobs("production", 3);
    }

    #[test]
    fn timing_guard_measures_duration() {
        let mut recorded = None;
        {
            let _guard = TimingGuard::new(|d| recorded = Some(d));
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(recorded.is_some_and(|d| d >= Duration::from_millis(5)));
    }
}
