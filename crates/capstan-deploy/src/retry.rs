//! Retry regimes for failing jobs.
//!
//! A failing job is not retried at a fixed cadence: fresh failures get a
//! tight retry window (transient infrastructure hiccups resolve quickly),
//! out-of-capacity test failures wait for capacity to free up, and
//! long-failing jobs back off to ten-minute and then two-hour intervals.

use chrono::{DateTime, Duration, Utc};

use crate::jobs::{JobStatus, JobType};

/// Decides whether a job may be re-triggered at a given instant.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fresh failures may retry freely within this window.
    immediate_window: Duration,
    /// Out-of-capacity test completions may retry after this pause.
    capacity_pause: Duration,
    /// Failures younger than this back off to [`Self::early_pause`].
    early_window: Duration,
    /// Pause between retries within the early window.
    early_pause: Duration,
    /// Pause between retries after the early window.
    late_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            immediate_window: Duration::minutes(1),
            capacity_pause: Duration::minutes(1),
            early_window: Duration::hours(1),
            early_pause: Duration::minutes(10),
            late_pause: Duration::hours(2),
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the job may be (re-)triggered at `now`.
    ///
    /// Running-state and block windows are judged elsewhere; this only
    /// considers the failure history.
    #[must_use]
    pub fn can_trigger_now(
        &self,
        job_type: &JobType,
        status: Option<&JobStatus>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(status) = status else {
            // Never run before.
            return true;
        };
        let Some(failing_since) = status.first_failing().map(|run| run.at) else {
            // Not failing.
            return true;
        };
        if status
            .last_success()
            .is_some_and(|success| success.at >= failing_since)
        {
            return true;
        }

        let completed_at = status.last_completed().map(|run| run.at);
        let pause_over = |pause: Duration| {
            completed_at.is_none_or(|completed| now - completed >= pause)
        };

        // Out of capacity is waited out, not hammered.
        if job_type.is_test() && status.is_out_of_capacity() {
            return pause_over(self.capacity_pause);
        }
        if now - failing_since < self.immediate_window {
            return true;
        }
        if now - failing_since < self.early_window {
            return pause_over(self.early_pause);
        }
        pause_over(self.late_pause)
    }
}
