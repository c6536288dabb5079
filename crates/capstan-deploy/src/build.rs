//! Build-service abstraction for dispatching deployment jobs.
//!
//! This module provides:
//!
//! - [`BuildService`]: trait for triggering jobs in the external build system
//! - [`BuildJob`]: the dispatch payload (application, project, job name)
//! - [`InMemoryBuildService`]: recording implementation for tests
//!
//! The build service is remote and only observable through polling; the
//! trigger treats `trigger` as a synchronous dispatch whose effects surface
//! later as [`JobReport`](crate::jobs::JobReport)s.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use capstan_core::{ApplicationId, ProjectId};

use crate::jobs::JobType;

/// The dispatch payload for one job in the build service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJob {
    /// The application the job runs for.
    pub application_id: ApplicationId,
    /// The application's project in the build service.
    pub project_id: ProjectId,
    /// The canonical job name.
    pub job_name: String,
}

impl BuildJob {
    /// Creates a build job for the given job type.
    #[must_use]
    pub fn new(application_id: ApplicationId, project_id: ProjectId, job_type: &JobType) -> Self {
        Self {
            application_id,
            project_id,
            job_name: job_type.job_name(),
        }
    }
}

/// The observable state of a job in the build service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildJobState {
    /// The job is not scheduled.
    Idle,
    /// The job is waiting to run.
    Queued,
    /// The job is running.
    Running,
}

/// Errors a build-service call can fail with.
#[derive(Debug, thiserror::Error)]
pub enum BuildServiceError {
    /// The project has no job by this name.
    #[error("unknown job {job_name} in project {project_id}")]
    UnknownJob {
        /// The project the job was dispatched to.
        project_id: ProjectId,
        /// The job name that was not found.
        job_name: String,
    },

    /// The job exists but may not be triggered.
    #[error("job {job_name} cannot be triggered: {message}")]
    IllegalJob {
        /// The job name that was rejected.
        job_name: String,
        /// The build service's rejection message.
        message: String,
    },

    /// The call failed transiently and may be retried.
    #[error("transient build service failure: {message}")]
    Transient {
        /// Description of the transient failure.
        message: String,
    },
}

impl BuildServiceError {
    /// Returns whether retrying later could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// The external build system that executes deployment jobs.
///
/// Implementations are idempotent at job-id granularity: triggering an
/// already-queued job is a no-op on the service side.
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Dispatches the given job.
    ///
    /// # Errors
    ///
    /// Returns [`BuildServiceError::UnknownJob`] or
    /// [`BuildServiceError::IllegalJob`] for permanently rejected dispatches,
    /// and [`BuildServiceError::Transient`] when the service could not be
    /// reached.
    async fn trigger(&self, job: &BuildJob) -> Result<(), BuildServiceError>;

    /// Returns the observable state of the given job.
    ///
    /// # Errors
    ///
    /// Returns [`BuildServiceError::Transient`] when the service could not be
    /// reached.
    async fn state_of(&self, job: &BuildJob) -> Result<BuildJobState, BuildServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_job_carries_the_canonical_name() {
        let job = BuildJob::new(
            "acme.shop".parse().unwrap(),
            ProjectId::new(101),
            &JobType::SystemTest,
        );
        assert_eq!(job.job_name, "system-test");
    }

    #[test]
    fn transient_errors_are_classified() {
        assert!(BuildServiceError::Transient {
            message: "timeout".into()
        }
        .is_transient());
        assert!(!BuildServiceError::UnknownJob {
            project_id: ProjectId::new(101),
            job_name: "system-test".into(),
        }
        .is_transient());
    }
}
