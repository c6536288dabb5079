//! In-memory build service for testing.
//!
//! [`InMemoryBuildService`] records every dispatched job and can be
//! programmed to fail specific job names, so tests can exercise the
//! quarantine and retry paths of the triggering engine.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BuildJob, BuildJobState, BuildService, BuildServiceError};

/// How a programmed job name should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Fail with [`BuildServiceError::UnknownJob`].
    UnknownJob,
    /// Fail with [`BuildServiceError::IllegalJob`].
    IllegalJob,
    /// Fail with [`BuildServiceError::Transient`].
    Transient,
}

/// Recording build service for tests.
#[derive(Debug, Default)]
pub struct InMemoryBuildService {
    triggered: Mutex<Vec<BuildJob>>,
    states: Mutex<HashMap<(String, String), BuildJobState>>,
    failures: Mutex<HashMap<String, FailureKind>>,
}

impl InMemoryBuildService {
    /// Creates an empty build service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Programs dispatches of the given job name to fail.
    pub fn fail_job(&self, job_name: impl Into<String>, kind: FailureKind) {
        self.failures
            .lock()
            .expect("failures lock poisoned")
            .insert(job_name.into(), kind);
    }

    /// Clears a programmed failure.
    pub fn heal_job(&self, job_name: &str) {
        self.failures
            .lock()
            .expect("failures lock poisoned")
            .remove(job_name);
    }

    /// Sets the observable state of a job.
    pub fn set_state(&self, job: &BuildJob, state: BuildJobState) {
        self.states
            .lock()
            .expect("states lock poisoned")
            .insert(Self::key(job), state);
    }

    /// Returns every job triggered so far, in dispatch order.
    #[must_use]
    pub fn triggered_jobs(&self) -> Vec<BuildJob> {
        self.triggered
            .lock()
            .expect("triggered lock poisoned")
            .clone()
    }

    /// Returns the job names triggered for the given application, in order.
    #[must_use]
    pub fn job_names_for(&self, application_id: &capstan_core::ApplicationId) -> Vec<String> {
        self.triggered
            .lock()
            .expect("triggered lock poisoned")
            .iter()
            .filter(|job| &job.application_id == application_id)
            .map(|job| job.job_name.clone())
            .collect()
    }

    /// Forgets every recorded dispatch.
    pub fn clear(&self) {
        self.triggered
            .lock()
            .expect("triggered lock poisoned")
            .clear();
    }

    fn key(job: &BuildJob) -> (String, String) {
        (job.application_id.to_string(), job.job_name.clone())
    }
}

#[async_trait]
impl BuildService for InMemoryBuildService {
    async fn trigger(&self, job: &BuildJob) -> Result<(), BuildServiceError> {
        let failure = self
            .failures
            .lock()
            .expect("failures lock poisoned")
            .get(&job.job_name)
            .copied();
        match failure {
            Some(FailureKind::UnknownJob) => {
                return Err(BuildServiceError::UnknownJob {
                    project_id: job.project_id,
                    job_name: job.job_name.clone(),
                });
            }
            Some(FailureKind::IllegalJob) => {
                return Err(BuildServiceError::IllegalJob {
                    job_name: job.job_name.clone(),
                    message: "rejected by test fixture".into(),
                });
            }
            Some(FailureKind::Transient) => {
                return Err(BuildServiceError::Transient {
                    message: "unreachable by test fixture".into(),
                });
            }
            None => {}
        }

        self.triggered
            .lock()
            .expect("triggered lock poisoned")
            .push(job.clone());
        self.states
            .lock()
            .expect("states lock poisoned")
            .insert(Self::key(job), BuildJobState::Queued);
        Ok(())
    }

    async fn state_of(&self, job: &BuildJob) -> Result<BuildJobState, BuildServiceError> {
        Ok(self
            .states
            .lock()
            .expect("states lock poisoned")
            .get(&Self::key(job))
            .copied()
            .unwrap_or(BuildJobState::Idle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_core::ProjectId;

    use crate::jobs::JobType;

    fn job(name: &JobType) -> BuildJob {
        BuildJob::new("acme.shop".parse().unwrap(), ProjectId::new(101), name)
    }

    #[tokio::test]
    async fn records_triggered_jobs() {
        let service = InMemoryBuildService::new();
        service.trigger(&job(&JobType::SystemTest)).await.unwrap();
        service.trigger(&job(&JobType::StagingTest)).await.unwrap();

        let names = service.job_names_for(&"acme.shop".parse().unwrap());
        assert_eq!(names, ["system-test", "staging-test"]);
        assert_eq!(
            service.state_of(&job(&JobType::SystemTest)).await.unwrap(),
            BuildJobState::Queued
        );
    }

    #[tokio::test]
    async fn programmed_failures_fire() {
        let service = InMemoryBuildService::new();
        service.fail_job("system-test", FailureKind::UnknownJob);
        let result = service.trigger(&job(&JobType::SystemTest)).await;
        assert!(matches!(result, Err(BuildServiceError::UnknownJob { .. })));
        assert!(service.triggered_jobs().is_empty());

        service.heal_job("system-test");
        assert!(service.trigger(&job(&JobType::SystemTest)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_jobs_are_idle() {
        let service = InMemoryBuildService::new();
        assert_eq!(
            service.state_of(&job(&JobType::Component)).await.unwrap(),
            BuildJobState::Idle
        );
    }
}
