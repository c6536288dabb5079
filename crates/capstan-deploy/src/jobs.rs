//! The job model: job types, per-job history, and completion reports.
//!
//! Every application carries a [`DeploymentJobs`] record: its registration
//! with the build service (project id) and, per [`JobType`], a [`JobStatus`]
//! tracking the last triggering, the last completion, the last success, and
//! the first run of the current failure streak. The planner reads this
//! history; only the reconciler and the triggering engine mutate it, under
//! the application lock.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use capstan_core::{ApplicationId, Error as CoreError, ProjectId, SourceRevision, ZoneId};

use crate::versions::Versions;

/// A role in the deployment pipeline.
///
/// The enumeration is closed: component (build), the two test suites, and one
/// production job per declared zone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobType {
    /// The component build job, initiated by the tenant's own build pipeline.
    Component,
    /// The functional system test suite.
    SystemTest,
    /// The staging upgrade test suite.
    StagingTest,
    /// Deployment to one production zone.
    Production(ZoneId),
}

impl JobType {
    /// Returns whether this is a test job.
    #[must_use]
    pub const fn is_test(&self) -> bool {
        matches!(self, Self::SystemTest | Self::StagingTest)
    }

    /// Returns whether this is a production job.
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production(_))
    }

    /// Returns the zone this job deploys to, for production jobs.
    #[must_use]
    pub const fn zone(&self) -> Option<&ZoneId> {
        match self {
            Self::Production(zone) => Some(zone),
            _ => None,
        }
    }

    /// Returns the production job for the given zone.
    #[must_use]
    pub const fn production(zone: ZoneId) -> Self {
        Self::Production(zone)
    }

    /// Returns the canonical job name used by the build service.
    #[must_use]
    pub fn job_name(&self) -> String {
        match self {
            Self::Component => "component".to_string(),
            Self::SystemTest => "system-test".to_string(),
            Self::StagingTest => "staging-test".to_string(),
            Self::Production(zone) => format!("production-{}", zone.region()),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.job_name())
    }
}

impl FromStr for JobType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "component" => Ok(Self::Component),
            "system-test" => Ok(Self::SystemTest),
            "staging-test" => Ok(Self::StagingTest),
            other => match other.strip_prefix("production-") {
                Some(region) => Ok(Self::Production(ZoneId::prod(region)?)),
                None => Err(CoreError::invalid_id(format!("unknown job name '{other}'"))),
            },
        }
    }
}

impl Serialize for JobType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.job_name())
    }
}

impl<'de> Deserialize<'de> for JobType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(D::Error::custom)
    }
}

/// The kind of error a job completed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobError {
    /// The target environment had no capacity for the job.
    OutOfCapacity,
    /// A test suite failed.
    TestFailure,
    /// A deployment failed.
    DeploymentFailure,
    /// The job failed for an unclassified reason.
    Unknown,
}

/// One run of a job: recorded when triggering, and again on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    /// The versions the run targets.
    pub versions: Versions,
    /// Human-readable reason the run was started.
    pub reason: String,
    /// When the run was recorded.
    pub at: DateTime<Utc>,
    /// Build number assigned by the build service; set on completions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<u64>,
}

impl JobRun {
    /// Creates a triggering record.
    #[must_use]
    pub fn triggering(versions: Versions, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            versions,
            reason: reason.into(),
            at,
            build_number: None,
        }
    }

    /// Creates a completion record.
    #[must_use]
    pub fn completion(
        versions: Versions,
        reason: impl Into<String>,
        at: DateTime<Utc>,
        build_number: u64,
    ) -> Self {
        Self {
            versions,
            reason: reason.into(),
            at,
            build_number: Some(build_number),
        }
    }
}

/// Per-application, per-job-type history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    last_triggered: Option<JobRun>,
    last_completed: Option<JobRun>,
    last_success: Option<JobRun>,
    first_failing: Option<JobRun>,
    last_error: Option<JobError>,
}

impl JobStatus {
    /// Returns the most recent triggering, if any.
    #[must_use]
    pub const fn last_triggered(&self) -> Option<&JobRun> {
        self.last_triggered.as_ref()
    }

    /// Returns the most recent completion, if any.
    #[must_use]
    pub const fn last_completed(&self) -> Option<&JobRun> {
        self.last_completed.as_ref()
    }

    /// Returns the most recent successful completion, if any.
    #[must_use]
    pub const fn last_success(&self) -> Option<&JobRun> {
        self.last_success.as_ref()
    }

    /// Returns the first run of the current failure streak, if failing.
    #[must_use]
    pub const fn first_failing(&self) -> Option<&JobRun> {
        self.first_failing.as_ref()
    }

    /// Returns the error kind of the most recent failure, if failing.
    #[must_use]
    pub const fn last_error(&self) -> Option<JobError> {
        self.last_error
    }

    /// Returns whether the most recent completion succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.last_completed.is_some() && self.first_failing.is_none()
    }

    /// Returns whether the job is failing on lack of capacity.
    #[must_use]
    pub fn is_out_of_capacity(&self) -> bool {
        self.last_error == Some(JobError::OutOfCapacity)
    }

    /// Returns whether the job is considered running.
    ///
    /// A job is running if its last triggering is newer than its last
    /// completion and happened after `timeout_limit`; a triggering older than
    /// the limit is considered dead and may be re-triggered.
    #[must_use]
    pub fn is_running(&self, timeout_limit: DateTime<Utc>) -> bool {
        let Some(triggered) = &self.last_triggered else {
            return false;
        };
        let completed_before = self
            .last_completed
            .as_ref()
            .is_none_or(|completed| completed.at < triggered.at);
        completed_before && triggered.at > timeout_limit
    }

    /// Returns this status with a new triggering recorded.
    #[must_use]
    pub fn with_triggering(mut self, run: JobRun) -> Self {
        self.last_triggered = Some(run);
        self
    }

    /// Returns this status with a new completion recorded.
    ///
    /// A successful completion ends any failure streak; a failed completion
    /// starts one if none is in progress.
    #[must_use]
    pub fn with_completion(mut self, run: JobRun, error: Option<JobError>) -> Self {
        self.last_completed = Some(run.clone());
        match error {
            None => {
                self.last_success = Some(run);
                self.first_failing = None;
                self.last_error = None;
            }
            Some(error) => {
                if self.first_failing.is_none() {
                    self.first_failing = Some(run);
                }
                self.last_error = Some(error);
            }
        }
        self
    }
}

/// A completion report from the build service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    /// The application the job ran for.
    pub application_id: ApplicationId,
    /// The application's project in the build service.
    pub project_id: ProjectId,
    /// The job that completed.
    pub job_type: JobType,
    /// The build number of the completed run.
    pub build_number: u64,
    /// The source revision that was built, for component jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<SourceRevision>,
    /// The error the job completed with, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobReport {
    /// Returns whether the reported job succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// The deployment-jobs record of one application.
///
/// Holds the application's registration with the build service and the
/// per-job-type status history. Read-only for the planner; mutated only
/// through the application repository under the application lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentJobs {
    /// The application's project in the build service, if registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<ProjectId>,
    /// Status per job type.
    #[serde(default)]
    statuses: BTreeMap<JobType, JobStatus>,
}

impl DeploymentJobs {
    /// Returns the application's build-service project id, if registered.
    #[must_use]
    pub const fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    /// Returns the status of the given job type, if it has ever run.
    #[must_use]
    pub fn status_of(&self, job_type: &JobType) -> Option<&JobStatus> {
        self.statuses.get(job_type)
    }

    /// Returns the full status map.
    #[must_use]
    pub const fn job_status(&self) -> &BTreeMap<JobType, JobStatus> {
        &self.statuses
    }

    /// Returns whether the given job is considered running.
    #[must_use]
    pub fn is_running(&self, job_type: &JobType, timeout_limit: DateTime<Utc>) -> bool {
        self.statuses
            .get(job_type)
            .is_some_and(|status| status.is_running(timeout_limit))
    }

    /// Returns whether any job is in a failure streak.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.statuses
            .values()
            .any(|status| status.first_failing().is_some())
    }

    /// Returns the production job types currently running.
    #[must_use]
    pub fn running_production(&self, timeout_limit: DateTime<Utc>) -> Vec<&JobType> {
        self.statuses
            .iter()
            .filter(|(job_type, status)| {
                job_type.is_production() && status.is_running(timeout_limit)
            })
            .map(|(job_type, _)| job_type)
            .collect()
    }

    /// Returns this record with the given project id.
    #[must_use]
    pub fn with_project_id(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Returns this record with the project id cleared.
    ///
    /// A cleared project id quarantines the application: nothing can be
    /// dispatched until an operator re-registers it.
    #[must_use]
    pub fn without_project_id(mut self) -> Self {
        self.project_id = None;
        self
    }

    /// Returns this record with a triggering recorded for the given job.
    #[must_use]
    pub fn with_triggering(mut self, job_type: JobType, run: JobRun) -> Self {
        let status = self.statuses.remove(&job_type).unwrap_or_default();
        self.statuses.insert(job_type, status.with_triggering(run));
        self
    }

    /// Returns this record with a completion recorded for the given job.
    #[must_use]
    pub fn with_completion(
        mut self,
        job_type: JobType,
        run: JobRun,
        error: Option<JobError>,
    ) -> Self {
        let status = self.statuses.remove(&job_type).unwrap_or_default();
        self.statuses
            .insert(job_type, status.with_completion(run, error));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use capstan_core::{ApplicationVersion, PlatformVersion};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 12, minute, 0).unwrap()
    }

    fn versions() -> Versions {
        Versions::new(PlatformVersion::new(7, 3, 0), ApplicationVersion::unknown())
    }

    #[test]
    fn job_name_roundtrip() {
        let types = [
            JobType::Component,
            JobType::SystemTest,
            JobType::StagingTest,
            JobType::Production(ZoneId::prod("us-east-1").unwrap()),
        ];
        for job_type in types {
            let parsed: JobType = job_type.job_name().parse().unwrap();
            assert_eq!(parsed, job_type);
        }
        assert!("deploy-moon-base".parse::<JobType>().is_err());
    }

    #[test]
    fn job_type_predicates() {
        assert!(JobType::SystemTest.is_test());
        assert!(!JobType::SystemTest.is_production());
        let production = JobType::Production(ZoneId::prod("us-east-1").unwrap());
        assert!(production.is_production());
        assert_eq!(production.zone().unwrap().region(), "us-east-1");
        assert!(JobType::Component.zone().is_none());
    }

    #[test]
    fn completion_ends_failure_streak() {
        let status = JobStatus::default()
            .with_completion(
                JobRun::completion(versions(), "run", at(0), 1),
                Some(JobError::TestFailure),
            )
            .with_completion(
                JobRun::completion(versions(), "run", at(5), 2),
                Some(JobError::TestFailure),
            );
        assert_eq!(status.first_failing().unwrap().at, at(0));
        assert!(!status.is_success());

        let status = status.with_completion(JobRun::completion(versions(), "run", at(10), 3), None);
        assert!(status.is_success());
        assert!(status.first_failing().is_none());
        assert!(status.last_error().is_none());
    }

    #[test]
    fn running_requires_triggering_newer_than_completion() {
        let status = JobStatus::default()
            .with_triggering(JobRun::triggering(versions(), "run", at(0)))
            .with_completion(JobRun::completion(versions(), "run", at(5), 1), None);
        let horizon = at(5) - Duration::hours(12);
        assert!(!status.is_running(horizon));

        let status = status.with_triggering(JobRun::triggering(versions(), "run", at(6)));
        assert!(status.is_running(horizon));
    }

    #[test]
    fn hung_triggering_is_not_running() {
        let status =
            JobStatus::default().with_triggering(JobRun::triggering(versions(), "run", at(0)));
        let now = at(0) + Duration::hours(13);
        assert!(!status.is_running(now - Duration::hours(12)));
        assert!(status.is_running(at(0) + Duration::hours(11) - Duration::hours(12)));
    }

    #[test]
    fn deployment_jobs_tracks_failures() {
        let jobs = DeploymentJobs::default().with_completion(
            JobType::SystemTest,
            JobRun::completion(versions(), "run", at(0), 1),
            Some(JobError::OutOfCapacity),
        );
        assert!(jobs.has_failures());
        assert!(jobs.status_of(&JobType::SystemTest).unwrap().is_out_of_capacity());
        assert!(jobs.status_of(&JobType::StagingTest).is_none());
    }

    #[test]
    fn project_id_quarantine() {
        let jobs = DeploymentJobs::default().with_project_id(ProjectId::new(101));
        assert_eq!(jobs.project_id(), Some(ProjectId::new(101)));
        assert!(jobs.without_project_id().project_id().is_none());
    }

    #[test]
    fn report_serializes_with_job_name() {
        let report = JobReport {
            application_id: "acme.shop".parse().unwrap(),
            project_id: ProjectId::new(101),
            job_type: JobType::Production(ZoneId::prod("us-east-1").unwrap()),
            build_number: 42,
            source_revision: None,
            error: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"production-us-east-1\""));
        let parsed: JobReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
