//! The ready-jobs planner.
//!
//! For one application snapshot at one instant, [`ReadyJobsPlanner`] produces
//! the candidate jobs that can and should run now. The computation is pure
//! and lock-free: it reads the snapshot, never the store, and emits
//! [`Job`] values for the triggering engine to dispatch.
//!
//! The walk follows the production pipeline in declared order. A step whose
//! jobs are all complete advances the completion frontier; a step with
//! remaining jobs emits production candidates when their versions are tested
//! and the preceding steps are done, or the missing test candidates when
//! they are not. When the walk queues or freezes no tests, the baseline
//! "keep tests green" candidates are emitted so test suites keep running
//! between changes.

use chrono::{DateTime, Duration, Utc};

use capstan_core::{ApplicationId, Change, PlatformVersion};

use crate::application::Application;
use crate::calculus;
use crate::jobs::{JobStatus, JobType};
use crate::retry::RetryPolicy;
use crate::steps::{DeploymentSteps, Step};
use crate::versions::Versions;

/// A candidate job the planner considers ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// The application the job runs for.
    pub application_id: ApplicationId,
    /// The job to run.
    pub job_type: JobType,
    /// The versions the job would target.
    pub versions: Versions,
    /// Human-readable reason the job is ready.
    pub reason: String,
    /// Earliest instant the job became eligible, best effort.
    ///
    /// Used only for ordering tiebreaks in the capacity-constrained lane,
    /// never for correctness decisions.
    pub available_since: DateTime<Utc>,
    /// Whether this is a retry on an out-of-capacity failure.
    pub is_retry: bool,
    /// Whether the application's change carries a new application version.
    pub is_application_upgrade: bool,
}

/// Plans the jobs one application is ready to run.
#[derive(Debug, Clone)]
pub struct ReadyJobsPlanner {
    job_timeout: Duration,
    retry_policy: RetryPolicy,
}

impl ReadyJobsPlanner {
    /// Creates a planner considering jobs older than `job_timeout` dead.
    #[must_use]
    pub fn new(job_timeout: Duration) -> Self {
        Self {
            job_timeout,
            retry_policy: RetryPolicy::new(),
        }
    }

    /// Returns the jobs the application is ready to run at `now`.
    #[must_use]
    pub fn ready_jobs(
        &self,
        application: &Application,
        system_version: &PlatformVersion,
        now: DateTime<Utc>,
    ) -> Vec<Job> {
        let timeout_limit = now - self.job_timeout;
        let steps = DeploymentSteps::of(application.deployment_spec());
        let change = application.change();
        let mut jobs = Vec::new();

        // None until the walk decides what testing, if any, is needed;
        // Some (possibly empty) freezes further test-job generation.
        let mut test_jobs: Option<Vec<Job>> = None;

        let mut completed_at = tests_completed_at(application);

        if change.is_present() {
            for step in steps.production() {
                match step {
                    Step::Delay(delay) => {
                        completed_at = completed_at.map(|at| at + delay).filter(|at| *at <= now);
                    }
                    Step::Zones(_) => {
                        let members = DeploymentSteps::to_jobs(&step);
                        let remaining: Vec<JobType> = members
                            .iter()
                            .filter(|job_type| {
                                !calculus::is_complete(change, application, job_type, system_version)
                            })
                            .cloned()
                            .collect();

                        if remaining.is_empty() {
                            completed_at = DeploymentSteps::completed_at(application, &step);
                            continue;
                        }

                        for job_type in &remaining {
                            let deployment = application.deployment_for(job_type);
                            let versions =
                                Versions::from(change, application, deployment, system_version);
                            if calculus::is_tested(application, &versions) {
                                test_jobs.get_or_insert_with(Vec::new);
                                if let Some(since) = completed_at {
                                    if self.can_trigger_production(
                                        application,
                                        job_type,
                                        &members,
                                        now,
                                        timeout_limit,
                                    ) {
                                        jobs.push(self.production_job(
                                            application,
                                            job_type.clone(),
                                            versions,
                                            since,
                                        ));
                                    }
                                }
                            } else if test_jobs.is_none() {
                                test_jobs = Some(self.tests_for(
                                    application,
                                    &versions,
                                    format!("Testing deployment for {job_type}"),
                                    completed_at.unwrap_or(now),
                                    now,
                                    timeout_limit,
                                    change.application().is_some(),
                                ));
                            }
                        }
                        completed_at = None;
                    }
                }
            }
        }

        let test_jobs = test_jobs.unwrap_or_else(|| {
            let versions = Versions::from(&Change::empty(), application, None, system_version);
            self.tests_for(
                application,
                &versions,
                "Testing last changes".to_string(),
                now,
                now,
                timeout_limit,
                false,
            )
        });
        jobs.extend(test_jobs);
        jobs
    }

    /// Builds a production candidate.
    fn production_job(
        &self,
        application: &Application,
        job_type: JobType,
        versions: Versions,
        available_since: DateTime<Utc>,
    ) -> Job {
        let is_retry = application
            .deployment_jobs()
            .status_of(&job_type)
            .is_some_and(JobStatus::is_out_of_capacity);
        let reason = if is_retry {
            "Retrying on out of capacity".to_string()
        } else {
            format!("Deploying {}", application.change())
        };
        Job {
            application_id: application.id().clone(),
            job_type,
            versions,
            reason,
            available_since,
            is_retry,
            is_application_upgrade: application.change().application().is_some(),
        }
    }

    /// Returns the candidate for the next test job to pass on `versions`.
    ///
    /// The test pipeline is sequential: the staging test only becomes ready
    /// once the system test has succeeded on these versions. At most one
    /// candidate is returned; a first unpassed test that is running or held
    /// back by its retry regime yields none.
    #[allow(clippy::too_many_arguments)]
    fn tests_for(
        &self,
        application: &Application,
        versions: &Versions,
        reason: String,
        available_since: DateTime<Utc>,
        now: DateTime<Utc>,
        timeout_limit: DateTime<Utc>,
        is_application_upgrade: bool,
    ) -> Vec<Job> {
        for job_type in DeploymentSteps::of(application.deployment_spec()).test_jobs() {
            let status = application.deployment_jobs().status_of(&job_type);
            let already_passed = status
                .and_then(|status| status.last_success())
                .is_some_and(|success| {
                    versions.targets_match(success)
                        && (job_type != JobType::StagingTest
                            || versions.sources_match_if_present(success))
                });
            if already_passed {
                continue;
            }
            if application.deployment_jobs().is_running(&job_type, timeout_limit)
                || !self.retry_policy.can_trigger_now(&job_type, status, now)
            {
                return Vec::new();
            }
            let is_retry = status.is_some_and(JobStatus::is_out_of_capacity);
            return vec![Job {
                application_id: application.id().clone(),
                job_type,
                versions: versions.clone(),
                reason: if is_retry {
                    "Retrying on out of capacity".to_string()
                } else {
                    reason
                },
                available_since,
                is_retry,
                is_application_upgrade,
            }];
        }
        Vec::new()
    }

    /// Whether a production job may be triggered now.
    ///
    /// Requires the job not to be running, its retry regime to allow it, the
    /// change not to be in a block window, and every running production job
    /// to belong to the same step (production concurrency never spans steps).
    fn can_trigger_production(
        &self,
        application: &Application,
        job_type: &JobType,
        step_members: &[JobType],
        now: DateTime<Utc>,
        timeout_limit: DateTime<Utc>,
    ) -> bool {
        let record = application.deployment_jobs();
        if record.is_running(job_type, timeout_limit) {
            return false;
        }
        if !self
            .retry_policy
            .can_trigger_now(job_type, record.status_of(job_type), now)
        {
            return false;
        }
        if application.is_blocked(now) {
            return false;
        }
        record
            .running_production(timeout_limit)
            .iter()
            .all(|running| step_members.contains(running))
    }
}

/// When the test pipeline last completed: the later of the two suites'
/// last successes, or `None` while either is missing.
fn tests_completed_at(application: &Application) -> Option<DateTime<Utc>> {
    let success_at = |job_type: &JobType| {
        application
            .deployment_jobs()
            .status_of(job_type)
            .and_then(|status| status.last_success())
            .map(|run| run.at)
    };
    match (
        success_at(&JobType::SystemTest),
        success_at(&JobType::StagingTest),
    ) {
        (Some(system), Some(staging)) => Some(system.max(staging)),
        _ => None,
    }
}
