//! The deployment trigger: dispatching decisions into the build service.
//!
//! [`DeploymentTrigger`] owns the control loop's write side. A
//! [`trigger_ready_jobs`](DeploymentTrigger::trigger_ready_jobs) pass plans
//! every registered application and dispatches the results in two lanes:
//!
//! - **Production lane**: per application, in pipeline-step order, every
//!   eligible candidate; applications advance in parallel, each under its
//!   own lock
//! - **Capacity-constrained lane**: test jobs pooled across applications,
//!   sorted by `(retry, application-upgrade)` then age, at most one dispatch
//!   per job type per pass
//!
//! Failures for one application never abort a pass; each application is
//! handled in isolation and logged. The external-change API
//! ([`trigger_change`](DeploymentTrigger::trigger_change),
//! [`cancel_change`](DeploymentTrigger::cancel_change),
//! [`force_trigger`](DeploymentTrigger::force_trigger)) mutates the declared
//! change under the application lock; the next pass picks the work up.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use capstan_core::{ApplicationId, Change, Clock, PlatformVersion};

use crate::application::Application;
use crate::build::{BuildJob, BuildService, BuildServiceError};
use crate::calculus;
use crate::config::TriggerConfig;
use crate::error::{Error, Result};
use crate::jobs::{JobRun, JobType};
use crate::metrics::{TimingGuard, TriggerMetrics};
use crate::planner::{Job, ReadyJobsPlanner};
use crate::store::ApplicationStore;
use crate::versions::Versions;

/// The lane a dispatch was made in, for metrics.
const LANE_PRODUCTION: &str = "production";
const LANE_CAPACITY: &str = "capacity";

/// Schedules deployment jobs in the build service and keeps each
/// application's change in sync with what is scheduled.
///
/// Multi-thread safe; all per-application state transitions are serialized
/// by the application store's locks.
pub struct DeploymentTrigger {
    store: Arc<dyn ApplicationStore>,
    build_service: Arc<dyn BuildService>,
    clock: Arc<dyn Clock>,
    config: TriggerConfig,
    planner: ReadyJobsPlanner,
    system_version: RwLock<PlatformVersion>,
    metrics: TriggerMetrics,
}

impl DeploymentTrigger {
    /// Creates a trigger over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        build_service: Arc<dyn BuildService>,
        clock: Arc<dyn Clock>,
        config: TriggerConfig,
        system_version: PlatformVersion,
    ) -> Self {
        let planner = ReadyJobsPlanner::new(config.job_timeout());
        Self {
            store,
            build_service,
            clock,
            config,
            planner,
            system_version: RwLock::new(system_version),
            metrics: TriggerMetrics::new(),
        }
    }

    /// Returns the platform version the system controller currently targets.
    #[must_use]
    pub fn system_version(&self) -> PlatformVersion {
        *self.system_version.read().expect("system version poisoned")
    }

    /// Updates the platform version the system controller targets.
    pub fn set_system_version(&self, version: PlatformVersion) {
        *self.system_version.write().expect("system version poisoned") = version;
    }

    /// Returns the instant before which a triggered job counts as dead.
    #[must_use]
    pub fn job_timeout_limit(&self) -> DateTime<Utc> {
        self.clock.now() - self.config.job_timeout()
    }

    /// Finds jobs that can and should run but currently are not, and
    /// dispatches them. Returns the number of jobs dispatched.
    ///
    /// # Errors
    ///
    /// Returns an error when the application store cannot be listed; failures
    /// against single applications are logged and skipped.
    pub async fn trigger_ready_jobs(&self) -> Result<usize> {
        let metrics = self.metrics.clone();
        let _timing = TimingGuard::new(move |duration| {
            metrics.observe_sweep_duration(duration);
        });

        let now = self.clock.now();
        let system_version = self.system_version();

        let mut test_candidates: Vec<Job> = Vec::new();
        let mut production_by_application: Vec<(ApplicationId, Vec<Job>)> = Vec::new();
        for application in self.store.list().await? {
            if application.deployment_jobs().project_id().is_none() {
                continue;
            }
            let (tests, production): (Vec<Job>, Vec<Job>) = self
                .planner
                .ready_jobs(&application, &system_version, now)
                .into_iter()
                .partition(|job| job.job_type.is_test());
            test_candidates.extend(tests);
            if !production.is_empty() {
                production_by_application.push((application.id().clone(), production));
            }
        }
        self.metrics.set_ready_jobs(LANE_CAPACITY, test_candidates.len());
        self.metrics.set_ready_jobs(
            LANE_PRODUCTION,
            production_by_application.iter().map(|(_, jobs)| jobs.len()).sum(),
        );

        // Independent applications advance in parallel, each under its own
        // lock; within one application, pipeline-step order is preserved.
        let production_counts =
            join_all(production_by_application.into_iter().map(|(id, jobs)| async move {
                let mut dispatched = 0_usize;
                for job in &jobs {
                    match self.trigger(job).await {
                        Ok(true) => dispatched += 1,
                        Ok(false) => {}
                        Err(error) => {
                            warn!(application = %id, %error, "production triggering failed");
                            break;
                        }
                    }
                }
                dispatched
            }))
            .await;
        let mut dispatched: usize = production_counts.into_iter().sum();

        // Test capacity is scarce: admit at most one job per test type per
        // pass, oldest eligible first, retries and upgrades ahead.
        test_candidates.sort_by_key(|job| {
            (
                std::cmp::Reverse(job.is_retry),
                std::cmp::Reverse(job.is_application_upgrade),
                job.available_since,
            )
        });
        let mut admitted: Vec<JobType> = Vec::new();
        for job in &test_candidates {
            if admitted.contains(&job.job_type) {
                continue;
            }
            admitted.push(job.job_type.clone());
            match self.trigger(job).await {
                Ok(true) => dispatched += 1,
                Ok(false) => {}
                Err(error) => {
                    warn!(application = %job.application_id, %error, "test triggering failed");
                }
            }
        }

        debug!(dispatched, "ready-jobs pass finished");
        Ok(dispatched)
    }

    /// Dispatches one candidate job and records the triggering.
    ///
    /// Returns whether the job was dispatched. An application without a
    /// build-service project, an untested production candidate, or a
    /// transiently unreachable build service all yield `false`; a dispatch
    /// the build service rejects as unknown or illegal clears the
    /// application's project id, quarantining it until an operator
    /// re-registers it.
    ///
    /// # Errors
    ///
    /// Returns an error when the application store fails.
    pub async fn trigger(&self, job: &Job) -> Result<bool> {
        let Some(locked) = self.store.lock_if_present(&job.application_id).await? else {
            warn!(application = %job.application_id, "dropping trigger for unknown application");
            return Ok(false);
        };
        let application = locked.application();
        let Some(project_id) = application.deployment_jobs().project_id() else {
            debug!(application = %job.application_id, "not registered with the build service");
            return Ok(false);
        };

        // A newer change may have caught up since planning; never let an
        // untested production change through.
        if job.job_type.is_production() && !calculus::is_tested(application, &job.versions) {
            warn!(
                application = %job.application_id,
                job = %job.job_type,
                reason = %job.reason,
                "would trigger, but change is untested"
            );
            return Ok(false);
        }

        let build_job = BuildJob::new(job.application_id.clone(), project_id, &job.job_type);
        match self.build_service.trigger(&build_job).await {
            Ok(()) => {
                info!(
                    application = %job.application_id,
                    job = %job.job_type,
                    versions = %job.versions,
                    reason = %job.reason,
                    "triggering"
                );
                let run = JobRun::triggering(job.versions.clone(), job.reason.clone(), self.clock.now());
                let job_type = job.job_type.clone();
                let locked = locked.update(|application| {
                    application.with_job_triggering(job_type, run)
                });
                self.store.store(locked).await?;
                let lane = if job.job_type.is_test() { LANE_CAPACITY } else { LANE_PRODUCTION };
                self.metrics.record_triggering(lane, &job.job_type.job_name());
                Ok(true)
            }
            Err(error @ (BuildServiceError::UnknownJob { .. } | BuildServiceError::IllegalJob { .. })) => {
                warn!(
                    application = %job.application_id,
                    job = %job.job_type,
                    %error,
                    "build service rejected job; clearing project id"
                );
                let locked = locked.update(Application::without_project_id);
                self.store.store(locked).await?;
                self.metrics.record_triggering_failure(match error {
                    BuildServiceError::UnknownJob { .. } => "unknown_job",
                    _ => "illegal_job",
                });
                Ok(false)
            }
            Err(error) => {
                warn!(
                    application = %job.application_id,
                    job = %job.job_type,
                    %error,
                    "build service unavailable; will retry on a later pass"
                );
                self.metrics.record_triggering_failure("transient");
                Ok(false)
            }
        }
    }

    /// Triggers a job regardless of readiness, on an operator's request.
    ///
    /// A component job is dispatched directly. For any other job the
    /// versions are built from current state; a production job whose
    /// versions are untested gets the required test jobs triggered instead.
    /// Returns the job types that were dispatched.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or unregistered applications, and when
    /// the build service rejects the forced dispatch.
    pub async fn force_trigger(
        &self,
        application_id: &ApplicationId,
        job_type: JobType,
        user: &str,
    ) -> Result<Vec<JobType>> {
        let application = self.store.require(application_id).await?;
        let Some(project_id) = application.deployment_jobs().project_id() else {
            return Err(Error::NotRegistered {
                application: application_id.clone(),
            });
        };
        let reason = format!("Forced by {user}");

        if job_type == JobType::Component {
            let build_job = BuildJob::new(application_id.clone(), project_id, &job_type);
            self.build_service.trigger(&build_job).await?;
            info!(application = %application_id, user, "forced component build");
            return Ok(vec![JobType::Component]);
        }

        let now = self.clock.now();
        let system_version = self.system_version();
        let deployment = application.deployment_for(&job_type);
        let versions = Versions::from(
            application.change(),
            &application,
            deployment,
            &system_version,
        );

        let to_trigger: Vec<Job> =
            if job_type.is_production() && !calculus::is_tested(&application, &versions) {
                [JobType::SystemTest, JobType::StagingTest]
                    .into_iter()
                    .filter(|test_type| {
                        let passed = application
                            .deployment_jobs()
                            .status_of(test_type)
                            .and_then(|status| status.last_success())
                            .is_some_and(|success| versions.targets_match(success));
                        !passed
                    })
                    .map(|test_type| Job {
                        application_id: application_id.clone(),
                        job_type: test_type,
                        versions: versions.clone(),
                        reason: reason.clone(),
                        available_since: now,
                        is_retry: false,
                        is_application_upgrade: application.change().application().is_some(),
                    })
                    .collect()
            } else {
                vec![Job {
                    application_id: application_id.clone(),
                    job_type,
                    versions,
                    reason,
                    available_since: now,
                    is_retry: false,
                    is_application_upgrade: application.change().application().is_some(),
                }]
            };

        let mut triggered = Vec::new();
        for job in &to_trigger {
            if self.trigger(job).await? {
                triggered.push(job.job_type.clone());
            }
        }
        Ok(triggered)
    }

    /// Starts a change for the application.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChangeConflict`] when a change is already in progress
    /// and no job is failing: a healthy pipeline is not disturbed. Returns
    /// [`Error::UnknownApplication`] for unknown applications.
    pub async fn trigger_change(&self, application_id: &ApplicationId, change: Change) -> Result<()> {
        let locked = self.store.lock_or_throw(application_id).await?;
        let application = locked.application();
        if application.change().is_present() && !application.deployment_jobs().has_failures() {
            return Err(Error::ChangeConflict {
                application: application_id.clone(),
                in_progress: application.change().clone(),
                requested: change,
            });
        }
        info!(application = %application_id, %change, "starting change");
        let clears_outstanding = change.application().is_some();
        let locked = locked.update(|application| {
            let application = application.with_change(change);
            if clears_outstanding {
                application.with_outstanding_change(Change::empty())
            } else {
                application
            }
        });
        self.store.store(locked).await
    }

    /// Cancels the application's current change.
    ///
    /// With `keep_application_change`, only the platform component is
    /// dropped; otherwise the change becomes empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownApplication`] for unknown applications.
    pub async fn cancel_change(
        &self,
        application_id: &ApplicationId,
        keep_application_change: bool,
    ) -> Result<()> {
        let locked = self.store.lock_or_throw(application_id).await?;
        info!(
            application = %application_id,
            change = %locked.application().change(),
            keep_application_change,
            "cancelling change"
        );
        let locked = locked.update(|application| {
            let remaining = if keep_application_change {
                application
                    .change()
                    .application()
                    .cloned()
                    .map_or_else(Change::empty, Change::of_application)
            } else {
                Change::empty()
            };
            application.with_change(remaining)
        });
        self.store.store(locked).await
    }

    /// Returns what the planner would emit now, grouped by job type.
    ///
    /// Diagnostic only; nothing is dispatched.
    ///
    /// # Errors
    ///
    /// Returns an error when the application store cannot be listed.
    pub async fn jobs_to_run(&self) -> Result<BTreeMap<JobType, Vec<Job>>> {
        let now = self.clock.now();
        let system_version = self.system_version();
        let mut by_type: BTreeMap<JobType, Vec<Job>> = BTreeMap::new();
        for application in self.store.list().await? {
            if application.deployment_jobs().project_id().is_none() {
                continue;
            }
            for job in self.planner.ready_jobs(&application, &system_version, now) {
                by_type.entry(job.job_type.clone()).or_default().push(job);
            }
        }
        Ok(by_type)
    }

    /// The store this trigger operates on.
    pub(crate) fn store(&self) -> &Arc<dyn ApplicationStore> {
        &self.store
    }

    /// The clock this trigger reads.
    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The metrics recorder.
    pub(crate) const fn metrics(&self) -> &TriggerMetrics {
        &self.metrics
    }
}
