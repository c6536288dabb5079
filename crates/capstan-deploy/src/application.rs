//! The application aggregate the trigger plans and mutates.
//!
//! An [`Application`] is a value: every mutator consumes and returns it, so
//! state only changes by storing a rebuilt aggregate through the application
//! store, under the application lock. The trigger never holds references into
//! a live aggregate across an await point.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use capstan_core::{
    ApplicationId, ApplicationVersion, Change, DeploymentSpec, PlatformVersion, ProjectId, ZoneId,
};

use crate::jobs::{DeploymentJobs, JobError, JobRun, JobType};

/// What is currently deployed in one zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// The deployed platform version.
    pub platform: PlatformVersion,
    /// The deployed application version.
    pub application: ApplicationVersion,
    /// When the deployment was made.
    pub at: DateTime<Utc>,
}

impl Deployment {
    /// Creates a deployment record.
    #[must_use]
    pub const fn new(
        platform: PlatformVersion,
        application: ApplicationVersion,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            platform,
            application,
            at,
        }
    }
}

/// A managed application: the aggregate root the trigger operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    id: ApplicationId,
    deployment_spec: DeploymentSpec,
    change: Change,
    outstanding_change: Change,
    deployment_jobs: DeploymentJobs,
    deployments: BTreeMap<ZoneId, Deployment>,
}

impl Application {
    /// Creates a new application with no change and no history.
    #[must_use]
    pub fn new(id: ApplicationId, deployment_spec: DeploymentSpec) -> Self {
        Self {
            id,
            deployment_spec,
            change: Change::empty(),
            outstanding_change: Change::empty(),
            deployment_jobs: DeploymentJobs::default(),
            deployments: BTreeMap::new(),
        }
    }

    /// Returns the application's identity.
    #[must_use]
    pub const fn id(&self) -> &ApplicationId {
        &self.id
    }

    /// Returns the application's deployment spec.
    #[must_use]
    pub const fn deployment_spec(&self) -> &DeploymentSpec {
        &self.deployment_spec
    }

    /// Returns the change currently in progress; empty if none.
    #[must_use]
    pub const fn change(&self) -> &Change {
        &self.change
    }

    /// Returns the successfully built change waiting for the current one.
    #[must_use]
    pub const fn outstanding_change(&self) -> &Change {
        &self.outstanding_change
    }

    /// Returns the application's job history and build-service registration.
    #[must_use]
    pub const fn deployment_jobs(&self) -> &DeploymentJobs {
        &self.deployment_jobs
    }

    /// Returns the live deployments by zone.
    #[must_use]
    pub const fn deployments(&self) -> &BTreeMap<ZoneId, Deployment> {
        &self.deployments
    }

    /// Returns the deployment in the zone the given job deploys to, if any.
    #[must_use]
    pub fn deployment_for(&self, job_type: &JobType) -> Option<&Deployment> {
        job_type.zone().and_then(|zone| self.deployments.get(zone))
    }

    /// Returns the newest platform version deployed in any zone.
    #[must_use]
    pub fn latest_deployed_platform(&self) -> Option<PlatformVersion> {
        self.deployments.values().map(|d| d.platform).max()
    }

    /// Returns the newest application version deployed in any zone.
    #[must_use]
    pub fn latest_deployed_application(&self) -> Option<ApplicationVersion> {
        self.deployments.values().map(|d| d.application.clone()).max()
    }

    /// Returns this application with a new deployment spec.
    #[must_use]
    pub fn with_deployment_spec(mut self, deployment_spec: DeploymentSpec) -> Self {
        self.deployment_spec = deployment_spec;
        self
    }

    /// Returns this application with the given change in progress.
    #[must_use]
    pub fn with_change(mut self, change: Change) -> Self {
        self.change = change;
        self
    }

    /// Returns this application with the given outstanding change.
    #[must_use]
    pub fn with_outstanding_change(mut self, change: Change) -> Self {
        self.outstanding_change = change;
        self
    }

    /// Returns this application registered under the given build-service project.
    #[must_use]
    pub fn with_project_id(mut self, project_id: ProjectId) -> Self {
        self.deployment_jobs = self.deployment_jobs.with_project_id(project_id);
        self
    }

    /// Returns this application with its build-service registration cleared.
    #[must_use]
    pub fn without_project_id(mut self) -> Self {
        self.deployment_jobs = self.deployment_jobs.without_project_id();
        self
    }

    /// Returns this application with a triggering recorded for the given job.
    #[must_use]
    pub fn with_job_triggering(mut self, job_type: JobType, run: JobRun) -> Self {
        self.deployment_jobs = self.deployment_jobs.with_triggering(job_type, run);
        self
    }

    /// Returns this application with a completion recorded for the given job.
    #[must_use]
    pub fn with_job_completion(
        mut self,
        job_type: JobType,
        run: JobRun,
        error: Option<JobError>,
    ) -> Self {
        self.deployment_jobs = self.deployment_jobs.with_completion(job_type, run, error);
        self
    }

    /// Returns this application with a deployment recorded in the given zone.
    #[must_use]
    pub fn with_deployment(mut self, zone: ZoneId, deployment: Deployment) -> Self {
        self.deployments.insert(zone, deployment);
        self
    }

    /// Returns whether the current change is blocked at the given instant.
    #[must_use]
    pub fn is_blocked(&self, at: DateTime<Utc>) -> bool {
        self.deployment_spec.blocked_by(&self.change, at)
    }
}
