//! Reconciliation of build-service completion reports into application state.

use tracing::{info, warn};

use capstan_core::{ApplicationVersion, Change};

use crate::application::Application;
use crate::calculus;
use crate::error::{Error, Result};
use crate::jobs::{JobReport, JobRun, JobType};
use crate::trigger::DeploymentTrigger;
use crate::versions::Versions;

impl DeploymentTrigger {
    /// Records a job completion and advances the application's change.
    ///
    /// Called by the build-service webhook handler for every completed job,
    /// successful or not. Under the application lock this records the
    /// completion, adopts the report's project id, handles component builds
    /// (stacking the built version onto the current change, or parking it as
    /// the outstanding change), strips completed components off the current
    /// change, and promotes the outstanding change when the current one is
    /// done. Reports for unknown applications are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] for a completion whose job was
    /// never triggered; this indicates corrupted state. Store failures
    /// propagate.
    pub async fn notify_of_completion(&self, report: &JobReport) -> Result<()> {
        let Some(locked) = self.store().lock_if_present(&report.application_id).await? else {
            warn!(
                application = %report.application_id,
                job = %report.job_type,
                "dropping completion for unknown application"
            );
            self.metrics().record_completion("dropped");
            return Ok(());
        };

        let now = self.clock().now();
        let system_version = self.system_version();
        let application = locked.application();

        let built_version = (report.job_type == JobType::Component).then(|| {
            report
                .source_revision
                .clone()
                .map_or_else(ApplicationVersion::unknown, |source| {
                    ApplicationVersion::from(source, report.build_number)
                })
        });

        // The completion is recorded against the versions of its triggering.
        // Component jobs are initiated by the tenant's own pipeline, so their
        // triggering is synthesized here.
        let (completion_versions, reason) = if let Some(built) = &built_version {
            let versions = Versions::from(
                &Change::of_application(built.clone()),
                application,
                None,
                &system_version,
            );
            (versions, "Component build by tenant".to_string())
        } else {
            let triggered = application
                .deployment_jobs()
                .status_of(&report.job_type)
                .and_then(|status| status.last_triggered())
                .ok_or_else(|| {
                    Error::completion_without_triggering(&report.application_id, &report.job_type)
                })?;
            (triggered.versions.clone(), triggered.reason.clone())
        };

        let mut locked = locked.update(|application| {
            let mut application = application.with_project_id(report.project_id);
            if built_version.is_some() {
                application = application.with_job_triggering(
                    JobType::Component,
                    JobRun::triggering(completion_versions.clone(), reason.clone(), now),
                );
            }
            application.with_job_completion(
                report.job_type.clone(),
                JobRun::completion(completion_versions, reason, now, report.build_number),
                report.error,
            )
        });

        if let Some(built) = built_version.filter(|_| report.success()) {
            locked = locked.update(|application| {
                if accept_new_application_version(&application, now) {
                    let change = application.change().clone().with_application(built);
                    application
                        .with_change(change)
                        .with_outstanding_change(Change::empty())
                } else {
                    info!(
                        application = %report.application_id,
                        version = %built,
                        "parking built version as outstanding change"
                    );
                    application.with_outstanding_change(Change::of_application(built))
                }
            });
        }

        locked = locked.update(|application| {
            let remaining = calculus::remaining_change(&application, &system_version);
            if remaining.is_present() || !application.outstanding_change().is_present() {
                application.with_change(remaining)
            } else {
                let outstanding = application.outstanding_change().clone();
                info!(
                    application = %report.application_id,
                    change = %outstanding,
                    "change complete; promoting outstanding change"
                );
                application
                    .with_change(outstanding)
                    .with_outstanding_change(Change::empty())
            }
        });

        self.metrics()
            .record_completion(if report.success() { "success" } else { "failure" });
        self.store().store(locked).await
    }
}

/// Whether a freshly built application version may join the current change.
///
/// Accepted when no platform change is in flight, when an application change
/// already is (stacking application changes is safe), when jobs are failing
/// (a fix must be allowed through), or while the platform change sits in a
/// block window.
fn accept_new_application_version(
    application: &Application,
    at: chrono::DateTime<chrono::Utc>,
) -> bool {
    if !application.change().is_present() {
        return true;
    }
    if application.change().application().is_some() {
        return true;
    }
    if application.deployment_jobs().has_failures() {
        return true;
    }
    application.is_blocked(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use capstan_core::{DeploymentSpec, PlatformVersion, SourceRevision};

    use crate::jobs::JobError;

    fn app(change: Change) -> Application {
        Application::new("acme.shop".parse().unwrap(), DeploymentSpec::empty()).with_change(change)
    }

    fn at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
    }

    fn versions() -> Versions {
        Versions::new(PlatformVersion::new(7, 3, 0), ApplicationVersion::unknown())
    }

    #[test]
    fn accepts_when_idle_or_stacking_or_failing() {
        assert!(accept_new_application_version(&app(Change::empty()), at()));

        let stacking = app(Change::of_application(ApplicationVersion::from(
            SourceRevision::new("repo", "main", "3b5c9e1aa"),
            41,
        )));
        assert!(accept_new_application_version(&stacking, at()));

        let failing = app(Change::of_platform(PlatformVersion::new(7, 3, 0)))
            .with_job_completion(
                JobType::SystemTest,
                JobRun::completion(versions(), "run", at(), 1),
                Some(JobError::TestFailure),
            );
        assert!(accept_new_application_version(&failing, at()));
    }

    #[test]
    fn waits_behind_a_healthy_platform_upgrade() {
        let upgrading = app(Change::of_platform(PlatformVersion::new(7, 3, 0)));
        assert!(!accept_new_application_version(&upgrading, at()));
    }
}
