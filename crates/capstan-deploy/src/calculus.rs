//! The change calculus: when is a change tested, deployed, done?
//!
//! Pure functions over an application snapshot. The planner uses them to
//! decide what still needs to run; the reconciler uses [`remaining_change`]
//! to strip completed components off the current change until it is empty.
//!
//! A production zone is never downgraded: when the current change targets
//! something strictly older than what a zone already runs, the change counts
//! as complete for that zone (this is how a broken change is rolled back
//! without rolling zones back).

use capstan_core::{Change, PlatformVersion};

use crate::application::{Application, Deployment};
use crate::jobs::JobType;
use crate::steps::{DeploymentSteps, Step};
use crate::versions::Versions;

/// Returns whether the change moves past either of the deployment's versions.
#[must_use]
pub fn is_upgrade(change: &Change, deployment: &Deployment) -> bool {
    change.upgrades_platform(&deployment.platform)
        || change.upgrades_application(&deployment.application)
}

/// Returns whether the change moves behind either of the deployment's versions.
#[must_use]
pub fn is_downgrade(change: &Change, deployment: &Deployment) -> bool {
    change.downgrades_platform(&deployment.platform)
        || change.downgrades_application(&deployment.application)
}

/// Returns whether the given change is complete for the given job.
///
/// A change is complete for a job when the job's last success targeted the
/// versions the change would have it run. It is also complete for a
/// production job whose zone already runs something the change does not
/// upgrade, while the application's full current change downgrades that
/// deployment: the zone is protected from the downgrade instead of redeployed.
///
/// The empty change requires nothing and is complete for every job.
#[must_use]
pub fn is_complete(
    change: &Change,
    application: &Application,
    job_type: &JobType,
    system_version: &PlatformVersion,
) -> bool {
    if !change.is_present() {
        return true;
    }

    let deployment = application.deployment_for(job_type);
    let versions = Versions::from(change, application, deployment, system_version);

    let succeeded = application
        .deployment_jobs()
        .status_of(job_type)
        .and_then(|status| status.last_success())
        .is_some_and(|success| versions.targets_match(success));
    if succeeded {
        return true;
    }

    job_type.is_production()
        && deployment.is_some_and(|deployment| {
            !is_upgrade(change, deployment) && is_downgrade(application.change(), deployment)
        })
}

/// Returns whether the given versions have passed the test pipeline.
///
/// Tested means a successful system test with matching targets and a
/// successful staging test with matching targets and sources; a production
/// job already triggered on the same versions also counts, as proof by
/// progression.
#[must_use]
pub fn is_tested(application: &Application, versions: &Versions) -> bool {
    let jobs = application.deployment_jobs();
    let system_test_passed = jobs
        .status_of(&JobType::SystemTest)
        .and_then(|status| status.last_success())
        .is_some_and(|success| versions.targets_match(success));
    let staging_test_passed = jobs
        .status_of(&JobType::StagingTest)
        .and_then(|status| status.last_success())
        .is_some_and(|success| {
            versions.targets_match(success) && versions.sources_match_if_present(success)
        });

    (system_test_passed && staging_test_passed) || already_triggered(application, versions)
}

/// Returns whether some production job was already triggered on these versions.
#[must_use]
pub fn already_triggered(application: &Application, versions: &Versions) -> bool {
    application
        .deployment_jobs()
        .job_status()
        .iter()
        .filter(|(job_type, _)| job_type.is_production())
        .filter_map(|(_, status)| status.last_triggered())
        .any(|triggered| versions.targets_match(triggered))
}

/// Returns what remains of the application's current change.
///
/// Each component of the change is stripped once every production job (or,
/// for spec without production zones, every test job) is complete for the
/// change reduced to that component. An empty result means the change is
/// done.
#[must_use]
pub fn remaining_change(application: &Application, system_version: &PlatformVersion) -> Change {
    let steps = DeploymentSteps::of(application.deployment_spec());
    let mut jobs: Vec<JobType> = steps
        .production()
        .iter()
        .flat_map(|step: &Step| DeploymentSteps::to_jobs(step))
        .collect();
    if jobs.is_empty() {
        jobs = steps.test_jobs();
    }

    let current = application.change().clone();
    let platform_done = jobs.iter().all(|job_type| {
        is_complete(
            &current.clone().without_application(),
            application,
            job_type,
            system_version,
        )
    });
    let application_done = jobs.iter().all(|job_type| {
        is_complete(
            &current.clone().without_platform(),
            application,
            job_type,
            system_version,
        )
    });

    let mut remaining = current;
    if platform_done {
        remaining = remaining.without_platform();
    }
    if application_done {
        remaining = remaining.without_application();
    }
    remaining
}
