//! The concrete versions a prospective job run targets.
//!
//! A [`Versions`] pairs the target platform and application versions with the
//! optional source versions the run upgrades from. Sources are the pre-change
//! deployed values when they differ from the targets, and absent otherwise;
//! the staging test uses them to verify the actual upgrade path.

use std::fmt;

use serde::{Deserialize, Serialize};

use capstan_core::{ApplicationVersion, Change, PlatformVersion};

use crate::application::{Application, Deployment};
use crate::jobs::JobRun;

/// Target and optional source versions for one job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versions {
    /// The platform version the run targets.
    pub target_platform: PlatformVersion,
    /// The application version the run targets.
    pub target_application: ApplicationVersion,
    /// The platform version the run upgrades from, if different.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_platform: Option<PlatformVersion>,
    /// The application version the run upgrades from, if different.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_application: Option<ApplicationVersion>,
}

impl Versions {
    /// Creates versions with targets only.
    #[must_use]
    pub const fn new(
        target_platform: PlatformVersion,
        target_application: ApplicationVersion,
    ) -> Self {
        Self {
            target_platform,
            target_application,
            source_platform: None,
            source_application: None,
        }
    }

    /// Computes the versions a job run for the given change would target.
    ///
    /// Targets fall back from the change to what is already deployed, and
    /// finally to the system platform version and the unknown application
    /// version. Sources are taken from the zone's existing deployment when
    /// they differ from the targets.
    #[must_use]
    pub fn from(
        change: &Change,
        application: &Application,
        deployment: Option<&Deployment>,
        system_version: &PlatformVersion,
    ) -> Self {
        let deployed_platform = deployment
            .map(|d| d.platform)
            .or_else(|| application.latest_deployed_platform());
        let deployed_application = deployment
            .map(|d| d.application.clone())
            .or_else(|| application.latest_deployed_application());

        let target_platform = change
            .platform()
            .copied()
            .or(deployed_platform)
            .unwrap_or(*system_version);
        let target_application = change
            .application()
            .cloned()
            .or(deployed_application)
            .unwrap_or_else(ApplicationVersion::unknown);

        let source_platform = deployment
            .map(|d| d.platform)
            .filter(|platform| *platform != target_platform);
        let source_application = deployment
            .map(|d| d.application.clone())
            .filter(|application| *application != target_application);

        Self {
            target_platform,
            target_application,
            source_platform,
            source_application,
        }
    }

    /// Returns whether the given run targeted the same versions.
    #[must_use]
    pub fn targets_match(&self, run: &JobRun) -> bool {
        self.target_platform == run.versions.target_platform
            && self.target_application == run.versions.target_application
    }

    /// Returns whether the given run had the same sources, where present here.
    ///
    /// Absent sources on this value match anything; a present source must be
    /// mirrored by the run.
    #[must_use]
    pub fn sources_match_if_present(&self, run: &JobRun) -> bool {
        (self.source_platform.is_none() || self.source_platform == run.versions.source_platform)
            && (self.source_application.is_none()
                || self.source_application == run.versions.source_application)
    }
}

impl fmt::Display for Versions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "platform {}, application {}",
            self.target_platform, self.target_application
        )?;
        if let Some(source) = &self.source_platform {
            write!(f, " (platform from {source})")?;
        }
        if let Some(source) = &self.source_application {
            write!(f, " (application from {source})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use capstan_core::{DeploymentSpec, SourceRevision, ZoneId};

    fn app_version(build: u64) -> ApplicationVersion {
        ApplicationVersion::from(SourceRevision::new("repo", "main", "3b5c9e1aa"), build)
    }

    fn application() -> Application {
        Application::new("acme.shop".parse().unwrap(), DeploymentSpec::empty())
    }

    fn deployment(platform: PlatformVersion, application: ApplicationVersion) -> Deployment {
        Deployment::new(
            platform,
            application,
            Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn targets_fall_back_to_system_and_unknown() {
        let versions = Versions::from(
            &Change::of_platform(PlatformVersion::new(7, 3, 0)),
            &application(),
            None,
            &PlatformVersion::new(7, 2, 0),
        );
        assert_eq!(versions.target_platform, PlatformVersion::new(7, 3, 0));
        assert!(versions.target_application.is_unknown());
        assert!(versions.source_platform.is_none());

        let baseline = Versions::from(
            &Change::empty(),
            &application(),
            None,
            &PlatformVersion::new(7, 2, 0),
        );
        assert_eq!(baseline.target_platform, PlatformVersion::new(7, 2, 0));
    }

    #[test]
    fn sources_are_the_pre_change_deployed_values() {
        let deployed = deployment(PlatformVersion::new(7, 2, 0), app_version(41));
        let versions = Versions::from(
            &Change::of_platform(PlatformVersion::new(7, 3, 0)),
            &application(),
            Some(&deployed),
            &PlatformVersion::new(7, 2, 0),
        );
        assert_eq!(versions.target_platform, PlatformVersion::new(7, 3, 0));
        assert_eq!(versions.target_application, app_version(41));
        assert_eq!(versions.source_platform, Some(PlatformVersion::new(7, 2, 0)));
        assert!(versions.source_application.is_none());
    }

    #[test]
    fn targets_fall_back_to_zone_deployment() {
        let deployed = deployment(PlatformVersion::new(7, 2, 0), app_version(41));
        let versions = Versions::from(
            &Change::of_application(app_version(42)),
            &application(),
            Some(&deployed),
            &PlatformVersion::new(7, 4, 0),
        );
        assert_eq!(versions.target_platform, PlatformVersion::new(7, 2, 0));
        assert_eq!(versions.target_application, app_version(42));
        assert_eq!(versions.source_application, Some(app_version(41)));
    }

    #[test]
    fn deployed_versions_back_targets_without_zone() {
        let app = application().with_deployment(
            ZoneId::prod("us-east-1").unwrap(),
            deployment(PlatformVersion::new(7, 2, 0), app_version(41)),
        );
        let versions = Versions::from(&Change::empty(), &app, None, &PlatformVersion::new(7, 4, 0));
        assert_eq!(versions.target_platform, PlatformVersion::new(7, 2, 0));
        assert_eq!(versions.target_application, app_version(41));
    }

    #[test]
    fn matching_against_job_runs() {
        let versions = Versions::new(PlatformVersion::new(7, 3, 0), app_version(42));
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let run = JobRun::triggering(versions.clone(), "run", at);
        assert!(versions.targets_match(&run));
        assert!(versions.sources_match_if_present(&run));

        let mut with_source = versions.clone();
        with_source.source_platform = Some(PlatformVersion::new(7, 2, 0));
        assert!(with_source.targets_match(&run));
        assert!(!with_source.sources_match_if_present(&run));
    }
}
