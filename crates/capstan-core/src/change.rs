//! The declared intended change of an application.
//!
//! A [`Change`] is a pair of optional targets: a new platform version, a new
//! application version, or both. The empty change means no migration is in
//! progress. All helpers are pure; a change never references the application
//! it belongs to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::{ApplicationVersion, PlatformVersion};

/// A desired `{platform?, application?}` migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Target platform version, if the platform should change.
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<PlatformVersion>,
    /// Target application version, if the application should change.
    #[serde(skip_serializing_if = "Option::is_none")]
    application: Option<ApplicationVersion>,
}

impl Change {
    /// The empty change: no migration in progress.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            platform: None,
            application: None,
        }
    }

    /// A change to the given platform version only.
    #[must_use]
    pub const fn of_platform(platform: PlatformVersion) -> Self {
        Self {
            platform: Some(platform),
            application: None,
        }
    }

    /// A change to the given application version only.
    #[must_use]
    pub const fn of_application(application: ApplicationVersion) -> Self {
        Self {
            platform: None,
            application: Some(application),
        }
    }

    /// Returns this change with the given platform version target.
    #[must_use]
    pub fn with_platform(mut self, platform: PlatformVersion) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Returns this change with the given application version target.
    #[must_use]
    pub fn with_application(mut self, application: ApplicationVersion) -> Self {
        self.application = Some(application);
        self
    }

    /// Returns this change without its platform component.
    #[must_use]
    pub fn without_platform(mut self) -> Self {
        self.platform = None;
        self
    }

    /// Returns this change without its application component.
    #[must_use]
    pub fn without_application(mut self) -> Self {
        self.application = None;
        self
    }

    /// Returns the target platform version, if any.
    #[must_use]
    pub const fn platform(&self) -> Option<&PlatformVersion> {
        self.platform.as_ref()
    }

    /// Returns the target application version, if any.
    #[must_use]
    pub const fn application(&self) -> Option<&ApplicationVersion> {
        self.application.as_ref()
    }

    /// Returns whether any migration is declared.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.platform.is_some() || self.application.is_some()
    }

    /// Returns whether this change moves the platform past the given version.
    #[must_use]
    pub fn upgrades_platform(&self, version: &PlatformVersion) -> bool {
        self.platform.as_ref().is_some_and(|target| target > version)
    }

    /// Returns whether this change moves the application past the given version.
    #[must_use]
    pub fn upgrades_application(&self, version: &ApplicationVersion) -> bool {
        self.application
            .as_ref()
            .is_some_and(|target| target > version)
    }

    /// Returns whether this change moves the platform behind the given version.
    #[must_use]
    pub fn downgrades_platform(&self, version: &PlatformVersion) -> bool {
        self.platform.as_ref().is_some_and(|target| target < version)
    }

    /// Returns whether this change moves the application behind the given version.
    #[must_use]
    pub fn downgrades_application(&self, version: &ApplicationVersion) -> bool {
        self.application
            .as_ref()
            .is_some_and(|target| target < version)
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.platform, &self.application) {
            (Some(platform), Some(application)) => {
                write!(f, "platform {platform} and application {application}")
            }
            (Some(platform), None) => write!(f, "platform {platform}"),
            (None, Some(application)) => write!(f, "application {application}"),
            (None, None) => f.write_str("no change"),
        }
    }
}
