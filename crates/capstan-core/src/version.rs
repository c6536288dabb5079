//! Platform and application version tokens.
//!
//! Two version spaces exist on the platform:
//!
//! - [`PlatformVersion`]: the runtime version, supplied by the system
//!   controller and rolled out across all applications
//! - [`ApplicationVersion`]: an opaque comparable token produced by a
//!   successful component (build) job, combining the built source revision
//!   with the build number
//!
//! Both are totally ordered so upgrade/downgrade decisions reduce to
//! comparisons.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The version of the platform runtime, as `major.minor.micro`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct PlatformVersion {
    /// Major version component.
    pub major: u32,
    /// Minor version component.
    pub minor: u32,
    /// Micro version component.
    pub micro: u32,
}

impl PlatformVersion {
    /// Creates a platform version from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

impl FromStr for PlatformVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.');
        let mut next = |name: &str| -> Result<u32> {
            parts
                .next()
                .map_or(Ok(0), |p| {
                    p.parse().map_err(|_| {
                        Error::invalid_version(format!("non-numeric {name} component in '{s}'"))
                    })
                })
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let micro = next("micro")?;
        if parts.next().is_some() {
            return Err(Error::invalid_version(format!(
                "'{s}' has more than three components"
            )));
        }
        Ok(Self::new(major, minor, micro))
    }
}

/// The source revision a component build was made from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRevision {
    /// Repository the source was checked out from.
    pub repository: String,
    /// Branch the source was checked out from.
    pub branch: String,
    /// Commit hash of the built source.
    pub commit: String,
}

impl SourceRevision {
    /// Creates a source revision.
    #[must_use]
    pub fn new(
        repository: impl Into<String>,
        branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
            commit: commit.into(),
        }
    }

    /// Returns a shortened commit hash for display.
    #[must_use]
    pub fn short_commit(&self) -> &str {
        &self.commit[..self.commit.len().min(9)]
    }
}

/// An opaque comparable token for a built application package.
///
/// Produced by a successful component job from the built source revision and
/// the build number. The [`ApplicationVersion::unknown`] sentinel stands in
/// when the platform has no knowledge of what was built, e.g. for packages
/// deployed before build tracking existed.
///
/// Ordering follows the build number; the sentinel sorts before every known
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationVersion {
    /// Source the package was built from, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRevision>,
    /// Build number assigned by the build service, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<u64>,
}

impl ApplicationVersion {
    /// The sentinel for an unknown application version.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            source: None,
            build_number: None,
        }
    }

    /// Creates an application version from a source revision and build number.
    #[must_use]
    pub const fn from(source: SourceRevision, build_number: u64) -> Self {
        Self {
            source: Some(source),
            build_number: Some(build_number),
        }
    }

    /// Returns whether this is the unknown sentinel.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.build_number.is_none()
    }
}

impl PartialOrd for ApplicationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ApplicationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.build_number
            .cmp(&other.build_number)
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl fmt::Display for ApplicationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.build_number, &self.source) {
            (Some(build), Some(source)) => write!(f, "{build}-{}", source.short_commit()),
            (Some(build), None) => write!(f, "{build}"),
            _ => f.write_str("unknown"),
        }
    }
}
