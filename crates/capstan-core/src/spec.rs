//! The declarative deployment pipeline of an application.
//!
//! A [`DeploymentSpec`] is the parsed form of an application's rollout
//! declaration: an ordered list of steps (test stages, delays, production
//! zones, parallel groups) plus zero or more change-block windows. Parsing
//! from the owner-facing format happens elsewhere; this module only models
//! the structure and answers questions about it.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::error::{Error, Result};
use crate::id::{Environment, ZoneId};

/// One step of a deployment pipeline, in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecStep {
    /// Run the functional system test suite.
    SystemTest,
    /// Run the staging upgrade test suite.
    StagingTest,
    /// Hold the rollout for the given number of seconds.
    Delay {
        /// Seconds to hold before the next step may start.
        seconds: u32,
    },
    /// Deploy to a single production zone.
    Zone {
        /// The target zone.
        zone: ZoneId,
    },
    /// Deploy to several production zones concurrently.
    Parallel {
        /// The target zones, in declared order.
        zones: Vec<ZoneId>,
    },
}

impl SpecStep {
    /// Returns whether this step is a test stage.
    #[must_use]
    pub const fn is_test(&self) -> bool {
        matches!(self, Self::SystemTest | Self::StagingTest)
    }

    /// Returns the delay of this step, if it is a delay step.
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Delay { seconds } => Some(Duration::seconds(i64::from(*seconds))),
            _ => None,
        }
    }
}

/// A timespan during which changes of some kind must not advance.
///
/// A blocker matches when the instant falls on one of its days and within one
/// of its hours, in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBlocker {
    /// Whether platform (version) changes are blocked.
    pub version: bool,
    /// Whether application (revision) changes are blocked.
    pub revision: bool,
    /// The recurring window this blocker covers.
    pub window: TimeWindow,
}

impl ChangeBlocker {
    /// Returns whether this blocker applies to the given change at the given instant.
    #[must_use]
    pub fn blocks(&self, change: &Change, at: DateTime<Utc>) -> bool {
        let kind_matches = (self.version && change.platform().is_some())
            || (self.revision && change.application().is_some());
        kind_matches && self.window.contains(at)
    }
}

/// A recurring weekly window given as days and hours, in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// Lowercase three-letter day names, e.g. `["mon", "tue"]`.
    days: Vec<String>,
    /// Hours of the day, 0 through 23.
    hours: Vec<u32>,
}

impl TimeWindow {
    /// Creates a time window after validating days and hours.
    ///
    /// # Errors
    ///
    /// Returns an error if a day name is unknown or an hour is out of range.
    pub fn new(days: Vec<String>, hours: Vec<u32>) -> Result<Self> {
        for day in &days {
            weekday_from_name(day)?;
        }
        if let Some(hour) = hours.iter().find(|h| **h > 23) {
            return Err(Error::invalid_spec(format!("hour {hour} is out of range")));
        }
        Ok(Self { days, hours })
    }

    /// Returns whether the given instant falls within this window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day_matches = self
            .days
            .iter()
            .filter_map(|d| weekday_from_name(d).ok())
            .any(|d| d == at.weekday());
        day_matches && self.hours.contains(&at.hour())
    }
}

fn weekday_from_name(name: &str) -> Result<Weekday> {
    match name {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        other => Err(Error::invalid_spec(format!("unknown day name '{other}'"))),
    }
}

/// The parsed deployment pipeline declaration of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Pipeline steps in declared order.
    #[serde(default)]
    steps: Vec<SpecStep>,
    /// Change-block windows.
    #[serde(default)]
    change_blockers: Vec<ChangeBlocker>,
}

impl DeploymentSpec {
    /// The empty spec: no steps, no blockers.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            steps: Vec::new(),
            change_blockers: Vec::new(),
        }
    }

    /// Creates a spec from steps and blockers, validating zone environments.
    ///
    /// # Errors
    ///
    /// Returns an error if a zone or parallel step names a non-production zone.
    pub fn new(steps: Vec<SpecStep>, change_blockers: Vec<ChangeBlocker>) -> Result<Self> {
        for step in &steps {
            let zones: &[ZoneId] = match step {
                SpecStep::Zone { zone } => std::slice::from_ref(zone),
                SpecStep::Parallel { zones } => zones,
                _ => &[],
            };
            if let Some(zone) = zones
                .iter()
                .find(|z| z.environment() != Environment::Prod)
            {
                return Err(Error::invalid_spec(format!(
                    "deployment step names non-production zone {zone}"
                )));
            }
        }
        Ok(Self {
            steps,
            change_blockers,
        })
    }

    /// Returns the pipeline steps in declared order.
    #[must_use]
    pub fn steps(&self) -> &[SpecStep] {
        &self.steps
    }

    /// Returns whether the spec declares any test stage.
    #[must_use]
    pub fn declares_tests(&self) -> bool {
        self.steps.iter().any(SpecStep::is_test)
    }

    /// Returns all production zones in declared order.
    #[must_use]
    pub fn zones(&self) -> Vec<&ZoneId> {
        self.steps
            .iter()
            .flat_map(|step| match step {
                SpecStep::Zone { zone } => std::slice::from_ref(zone),
                SpecStep::Parallel { zones } => zones.as_slice(),
                _ => &[],
            })
            .collect()
    }

    /// Returns whether the given change is blocked from advancing at the given instant.
    #[must_use]
    pub fn blocked_by(&self, change: &Change, at: DateTime<Utc>) -> bool {
        self.change_blockers
            .iter()
            .any(|blocker| blocker.blocks(change, at))
    }
}
