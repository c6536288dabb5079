//! Configuration for the deployment trigger.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The Capstan system a trigger instance serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemName {
    /// The serving system.
    #[default]
    Main,
    /// The continuous-deployment system the platform itself is verified in.
    Cd,
}

impl SystemName {
    /// Returns the canonical lowercase name of this system.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Cd => "cd",
        }
    }
}

/// Configuration of the deployment trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerConfig {
    /// The system this trigger serves.
    pub system: SystemName,
    /// Seconds between ready-jobs sweeps when driven by the ticker.
    pub tick_interval_seconds: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            system: SystemName::default(),
            tick_interval_seconds: 30,
        }
    }
}

impl TriggerConfig {
    /// Creates the configuration for the given system with default intervals.
    #[must_use]
    pub fn for_system(system: SystemName) -> Self {
        Self {
            system,
            ..Self::default()
        }
    }

    /// Reads the configuration from the environment.
    ///
    /// - `CAPSTAN_SYSTEM`: `main` (default) or `cd`
    /// - `CAPSTAN_TICK_INTERVAL_SECONDS`: sweep cadence, default 30
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown values.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(system) = std::env::var("CAPSTAN_SYSTEM") {
            config.system = match system.as_str() {
                "main" => SystemName::Main,
                "cd" => SystemName::Cd,
                other => {
                    return Err(Error::configuration(format!("unknown system '{other}'")));
                }
            };
        }
        if let Ok(interval) = std::env::var("CAPSTAN_TICK_INTERVAL_SECONDS") {
            config.tick_interval_seconds = interval
                .parse()
                .map_err(|_| Error::configuration("invalid CAPSTAN_TICK_INTERVAL_SECONDS"))?;
        }
        Ok(config)
    }

    /// The max duration a job may run before it is considered dead.
    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        match self.system {
            SystemName::Main => Duration::hours(12),
            SystemName::Cd => Duration::hours(1),
        }
    }
}
