//! Strongly-typed identifiers for Capstan entities.
//!
//! All identifiers are:
//! - **Strongly typed**: mixing up id kinds fails at compile time
//! - **Validated**: names follow DNS-compatible rules at construction
//! - **Cheap values**: plain strings and small enums, freely cloneable
//!
//! # Example
//!
//! ```rust
//! use capstan_core::id::{ApplicationId, ZoneId, Environment};
//!
//! let id: ApplicationId = "acme.shop".parse().unwrap();
//! assert_eq!(id.tenant().as_str(), "acme");
//!
//! let zone = ZoneId::new(Environment::Prod, "us-east-1").unwrap();
//! assert_eq!(zone.to_string(), "prod.us-east-1");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Validates a DNS-compatible name segment (tenants, applications, regions).
fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_id(format!("{kind} name cannot be empty")));
    }
    if name.len() > 63 {
        return Err(Error::invalid_id(format!(
            "{kind} name '{name}' is too long (maximum 63 characters)"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::invalid_id(format!(
            "{kind} name '{name}' contains invalid characters \
             (only lowercase letters, digits, and hyphens allowed)"
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(Error::invalid_id(format!(
            "{kind} name '{name}' cannot start or end with a hyphen"
        )));
    }
    Ok(())
}

/// The name of a tenant owning applications on the platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantName(String);

impl TenantName {
    /// Creates a new tenant name after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a valid DNS-compatible segment.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name("tenant", &name)?;
        Ok(Self(name))
    }

    /// Returns the tenant name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The name of an application within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationName(String);

impl ApplicationName {
    /// Creates a new application name after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a valid DNS-compatible segment.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name("application", &name)?;
        Ok(Self(name))
    }

    /// Returns the application name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The tenant-qualified identity of a managed application.
///
/// Serialized as `tenant.application`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationId {
    tenant: TenantName,
    application: ApplicationName,
}

impl ApplicationId {
    /// Creates an application id from its parts.
    #[must_use]
    pub const fn new(tenant: TenantName, application: ApplicationName) -> Self {
        Self {
            tenant,
            application,
        }
    }

    /// Returns the owning tenant.
    #[must_use]
    pub const fn tenant(&self) -> &TenantName {
        &self.tenant
    }

    /// Returns the application name within the tenant.
    #[must_use]
    pub const fn application(&self) -> &ApplicationName {
        &self.application
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.tenant, self.application)
    }
}

impl FromStr for ApplicationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (tenant, application) = s.split_once('.').ok_or_else(|| {
            Error::invalid_id(format!(
                "application id '{s}' must have the form tenant.application"
            ))
        })?;
        Ok(Self::new(
            TenantName::new(tenant)?,
            ApplicationName::new(application)?,
        ))
    }
}

impl TryFrom<String> for ApplicationId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ApplicationId> for String {
    fn from(value: ApplicationId) -> Self {
        value.to_string()
    }
}

/// The id of an application's project in the external build service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProjectId(u64);

impl ProjectId {
    /// Creates a project id from its numeric value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value of this project id.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of environment a zone belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Short-lived functional test environment.
    Test,
    /// Production-like environment for upgrade verification.
    Staging,
    /// Serving environment.
    Prod,
}

impl Environment {
    /// Returns the canonical lowercase name of this environment.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Staging => "staging",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "test" => Ok(Self::Test),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            other => Err(Error::invalid_id(format!("unknown environment '{other}'"))),
        }
    }
}

/// A named target environment that can host a deployment.
///
/// Serialized as `environment.region`, e.g. `prod.us-east-1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ZoneId {
    environment: Environment,
    region: String,
}

impl ZoneId {
    /// Creates a zone id after validating the region name.
    ///
    /// # Errors
    ///
    /// Returns an error if the region is not a valid DNS-compatible segment.
    pub fn new(environment: Environment, region: impl Into<String>) -> Result<Self> {
        let region = region.into();
        validate_name("region", &region)?;
        Ok(Self {
            environment,
            region,
        })
    }

    /// Creates a production zone id.
    ///
    /// # Errors
    ///
    /// Returns an error if the region is not a valid DNS-compatible segment.
    pub fn prod(region: impl Into<String>) -> Result<Self> {
        Self::new(Environment::Prod, region)
    }

    /// Returns the environment this zone belongs to.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    /// Returns the region name of this zone.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.environment, self.region)
    }
}

impl FromStr for ZoneId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (environment, region) = s.split_once('.').ok_or_else(|| {
            Error::invalid_id(format!("zone id '{s}' must have the form environment.region"))
        })?;
        Self::new(environment.parse()?, region)
    }
}

impl TryFrom<String> for ZoneId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ZoneId> for String {
    fn from(value: ZoneId) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_id_roundtrip() {
        let id: ApplicationId = "acme.shop".parse().unwrap();
        assert_eq!(id.tenant().as_str(), "acme");
        assert_eq!(id.application().as_str(), "shop");
        assert_eq!(id.to_string().parse::<ApplicationId>().unwrap(), id);
    }

    #[test]
    fn application_id_rejects_missing_separator() {
        assert!("acmeshop".parse::<ApplicationId>().is_err());
    }

    #[test]
    fn names_are_validated() {
        assert!(TenantName::new("Acme").is_err());
        assert!(TenantName::new("-acme").is_err());
        assert!(TenantName::new("").is_err());
        assert!(ApplicationName::new("shop-2").is_ok());
    }

    #[test]
    fn zone_id_roundtrip() {
        let zone = ZoneId::prod("us-east-1").unwrap();
        assert_eq!(zone.to_string(), "prod.us-east-1");
        assert_eq!("prod.us-east-1".parse::<ZoneId>().unwrap(), zone);
    }

    #[test]
    fn zone_id_rejects_unknown_environment() {
        assert!("qa.us-east-1".parse::<ZoneId>().is_err());
    }

    #[test]
    fn application_id_serializes_as_string() {
        let id: ApplicationId = "acme.shop".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"acme.shop\"");
        let parsed: ApplicationId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
