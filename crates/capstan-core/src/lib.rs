//! # capstan-core
//!
//! Core domain types for the Capstan hosted-application platform.
//!
//! This crate holds the pure values shared by every Capstan component:
//!
//! - **Identifiers**: strongly-typed tenant, application, zone, and project ids
//! - **Versions**: platform and application version tokens with total ordering
//! - **Change**: the declared {platform?, application?} migration of an application
//! - **Deployment spec**: the declarative rollout pipeline (tests, delays,
//!   production zones, parallel groups) and its change-block windows
//! - **Clock**: an injectable time source so control loops are testable
//!
//! Everything here is a value: no I/O, no locks, no global state.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod change;
pub mod clock;
pub mod error;
pub mod id;
pub mod observability;
pub mod spec;
pub mod version;

pub use change::Change;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use id::{ApplicationId, ApplicationName, Environment, ProjectId, TenantName, ZoneId};
pub use spec::{ChangeBlocker, DeploymentSpec, SpecStep, TimeWindow};
pub use version::{ApplicationVersion, PlatformVersion, SourceRevision};
