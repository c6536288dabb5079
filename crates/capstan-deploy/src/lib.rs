//! # capstan-deploy
//!
//! The deployment trigger of the Capstan hosted-application platform.
//!
//! For every managed application, the trigger decides which
//! continuous-delivery jobs (component build, system test, staging test,
//! production deployments in successively wider zones) should be dispatched
//! next, drives the external build service to execute them, reconciles the
//! effects of completed jobs, and keeps each application's declared
//! [`Change`](capstan_core::Change) in sync with what has actually been
//! scheduled and deployed.
//!
//! ## Core concepts
//!
//! - **Change**: the declared `{platform?, application?}` migration of an
//!   application; empty means no migration in progress
//! - **Job**: a candidate the planner considers ready to run, carrying the
//!   concrete [`Versions`](versions::Versions) it would target
//! - **Deployment jobs**: the per-application, per-job-type history of
//!   triggerings and completions the planner decides from
//!
//! ## Shape of the loop
//!
//! Completion reports flow into [`DeploymentTrigger::notify_of_completion`]
//! and advance application state. A periodic tick calls
//! [`DeploymentTrigger::trigger_ready_jobs`], which plans every application
//! (a pure, lock-free computation per snapshot) and dispatches the eligible
//! jobs: production jobs per application in pipeline order, test jobs through
//! a global capacity-constrained lane. Operators start and stop migrations
//! through [`DeploymentTrigger::trigger_change`] and friends. All mutation of
//! one application is serialized by its lock in the application store.
//!
//! [`DeploymentTrigger::notify_of_completion`]: trigger::DeploymentTrigger::notify_of_completion
//! [`DeploymentTrigger::trigger_ready_jobs`]: trigger::DeploymentTrigger::trigger_ready_jobs
//! [`DeploymentTrigger::trigger_change`]: trigger::DeploymentTrigger::trigger_change

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod application;
pub mod build;
pub mod calculus;
pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod planner;
pub mod retry;
pub mod steps;
pub mod store;
pub mod ticker;
pub mod trigger;
pub mod versions;

mod reconciler;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::application::{Application, Deployment};
    pub use crate::build::{BuildJob, BuildJobState, BuildService, BuildServiceError};
    pub use crate::config::{SystemName, TriggerConfig};
    pub use crate::error::{Error, Result};
    pub use crate::jobs::{DeploymentJobs, JobError, JobReport, JobStatus, JobType};
    pub use crate::planner::{Job, ReadyJobsPlanner};
    pub use crate::store::{ApplicationStore, LockedApplication};
    pub use crate::ticker::TriggerTicker;
    pub use crate::trigger::DeploymentTrigger;
    pub use crate::versions::Versions;
}
