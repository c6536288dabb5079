//! Error types for the deployment trigger.

use capstan_core::{ApplicationId, Change};

use crate::build::BuildServiceError;
use crate::jobs::JobType;

/// The result type used throughout `capstan-deploy`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in deployment-trigger operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A change was requested while a healthy change is already in progress.
    #[error("could not start {requested} on {application}: {in_progress} is already in progress")]
    ChangeConflict {
        /// The application the change was requested for.
        application: ApplicationId,
        /// The change already in progress.
        in_progress: Change,
        /// The change that was requested.
        requested: Change,
    },

    /// An operation referenced an application the store does not know.
    #[error("unknown application {application}")]
    UnknownApplication {
        /// The application that was looked up.
        application: ApplicationId,
    },

    /// An operation required a build-service project the application does not have.
    #[error("application {application} is not registered with the build service")]
    NotRegistered {
        /// The application without a project id.
        application: ApplicationId,
    },

    /// A completion report arrived for a job that was never triggered.
    ///
    /// This indicates corrupted state and fails fast.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },

    /// The build service failed to accept a dispatch.
    #[error("build service error: {0}")]
    BuildService(#[from] BuildServiceError),

    /// The application store failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The trigger was misconfigured.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// A core value failed to construct or parse.
    #[error("core error: {0}")]
    Core(#[from] capstan_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an invariant violation for a completion without a triggering.
    #[must_use]
    pub fn completion_without_triggering(application: &ApplicationId, job_type: &JobType) -> Self {
        Self::InvariantViolation {
            message: format!(
                "received completion for {job_type} on {application}, which was never triggered"
            ),
        }
    }
}
