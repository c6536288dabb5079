//! Error types and result aliases for Capstan core values.

/// The result type used throughout `capstan-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing or parsing core values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the identifier invalid.
        message: String,
    },

    /// An invalid version string was provided.
    #[error("invalid version: {message}")]
    InvalidVersion {
        /// Description of what made the version invalid.
        message: String,
    },

    /// An invalid deployment spec was provided.
    #[error("invalid deployment spec: {message}")]
    InvalidSpec {
        /// Description of what made the spec invalid.
        message: String,
    },
}

impl Error {
    /// Creates a new invalid-identifier error.
    #[must_use]
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }

    /// Creates a new invalid-version error.
    #[must_use]
    pub fn invalid_version(message: impl Into<String>) -> Self {
        Self::InvalidVersion {
            message: message.into(),
        }
    }

    /// Creates a new invalid-spec error.
    #[must_use]
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            message: message.into(),
        }
    }
}
