//! Error taxonomy for the synchronization engine.

use thiserror::Error;

/// Error returned by repositories and other local ports.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Input failed validation before it reached a store.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

/// Failure reported by the spreadsheet store adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExternalStoreError {
    /// The call did not complete within its deadline.
    #[error("request timed out")]
    Timeout,

    /// The store asked us to slow down (HTTP 429).
    #[error("rate limited by spreadsheet store")]
    RateLimited,

    /// The store answered with a server-side error.
    #[error("spreadsheet store unavailable (status {status})")]
    Unavailable {
        /// HTTP status code.
        status: u16,
    },

    /// Connection-level failure before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The addressed record or table does not exist.
    #[error("record not found")]
    NotFound,

    /// The store refused the record as structurally invalid.
    #[error("rejected by spreadsheet store (status {status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error detail returned by the store.
        message: String,
    },

    /// Credentials were refused.
    #[error("unauthorized (status {status})")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ExternalStoreError {
    /// Whether a later attempt of the same call can reasonably succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::Unavailable { .. } | Self::Transport(_)
        )
    }
}

/// Failure of a single outbound write, classified for the dispatch loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// Expected to succeed on a later attempt (missing dependency mapping,
    /// timeout, rate limit).
    #[error("retryable: {0}")]
    Retryable(String),

    /// Will never succeed without a payload or configuration change.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl WriteError {
    /// Classifies an adapter error as retryable or permanent.
    #[must_use]
    pub fn from_external(context: &str, err: &ExternalStoreError) -> Self {
        let message = format!("{context}: {err}");
        if err.is_retryable() {
            Self::Retryable(message)
        } else {
            Self::Permanent(message)
        }
    }

    /// Wraps a local repository failure; these are treated as transient.
    #[must_use]
    pub fn from_domain(context: &str, err: &DomainError) -> Self {
        match err {
            DomainError::Validation(_) => Self::Permanent(format!("{context}: {err}")),
            DomainError::NotFound(_) | DomainError::Infrastructure(_) => {
                Self::Retryable(format!("{context}: {err}"))
            }
        }
    }

    /// Returns the error message without the classification prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(message) | Self::Permanent(message) => message,
        }
    }
}
