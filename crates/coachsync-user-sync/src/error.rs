//! Fast-lane failure taxonomy.

use coachsync_core::error::{DomainError, ExternalStoreError};
use thiserror::Error;

use crate::signature::SignatureError;

/// Failure of a webhook delivery or read-through fetch.
#[derive(Debug, Error)]
pub enum UserSyncError {
    /// The webhook was not signed with the shared secret.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The webhook body is not a valid user event.
    #[error("invalid user event: {0}")]
    InvalidPayload(String),

    /// The spreadsheet store could not be read.
    #[error("spreadsheet store error: {0}")]
    External(#[from] ExternalStoreError),

    /// A local store failed.
    #[error(transparent)]
    Store(#[from] DomainError),
}
