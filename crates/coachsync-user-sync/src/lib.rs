//! Fast-lane sync of user identity rows, which sign-in reads directly.
//!
//! Two ingestion paths share one idempotent receiver: signed webhook
//! deliveries from the spreadsheet store, and read-through fetches on a
//! cache miss during authentication.

mod error;
mod keyed_lock;
mod read_through;
pub mod signature;
mod webhook;

pub use error::UserSyncError;
pub use read_through::email_formula;
pub use signature::SignatureError;
pub use webhook::{UserEventType, UserWebhookEvent, WebhookOutcome, WebhookUser};

use std::sync::Arc;

use coachsync_core::clock::Clock;
use coachsync_core::external::ExternalStore;
use coachsync_core::repository::{InboxRepository, ReplicaRepository};

use crate::keyed_lock::KeyedLock;

/// Entry point for both ingestion paths.
///
/// Deliveries of one event id are serialized within the process, so a
/// concurrent duplicate waits for the first apply instead of being
/// acknowledged while it may still fail.
pub struct UserSync {
    external: Arc<dyn ExternalStore>,
    inbox: Arc<dyn InboxRepository>,
    replica: Arc<dyn ReplicaRepository>,
    clock: Arc<dyn Clock>,
    webhook_secret: Vec<u8>,
    deliveries: KeyedLock,
}

impl UserSync {
    /// Creates the service. `webhook_secret` is the shared HMAC key.
    #[must_use]
    pub fn new(
        external: Arc<dyn ExternalStore>,
        inbox: Arc<dyn InboxRepository>,
        replica: Arc<dyn ReplicaRepository>,
        clock: Arc<dyn Clock>,
        webhook_secret: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            external,
            inbox,
            replica,
            clock,
            webhook_secret: webhook_secret.into(),
            deliveries: KeyedLock::default(),
        }
    }
}
