//! Inbound deduplication markers.

use chrono::{DateTime, Utc};

/// Source of webhook deliveries for user identity changes.
pub const SOURCE_USER_WEBHOOK: &str = "user_webhook";

/// Source of read-through fetches during authentication.
pub const SOURCE_READ_THROUGH: &str = "airtable_read_through";

/// An inbound event that has already been applied.
///
/// `event_id` is unique per `source`; recording a duplicate is the signal to
/// skip reprocessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEvent {
    /// Externally supplied identifier.
    pub event_id: String,
    /// Delivery channel.
    pub source: String,
    /// When the event was first received.
    pub received_at: DateTime<Utc>,
}
