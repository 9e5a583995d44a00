//! Outbox events, dead letters, and the writer port the dispatcher drives.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::error::{DomainError, WriteError};
use crate::payload::SyncPayload;

/// Kind of change an outbox event replicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventType {
    /// Create or update the external record.
    Upsert,
    /// Destroy the external record.
    Delete,
}

impl SyncEventType {
    /// Stable database name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for SyncEventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(DomainError::Validation(format!(
                "unknown sync event type: {other}"
            ))),
        }
    }
}

/// Lifecycle state of an outbox event.
///
/// `pending → in_flight → {done | failed_retryable | dead_lettered}`;
/// `failed_retryable` becomes claimable again once `next_attempt_at` passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Waiting for its first attempt.
    Pending,
    /// Claimed by a worker.
    InFlight,
    /// Failed retryably; eligible again after backoff.
    FailedRetryable,
    /// Parked in the dead-letter table.
    DeadLettered,
    /// Delivered. Immutable, kept for audit.
    Done,
}

impl OutboxStatus {
    /// Stable database name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::FailedRetryable => "failed_retryable",
            Self::DeadLettered => "dead_lettered",
            Self::Done => "done",
        }
    }

    /// Whether the event has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::DeadLettered)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "failed_retryable" => Ok(Self::FailedRetryable),
            "dead_lettered" => Ok(Self::DeadLettered),
            "done" => Ok(Self::Done),
            other => Err(DomainError::Validation(format!(
                "unknown outbox status: {other}"
            ))),
        }
    }
}

/// A change to enqueue. Built through [`NewOutboxEvent::upsert`] or
/// [`NewOutboxEvent::delete`] so the payload always matches the entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEvent {
    /// Kind of change.
    pub event_type: SyncEventType,
    /// Entity type.
    pub entity_type: EntityType,
    /// Relational-store identifier.
    pub entity_id: String,
    /// Serialized payload body (empty object for deletes).
    pub payload: serde_json::Value,
    /// Lower is more urgent.
    pub priority: i32,
}

impl NewOutboxEvent {
    /// An upsert of `entity_id` carrying `payload`.
    #[must_use]
    pub fn upsert(entity_id: impl Into<String>, payload: &SyncPayload, priority: i32) -> Self {
        Self {
            event_type: SyncEventType::Upsert,
            entity_type: payload.entity_type(),
            entity_id: entity_id.into(),
            payload: payload.to_value(),
            priority,
        }
    }

    /// A delete of `entity_id`.
    #[must_use]
    pub fn delete(entity_type: EntityType, entity_id: impl Into<String>, priority: i32) -> Self {
        Self {
            event_type: SyncEventType::Delete,
            entity_type,
            entity_id: entity_id.into(),
            payload: serde_json::Value::Object(serde_json::Map::new()),
            priority,
        }
    }
}

/// A durable replication task.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    /// Sequential identifier.
    pub id: i64,
    /// Kind of change.
    pub event_type: SyncEventType,
    /// Entity type.
    pub entity_type: EntityType,
    /// Relational-store identifier.
    pub entity_id: String,
    /// Per-entity sequence assigned at enqueue.
    pub entity_sequence: i64,
    /// Serialized payload body.
    pub payload: serde_json::Value,
    /// Lower is more urgent.
    pub priority: i32,
    /// Number of failed attempts so far. Never decreases.
    pub attempt_count: i32,
    /// Earliest time the event may be claimed.
    pub next_attempt_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: OutboxStatus,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// When the current claim was taken.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

/// A permanently failed outbox event, parked for inspection and replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetterEntry {
    /// Dead-letter identifier used by replay.
    pub id: i64,
    /// The outbox event that failed.
    pub outbox_event_id: i64,
    /// Kind of change.
    pub event_type: SyncEventType,
    /// Entity type.
    pub entity_type: EntityType,
    /// Relational-store identifier.
    pub entity_id: String,
    /// Per-entity sequence of the original event.
    pub entity_sequence: i64,
    /// Serialized payload body.
    pub payload: serde_json::Value,
    /// Original priority.
    pub priority: i32,
    /// Attempts made before dead-lettering.
    pub attempt_count: i32,
    /// Failure that caused dead-lettering.
    pub last_error: String,
    /// When the event was dead-lettered.
    pub dead_lettered_at: DateTime<Utc>,
}

/// Successful result of one outbound write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new external record was created.
    Created {
        /// The new record id.
        external_id: String,
    },
    /// An existing external record was updated.
    Updated {
        /// The updated record id.
        external_id: String,
    },
    /// The external record was destroyed.
    Deleted {
        /// The destroyed record id.
        external_id: String,
    },
    /// Nothing to delete; the record or its mapping is already gone.
    AlreadyDeleted,
    /// A newer change for the same entity was already applied.
    SkippedStale {
        /// Sequence already applied for the entity.
        applied_sequence: i64,
    },
}

impl WriteOutcome {
    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
            Self::AlreadyDeleted => "already_deleted",
            Self::SkippedStale { .. } => "skipped_stale",
        }
    }
}

/// Translates one outbox event into a spreadsheet-store write.
#[async_trait]
pub trait OutboxWriter: Send + Sync {
    /// Performs the write. Classifies failures as retryable or permanent
    /// instead of raising.
    async fn write_outbox_event(&self, event: &OutboxEvent) -> Result<WriteOutcome, WriteError>;
}
