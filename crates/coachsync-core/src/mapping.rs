//! Identifier mapping between the relational store and the spreadsheet store.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entity::EntityType;

/// The join between both stores for one logical entity.
///
/// Unique per `(entity_type, postgres_id)`. Created on the first successful
/// external write and refreshed, never deleted, afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierMapping {
    /// Entity type.
    pub entity_type: EntityType,
    /// Relational-store identifier.
    pub postgres_id: String,
    /// Spreadsheet-store record identifier.
    pub external_record_id: String,
    /// Sequence of the most recent outbox event applied through this mapping.
    pub last_applied_sequence: Option<i64>,
    /// Last successful sync in either direction.
    pub last_synced_at: DateTime<Utc>,
}
