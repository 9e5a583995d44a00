//! In-memory sync-state repositories (outbox, dead letters, mappings, inbox).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coachsync_core::entity::EntityType;
use coachsync_core::error::DomainError;
use coachsync_core::mapping::IdentifierMapping;
use coachsync_core::outbox::{DeadLetterEntry, NewOutboxEvent, OutboxEvent, OutboxStatus};
use coachsync_core::repository::{
    DeadLetterRepository, InboxRepository, MappingRepository, OutboxRepository,
};

#[derive(Debug, Default)]
struct SyncState {
    outbox: BTreeMap<i64, OutboxEvent>,
    dead_letters: BTreeMap<i64, DeadLetterEntry>,
    mappings: HashMap<(EntityType, String), IdentifierMapping>,
    inbox: BTreeSet<(String, String)>,
    next_outbox_id: i64,
    next_dead_letter_id: i64,
}

impl SyncState {
    fn insert_event(
        &mut self,
        event: NewOutboxEvent,
        entity_sequence: i64,
        now: DateTime<Utc>,
    ) -> OutboxEvent {
        self.next_outbox_id += 1;
        let stored = OutboxEvent {
            id: self.next_outbox_id,
            event_type: event.event_type,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            entity_sequence,
            payload: event.payload,
            priority: event.priority,
            attempt_count: 0,
            next_attempt_at: now,
            status: OutboxStatus::Pending,
            last_error: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.outbox.insert(stored.id, stored.clone());
        stored
    }

    fn in_flight_mut(&mut self, id: i64) -> Result<&mut OutboxEvent, DomainError> {
        match self.outbox.get_mut(&id) {
            Some(event) if event.status == OutboxStatus::InFlight => Ok(event),
            Some(event) => Err(DomainError::Validation(format!(
                "outbox event {id} is {}, not in_flight",
                event.status
            ))),
            None => Err(DomainError::NotFound(format!("outbox event {id}"))),
        }
    }
}

/// A single in-memory store implementing every sync-state repository, with
/// the same semantics as the `PostgreSQL` implementations.
#[derive(Debug, Default)]
pub struct InMemorySyncStore {
    state: Mutex<SyncState>,
}

impl InMemorySyncStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every outbox event, ordered by id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.state.lock().unwrap().outbox.values().cloned().collect()
    }

    /// Snapshot of every dead-letter entry, ordered by id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn dead_letter_entries(&self) -> Vec<DeadLetterEntry> {
        self.state
            .lock()
            .unwrap()
            .dead_letters
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of every mapping, sorted by entity type and relational id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn mappings(&self) -> Vec<IdentifierMapping> {
        let mut mappings: Vec<_> = self.state.lock().unwrap().mappings.values().cloned().collect();
        mappings.sort_by(|a, b| {
            (a.entity_type, &a.postgres_id).cmp(&(b.entity_type, &b.postgres_id))
        });
        mappings
    }

    /// Overrides the status and schedule of an outbox event.
    ///
    /// # Panics
    ///
    /// Panics if the event does not exist or the mutex is poisoned.
    pub fn force_status(
        &self,
        id: i64,
        status: OutboxStatus,
        claimed_at: Option<DateTime<Utc>>,
    ) {
        let mut state = self.state.lock().unwrap();
        let event = state.outbox.get_mut(&id).unwrap();
        event.status = status;
        event.claimed_at = claimed_at;
    }
}

#[async_trait]
impl OutboxRepository for InMemorySyncStore {
    async fn enqueue(
        &self,
        event: NewOutboxEvent,
        now: DateTime<Utc>,
    ) -> Result<OutboxEvent, DomainError> {
        let mut state = self.state.lock().unwrap();
        let entity_sequence = state
            .outbox
            .values()
            .filter(|e| e.entity_type == event.entity_type && e.entity_id == event.entity_id)
            .map(|e| e.entity_sequence)
            .max()
            .unwrap_or(0)
            + 1;
        Ok(state.insert_event(event, entity_sequence, now))
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<OutboxEvent>, DomainError> {
        let mut state = self.state.lock().unwrap();
        let next_id = state
            .outbox
            .values()
            .filter(|e| {
                matches!(
                    e.status,
                    OutboxStatus::Pending | OutboxStatus::FailedRetryable
                ) && e.next_attempt_at <= now
            })
            .min_by_key(|e| (e.priority, e.created_at, e.id))
            .map(|e| e.id);
        let Some(id) = next_id else {
            return Ok(None);
        };
        let event = state.outbox.get_mut(&id).unwrap();
        event.status = OutboxStatus::InFlight;
        event.claimed_at = Some(now);
        event.updated_at = now;
        Ok(Some(event.clone()))
    }

    async fn mark_done(&self, id: i64, now: DateTime<Utc>) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let event = state.in_flight_mut(id)?;
        event.status = OutboxStatus::Done;
        event.claimed_at = None;
        event.updated_at = now;
        Ok(())
    }

    async fn mark_retryable(
        &self,
        id: i64,
        attempt_count: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let event = state.in_flight_mut(id)?;
        event.status = OutboxStatus::FailedRetryable;
        event.attempt_count = event.attempt_count.max(attempt_count);
        event.next_attempt_at = next_attempt_at;
        event.last_error = Some(error.to_owned());
        event.claimed_at = None;
        event.updated_at = now;
        Ok(())
    }

    async fn dead_letter(
        &self,
        id: i64,
        attempt_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<DeadLetterEntry, DomainError> {
        let mut state = self.state.lock().unwrap();
        let event = state.in_flight_mut(id)?;
        event.status = OutboxStatus::DeadLettered;
        event.attempt_count = event.attempt_count.max(attempt_count);
        event.last_error = Some(error.to_owned());
        event.claimed_at = None;
        event.updated_at = now;
        let event = event.clone();

        state.next_dead_letter_id += 1;
        let entry = DeadLetterEntry {
            id: state.next_dead_letter_id,
            outbox_event_id: event.id,
            event_type: event.event_type,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            entity_sequence: event.entity_sequence,
            payload: event.payload,
            priority: event.priority,
            attempt_count: event.attempt_count,
            last_error: error.to_owned(),
            dead_lettered_at: now,
        };
        state.dead_letters.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn release_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let mut state = self.state.lock().unwrap();
        let mut released = 0;
        for event in state.outbox.values_mut() {
            if event.status == OutboxStatus::InFlight
                && event.claimed_at.is_some_and(|at| at < claimed_before)
            {
                event.status = OutboxStatus::Pending;
                event.claimed_at = None;
                event.updated_at = now;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn find(&self, id: i64) -> Result<Option<OutboxEvent>, DomainError> {
        Ok(self.state.lock().unwrap().outbox.get(&id).cloned())
    }
}

#[async_trait]
impl DeadLetterRepository for InMemorySyncStore {
    async fn find(&self, id: i64) -> Result<Option<DeadLetterEntry>, DomainError> {
        Ok(self.state.lock().unwrap().dead_letters.get(&id).cloned())
    }

    async fn list(&self, limit: i64) -> Result<Vec<DeadLetterEntry>, DomainError> {
        let state = self.state.lock().unwrap();
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state.dead_letters.values().rev().take(limit).cloned().collect())
    }

    async fn replay(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<OutboxEvent>, DomainError> {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.dead_letters.remove(&id) else {
            return Ok(None);
        };
        let event = NewOutboxEvent {
            event_type: entry.event_type,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            payload: entry.payload,
            priority: entry.priority,
        };
        Ok(Some(state.insert_event(event, entry.entity_sequence, now)))
    }
}

#[async_trait]
impl MappingRepository for InMemorySyncStore {
    async fn find_mapping(
        &self,
        entity_type: EntityType,
        postgres_id: &str,
    ) -> Result<Option<IdentifierMapping>, DomainError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .mappings
            .get(&(entity_type, postgres_id.to_owned()))
            .cloned())
    }

    async fn find_postgres_id(
        &self,
        entity_type: EntityType,
        external_record_id: &str,
    ) -> Result<Option<String>, DomainError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .mappings
            .values()
            .find(|m| m.entity_type == entity_type && m.external_record_id == external_record_id)
            .map(|m| m.postgres_id.clone()))
    }

    async fn upsert_mapping(
        &self,
        entity_type: EntityType,
        postgres_id: &str,
        external_record_id: &str,
        applied_sequence: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let taken = state.mappings.values().any(|m| {
            m.entity_type == entity_type
                && m.external_record_id == external_record_id
                && m.postgres_id != postgres_id
        });
        if taken {
            return Err(DomainError::Infrastructure(
                "duplicate key value violates unique constraint \"idx_identifier_mappings_external\""
                    .into(),
            ));
        }
        let key = (entity_type, postgres_id.to_owned());
        let previous_sequence = state
            .mappings
            .get(&key)
            .and_then(|m| m.last_applied_sequence);
        let last_applied_sequence = match (previous_sequence, applied_sequence) {
            (Some(old), Some(new)) => Some(old.max(new)),
            (old, new) => old.or(new),
        };
        state.mappings.insert(
            key,
            IdentifierMapping {
                entity_type,
                postgres_id: postgres_id.to_owned(),
                external_record_id: external_record_id.to_owned(),
                last_applied_sequence,
                last_synced_at: now,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl InboxRepository for InMemorySyncStore {
    async fn record(
        &self,
        source: &str,
        event_id: &str,
        _received_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.inbox.insert((source.to_owned(), event_id.to_owned())))
    }

    async fn forget(&self, source: &str, event_id: &str) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        state.inbox.remove(&(source.to_owned(), event_id.to_owned()));
        Ok(())
    }
}

/// A sync-state store whose every call fails with an infrastructure error.
#[derive(Debug)]
pub struct FailingSyncStore;

#[async_trait]
impl OutboxRepository for FailingSyncStore {
    async fn enqueue(
        &self,
        _event: NewOutboxEvent,
        _now: DateTime<Utc>,
    ) -> Result<OutboxEvent, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn claim_next(&self, _now: DateTime<Utc>) -> Result<Option<OutboxEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn mark_done(&self, _id: i64, _now: DateTime<Utc>) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn mark_retryable(
        &self,
        _id: i64,
        _attempt_count: i32,
        _next_attempt_at: DateTime<Utc>,
        _error: &str,
        _now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn dead_letter(
        &self,
        _id: i64,
        _attempt_count: i32,
        _error: &str,
        _now: DateTime<Utc>,
    ) -> Result<DeadLetterEntry, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn release_stale_claims(
        &self,
        _claimed_before: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn find(&self, _id: i64) -> Result<Option<OutboxEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

#[async_trait]
impl InboxRepository for FailingSyncStore {
    async fn record(
        &self,
        _source: &str,
        _event_id: &str,
        _received_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn forget(&self, _source: &str, _event_id: &str) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

#[async_trait]
impl MappingRepository for FailingSyncStore {
    async fn find_mapping(
        &self,
        _entity_type: EntityType,
        _postgres_id: &str,
    ) -> Result<Option<IdentifierMapping>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn find_postgres_id(
        &self,
        _entity_type: EntityType,
        _external_record_id: &str,
    ) -> Result<Option<String>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn upsert_mapping(
        &self,
        _entity_type: EntityType,
        _postgres_id: &str,
        _external_record_id: &str,
        _applied_sequence: Option<i64>,
        _now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

#[cfg(test)]
mod tests {
    use crate::fixed_now;

    use super::*;

    #[tokio::test]
    async fn test_external_record_id_cannot_map_to_two_relational_ids() {
        // Arrange
        let store = InMemorySyncStore::new();
        store
            .upsert_mapping(EntityType::PersonalGoal, "goal-1", "recPGOAL000000001", Some(1), fixed_now())
            .await
            .unwrap();

        // Act
        let remapped = store
            .upsert_mapping(EntityType::PersonalGoal, "goal-2", "recPGOAL000000001", None, fixed_now())
            .await;
        let refreshed = store
            .upsert_mapping(EntityType::PersonalGoal, "goal-1", "recPGOAL000000001", None, fixed_now())
            .await;

        // Assert
        assert!(matches!(remapped, Err(DomainError::Infrastructure(_))));
        assert!(refreshed.is_ok());
        let mappings = store.mappings();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].last_applied_sequence, Some(1));
    }
}
