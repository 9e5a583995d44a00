//! Enqueue entry point used by relational-store mutations.

use coachsync_core::clock::Clock;
use coachsync_core::config::EntityBackends;
use coachsync_core::entity::EntityType;
use coachsync_core::error::DomainError;
use coachsync_core::outbox::{NewOutboxEvent, OutboxEvent, SyncEventType};
use coachsync_core::payload::SyncPayload;
use coachsync_core::repository::OutboxRepository;
use tracing::debug;

/// Records a pending replication task for a change that just committed.
///
/// Returns `Ok(None)` without touching the queue when the entity type's
/// primary store is the spreadsheet store, since the write already landed
/// there. Callers that can share a transaction with the business write
/// should use the store's transactional enqueue instead; either way an
/// error here must fail the surrounding operation.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the entity type is never replicated
/// outbound or an upsert payload does not match its entity type, and
/// `DomainError::Infrastructure` if the insert fails.
pub async fn enqueue_sync_event(
    event: NewOutboxEvent,
    backends: &EntityBackends,
    clock: &dyn Clock,
    repo: &dyn OutboxRepository,
) -> Result<Option<OutboxEvent>, DomainError> {
    if !EntityType::OUTBOUND.contains(&event.entity_type) {
        return Err(DomainError::Validation(format!(
            "{} is not replicated to the spreadsheet store",
            event.entity_type
        )));
    }
    if !backends.is_postgres_primary(event.entity_type) {
        debug!(
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            "Spreadsheet store is primary, skipping enqueue"
        );
        return Ok(None);
    }
    if event.event_type == SyncEventType::Upsert {
        SyncPayload::decode(event.entity_type, event.payload.clone())
            .map_err(DomainError::Validation)?;
    }

    let stored = repo.enqueue(event, clock.now()).await?;
    debug!(
        event_id = stored.id,
        entity_type = %stored.entity_type,
        entity_id = %stored.entity_id,
        entity_sequence = stored.entity_sequence,
        "Enqueued outbox event"
    );
    Ok(Some(stored))
}

#[cfg(test)]
mod tests {
    use coachsync_core::outbox::OutboxStatus;
    use coachsync_core::payload::ProgramPayload;
    use coachsync_test_support::{FailingSyncStore, FixedClock, InMemorySyncStore, fixed_now};
    use serde_json::json;

    use super::*;

    fn program_upsert(entity_id: &str) -> NewOutboxEvent {
        let payload = SyncPayload::Program(ProgramPayload {
            user_id: Some("recUSER0000000001".into()),
            motivation: Some("Sleep better".into()),
            ..ProgramPayload::default()
        });
        NewOutboxEvent::upsert(entity_id, &payload, 100)
    }

    #[tokio::test]
    async fn test_enqueue_stores_pending_event_due_now() {
        // Arrange
        let clock = FixedClock(fixed_now());
        let repo = InMemorySyncStore::new();

        // Act
        let stored = enqueue_sync_event(
            program_upsert("p-1"),
            &EntityBackends::default(),
            &clock,
            &repo,
        )
        .await
        .unwrap()
        .unwrap();

        // Assert
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.attempt_count, 0);
        assert_eq!(stored.next_attempt_at, fixed_now());
        assert_eq!(stored.entity_sequence, 1);
        assert_eq!(repo.outbox_events().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_skips_entity_types_primary_in_spreadsheet_store() {
        // Arrange
        let clock = FixedClock(fixed_now());
        let repo = InMemorySyncStore::new();
        let backends = EntityBackends::postgres_primary([EntityType::User]);

        // Act
        let stored = enqueue_sync_event(program_upsert("p-1"), &backends, &clock, &repo)
            .await
            .unwrap();

        // Assert
        assert!(stored.is_none());
        assert!(repo.outbox_events().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_catalog_entity_types() {
        // Arrange
        let clock = FixedClock(fixed_now());
        let repo = InMemorySyncStore::new();
        let event = NewOutboxEvent::delete(EntityType::Method, "m-1", 100);

        // Act
        let result = enqueue_sync_event(event, &EntityBackends::default(), &clock, &repo).await;

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_payload_of_wrong_shape() {
        // Arrange
        let clock = FixedClock(fixed_now());
        let repo = InMemorySyncStore::new();
        let event = NewOutboxEvent {
            event_type: SyncEventType::Upsert,
            entity_type: EntityType::Program,
            entity_id: "p-1".into(),
            payload: json!({"programName": "typo"}),
            priority: 100,
        };

        // Act
        let result = enqueue_sync_event(event, &EntityBackends::default(), &clock, &repo).await;

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(repo.outbox_events().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_propagates_store_failure() {
        // Arrange
        let clock = FixedClock(fixed_now());

        // Act
        let result = enqueue_sync_event(
            program_upsert("p-1"),
            &EntityBackends::default(),
            &clock,
            &FailingSyncStore,
        )
        .await;

        // Assert
        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }
}
