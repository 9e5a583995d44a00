//! Operator handlers for parked events.

use coachsync_core::clock::Clock;
use coachsync_core::error::DomainError;
use coachsync_core::outbox::DeadLetterEntry;
use coachsync_core::repository::DeadLetterRepository;
use tracing::info;

/// Upper bound on one listing.
const MAX_LIST_LIMIT: i64 = 500;

/// Re-enqueues a dead-lettered event as a fresh pending event with zero
/// attempts. The entry is removed in the same step.
///
/// Returns `false` when no entry has that id. The dispatch loop never does
/// this on its own.
///
/// # Errors
///
/// Returns `DomainError` if the store fails.
pub async fn replay_dead_letter(
    id: i64,
    clock: &dyn Clock,
    repo: &dyn DeadLetterRepository,
) -> Result<bool, DomainError> {
    let Some(event) = repo.replay(id, clock.now()).await? else {
        info!(dead_letter_id = id, "Replay requested for unknown dead letter");
        return Ok(false);
    };
    info!(
        dead_letter_id = id,
        event_id = event.id,
        entity_type = %event.entity_type,
        entity_id = %event.entity_id,
        "Dead letter replayed"
    );
    Ok(true)
}

/// Lists dead letters, newest first. `limit` is clamped to `1..=500`.
///
/// # Errors
///
/// Returns `DomainError` if the store fails.
pub async fn list_dead_letters(
    limit: i64,
    repo: &dyn DeadLetterRepository,
) -> Result<Vec<DeadLetterEntry>, DomainError> {
    repo.list(limit.clamp(1, MAX_LIST_LIMIT)).await
}

#[cfg(test)]
mod tests {
    use coachsync_core::outbox::{NewOutboxEvent, OutboxStatus};
    use coachsync_core::payload::{HabitUsagePayload, SyncPayload};
    use coachsync_core::repository::OutboxRepository;
    use coachsync_test_support::{FixedClock, InMemorySyncStore, fixed_now};

    use super::*;

    async fn dead_lettered(store: &InMemorySyncStore, entity_id: &str) -> DeadLetterEntry {
        let payload = SyncPayload::HabitUsage(HabitUsagePayload {
            completed: Some(true),
            ..HabitUsagePayload::default()
        });
        let event = store
            .enqueue(NewOutboxEvent::upsert(entity_id, &payload, 100), fixed_now())
            .await
            .unwrap();
        store.claim_next(fixed_now()).await.unwrap().unwrap();
        store.dead_letter(event.id, 9, "boom", fixed_now()).await.unwrap()
    }

    #[tokio::test]
    async fn test_replay_reenqueues_pending_event_with_zero_attempts() {
        // Arrange
        let store = InMemorySyncStore::new();
        let clock = FixedClock(fixed_now());
        let entry = dead_lettered(&store, "habit-1").await;

        // Act
        let replayed = replay_dead_letter(entry.id, &clock, &store).await.unwrap();

        // Assert
        assert!(replayed);
        let events = store.outbox_events();
        let fresh = events.last().unwrap();
        assert_ne!(fresh.id, entry.outbox_event_id);
        assert_eq!(fresh.status, OutboxStatus::Pending);
        assert_eq!(fresh.attempt_count, 0);
        assert_eq!(fresh.entity_id, "habit-1");
        assert_eq!(fresh.entity_sequence, entry.entity_sequence);
        assert!(store.dead_letter_entries().is_empty());
    }

    #[tokio::test]
    async fn test_replay_of_unknown_id_returns_false() {
        // Arrange
        let store = InMemorySyncStore::new();
        let clock = FixedClock(fixed_now());

        // Act
        let replayed = replay_dead_letter(42, &clock, &store).await.unwrap();

        // Assert
        assert!(!replayed);
        assert!(store.outbox_events().is_empty());
    }

    #[tokio::test]
    async fn test_replay_twice_only_reenqueues_once() {
        // Arrange
        let store = InMemorySyncStore::new();
        let clock = FixedClock(fixed_now());
        let entry = dead_lettered(&store, "habit-1").await;

        // Act
        let first = replay_dead_letter(entry.id, &clock, &store).await.unwrap();
        let second = replay_dead_letter(entry.id, &clock, &store).await.unwrap();

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(store.outbox_events().len(), 2);
    }

    #[tokio::test]
    async fn test_list_returns_newest_first_and_clamps_limit() {
        // Arrange
        let store = InMemorySyncStore::new();
        let older = dead_lettered(&store, "habit-1").await;
        let newer = dead_lettered(&store, "habit-2").await;

        // Act
        let clamped_up = list_dead_letters(0, &store).await.unwrap();
        let many = list_dead_letters(10_000, &store).await.unwrap();

        // Assert
        assert_eq!(clamped_up.len(), 1);
        assert_eq!(clamped_up[0].id, newer.id);
        assert_eq!(
            many.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![newer.id, older.id]
        );
    }
}
