//! Integration tests for `PgOutboxRepository` and `PgDeadLetterRepository`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use coachsync_core::entity::EntityType;
use coachsync_core::error::DomainError;
use coachsync_core::outbox::{NewOutboxEvent, OutboxStatus, SyncEventType};
use coachsync_core::payload::{PersonalGoalPayload, SyncPayload};
use coachsync_core::repository::{DeadLetterRepository, OutboxRepository};
use coachsync_store::{PgDeadLetterRepository, PgOutboxRepository, enqueue_in_transaction};
use sqlx::PgPool;

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap() + Duration::seconds(seconds)
}

fn goal_event(entity_id: &str, priority: i32) -> NewOutboxEvent {
    let payload = SyncPayload::PersonalGoal(PersonalGoalPayload {
        user_id: Some("recUSER0000000001".to_string()),
        name: Some("Run a marathon".to_string()),
        active: Some(true),
    });
    NewOutboxEvent::upsert(entity_id, &payload, priority)
}

// --- enqueue ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_enqueue_assigns_increasing_entity_sequence(pool: PgPool) {
    let repo = PgOutboxRepository::new(pool);

    let first = repo.enqueue(goal_event("goal-1", 100), at(0)).await.unwrap();
    let second = repo.enqueue(goal_event("goal-1", 100), at(1)).await.unwrap();
    let other = repo.enqueue(goal_event("goal-2", 100), at(2)).await.unwrap();

    assert_eq!(first.entity_sequence, 1);
    assert_eq!(second.entity_sequence, 2);
    assert_eq!(other.entity_sequence, 1);
    assert_eq!(first.status, OutboxStatus::Pending);
    assert_eq!(first.attempt_count, 0);
    assert_eq!(first.next_attempt_at, at(0));
    assert_eq!(first.entity_type, EntityType::PersonalGoal);
    assert_eq!(first.payload["name"], "Run a marathon");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_enqueues_for_one_entity_get_distinct_sequences(pool: PgPool) {
    let repo = PgOutboxRepository::new(pool);

    let mut tasks = tokio::task::JoinSet::new();
    for n in 0..20 {
        let repo = repo.clone();
        tasks.spawn(async move { repo.enqueue(goal_event("goal-1", 100), at(n)).await });
    }
    let mut sequences = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        sequences.push(joined.unwrap().unwrap().entity_sequence);
    }

    sequences.sort_unstable();
    assert_eq!(sequences, (1..=20).collect::<Vec<i64>>());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_sequence_keeps_counting_after_replay(pool: PgPool) {
    let outbox = PgOutboxRepository::new(pool.clone());
    let dead_letters = PgDeadLetterRepository::new(pool);
    let original = outbox.enqueue(goal_event("goal-1", 100), at(0)).await.unwrap();
    outbox.claim_next(at(1)).await.unwrap().unwrap();
    let entry = outbox.dead_letter(original.id, 9, "boom", at(2)).await.unwrap();
    dead_letters.replay(entry.id, at(3)).await.unwrap().unwrap();

    let next = outbox.enqueue(goal_event("goal-1", 100), at(4)).await.unwrap();

    assert_eq!(next.entity_sequence, original.entity_sequence + 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_enqueue_in_transaction_rolls_back_with_business_write(pool: PgPool) {
    let repo = PgOutboxRepository::new(pool.clone());

    let mut tx = pool.begin().await.unwrap();
    let event = enqueue_in_transaction(&mut tx, &goal_event("goal-1", 100), at(0))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert!(repo.find(event.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_enqueue_in_transaction_commits_with_business_write(pool: PgPool) {
    let repo = PgOutboxRepository::new(pool.clone());

    let mut tx = pool.begin().await.unwrap();
    let event = enqueue_in_transaction(&mut tx, &goal_event("goal-1", 100), at(0))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let stored = repo.find(event.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutboxStatus::Pending);
}

// --- claim_next ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_claim_next_orders_by_priority_then_age(pool: PgPool) {
    let repo = PgOutboxRepository::new(pool);
    let low = repo.enqueue(goal_event("goal-low", 200), at(0)).await.unwrap();
    let urgent_new = repo.enqueue(goal_event("goal-b", 10), at(2)).await.unwrap();
    let urgent_old = repo.enqueue(goal_event("goal-a", 10), at(1)).await.unwrap();

    let first = repo.claim_next(at(5)).await.unwrap().unwrap();
    let second = repo.claim_next(at(5)).await.unwrap().unwrap();
    let third = repo.claim_next(at(5)).await.unwrap().unwrap();
    let none = repo.claim_next(at(5)).await.unwrap();

    assert_eq!(first.id, urgent_old.id);
    assert_eq!(second.id, urgent_new.id);
    assert_eq!(third.id, low.id);
    assert!(none.is_none());
    assert_eq!(first.status, OutboxStatus::InFlight);
    assert_eq!(first.claimed_at, Some(at(5)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_claim_next_skips_events_not_yet_due(pool: PgPool) {
    let repo = PgOutboxRepository::new(pool);
    repo.enqueue(goal_event("goal-1", 100), at(10)).await.unwrap();

    let claimed = repo.claim_next(at(5)).await.unwrap();

    assert!(claimed.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_claims_never_return_the_same_event(pool: PgPool) {
    let repo = PgOutboxRepository::new(pool);
    for n in 0..4 {
        repo.enqueue(goal_event(&format!("goal-{n}"), 100), at(n))
            .await
            .unwrap();
    }

    let (a, b, c, d) = tokio::join!(
        repo.claim_next(at(10)),
        repo.claim_next(at(10)),
        repo.claim_next(at(10)),
        repo.claim_next(at(10)),
    );

    let mut ids: Vec<i64> = [a, b, c, d]
        .into_iter()
        .filter_map(|claim| claim.unwrap().map(|event| event.id))
        .collect();
    let claimed = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), claimed);
}

// --- mark_done / mark_retryable ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_mark_done_requires_in_flight_claim(pool: PgPool) {
    let repo = PgOutboxRepository::new(pool);
    let event = repo.enqueue(goal_event("goal-1", 100), at(0)).await.unwrap();

    let result = repo.mark_done(event.id, at(1)).await;

    assert!(matches!(result, Err(DomainError::Validation(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_done_event_is_immutable(pool: PgPool) {
    let repo = PgOutboxRepository::new(pool);
    let event = repo.enqueue(goal_event("goal-1", 100), at(0)).await.unwrap();
    repo.claim_next(at(1)).await.unwrap().unwrap();
    repo.mark_done(event.id, at(2)).await.unwrap();

    let again = repo.mark_done(event.id, at(3)).await;
    let stored = repo.find(event.id).await.unwrap().unwrap();

    assert!(again.is_err());
    assert_eq!(stored.status, OutboxStatus::Done);
    assert_eq!(stored.claimed_at, None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_mark_retryable_schedules_next_attempt(pool: PgPool) {
    let repo = PgOutboxRepository::new(pool);
    let event = repo.enqueue(goal_event("goal-1", 100), at(0)).await.unwrap();
    repo.claim_next(at(1)).await.unwrap().unwrap();

    repo.mark_retryable(event.id, 1, at(60), "timeout", at(2))
        .await
        .unwrap();

    let stored = repo.find(event.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutboxStatus::FailedRetryable);
    assert_eq!(stored.attempt_count, 1);
    assert_eq!(stored.next_attempt_at, at(60));
    assert_eq!(stored.last_error.as_deref(), Some("timeout"));
    assert!(repo.claim_next(at(30)).await.unwrap().is_none());
    assert_eq!(repo.claim_next(at(60)).await.unwrap().unwrap().id, event.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_release_stale_claims_returns_abandoned_events_to_pending(pool: PgPool) {
    let repo = PgOutboxRepository::new(pool);
    let stale = repo.enqueue(goal_event("goal-1", 100), at(0)).await.unwrap();
    let fresh = repo.enqueue(goal_event("goal-2", 100), at(1)).await.unwrap();
    repo.claim_next(at(10)).await.unwrap().unwrap();
    repo.claim_next(at(500)).await.unwrap().unwrap();

    let released = repo.release_stale_claims(at(300), at(600)).await.unwrap();

    assert_eq!(released, 1);
    let stale = repo.find(stale.id).await.unwrap().unwrap();
    let fresh = repo.find(fresh.id).await.unwrap().unwrap();
    assert_eq!(stale.status, OutboxStatus::Pending);
    assert_eq!(fresh.status, OutboxStatus::InFlight);
}

// --- dead letters ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_dead_letter_copies_event_atomically(pool: PgPool) {
    let outbox = PgOutboxRepository::new(pool.clone());
    let dead_letters = PgDeadLetterRepository::new(pool);
    let event = outbox.enqueue(goal_event("goal-1", 50), at(0)).await.unwrap();
    outbox.claim_next(at(1)).await.unwrap().unwrap();

    let entry = outbox
        .dead_letter(event.id, 9, "422 unknown field", at(2))
        .await
        .unwrap();

    let stored = OutboxRepository::find(&outbox, event.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutboxStatus::DeadLettered);
    assert_eq!(stored.attempt_count, 9);
    assert_eq!(entry.outbox_event_id, event.id);
    assert_eq!(entry.attempt_count, 9);
    assert_eq!(entry.last_error, "422 unknown field");
    assert_eq!(entry.payload, event.payload);
    assert_eq!(entry.priority, 50);

    let listed = dead_letters.list(10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, entry.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_replay_reenqueues_fresh_event_and_removes_entry(pool: PgPool) {
    let outbox = PgOutboxRepository::new(pool.clone());
    let dead_letters = PgDeadLetterRepository::new(pool);
    let original = outbox.enqueue(goal_event("goal-1", 50), at(0)).await.unwrap();
    outbox.claim_next(at(1)).await.unwrap().unwrap();
    let entry = outbox.dead_letter(original.id, 9, "boom", at(2)).await.unwrap();

    let replayed = dead_letters.replay(entry.id, at(3)).await.unwrap().unwrap();

    assert_ne!(replayed.id, original.id);
    assert_eq!(replayed.status, OutboxStatus::Pending);
    assert_eq!(replayed.attempt_count, 0);
    assert_eq!(replayed.event_type, SyncEventType::Upsert);
    assert_eq!(replayed.entity_id, "goal-1");
    assert_eq!(replayed.entity_sequence, original.entity_sequence);
    assert_eq!(replayed.payload, original.payload);
    assert!(DeadLetterRepository::find(&dead_letters, entry.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_replay_of_unknown_entry_returns_none(pool: PgPool) {
    let dead_letters = PgDeadLetterRepository::new(pool);

    let replayed = dead_letters.replay(999, at(0)).await.unwrap();

    assert!(replayed.is_none());
}
