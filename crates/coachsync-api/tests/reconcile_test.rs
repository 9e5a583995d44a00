//! Integration tests for the outbox and the sweep sharing one database.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use coachsync_core::clock::Clock;
use coachsync_core::outbox::{NewOutboxEvent, OutboxWriter, WriteOutcome};
use coachsync_core::payload::{PersonalGoalPayload, SyncPayload};
use coachsync_core::repository::OutboxRepository;
use coachsync_store::{PgMappingRepository, PgOutboxRepository};
use coachsync_test_support::{FixedClock, InMemoryExternalStore, fixed_now};
use coachsync_writers::AirtableWriter;
use sqlx::PgPool;
use tokio::task::JoinSet;
use uuid::Uuid;

type GoalRow = (Uuid, String, String, bool);
type MappingRow = (String, String, String, Option<i64>);

async fn goal_rows(pool: &PgPool) -> Vec<GoalRow> {
    sqlx::query_as("SELECT id, airtable_id, name, active FROM personal_goals ORDER BY airtable_id")
        .fetch_all(pool)
        .await
        .unwrap()
}

async fn mapping_rows(pool: &PgPool) -> Vec<MappingRow> {
    sqlx::query_as(
        "SELECT entity_type, postgres_id, external_record_id, last_applied_sequence \
         FROM identifier_mappings ORDER BY entity_type, postgres_id",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

/// Pushes one personal goal through the outbox writer and returns the
/// spreadsheet record id it was created under.
async fn create_goal_through_outbox(
    pool: &PgPool,
    external: Arc<InMemoryExternalStore>,
    goal_id: Uuid,
) -> String {
    let outbox = PgOutboxRepository::new(pool.clone());
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
    let writer = AirtableWriter::new(
        external,
        Arc::new(PgMappingRepository::new(pool.clone())),
        clock,
    );
    let payload = SyncPayload::PersonalGoal(PersonalGoalPayload {
        name: Some("Walk daily".into()),
        active: Some(true),
        ..PersonalGoalPayload::default()
    });
    outbox
        .enqueue(NewOutboxEvent::upsert(goal_id.to_string(), &payload, 50), fixed_now())
        .await
        .unwrap();
    let event = outbox.claim_next(fixed_now()).await.unwrap().unwrap();

    let outcome = writer.write_outbox_event(&event).await.unwrap();
    outbox.mark_done(event.id, fixed_now()).await.unwrap();

    match outcome {
        WriteOutcome::Created { external_id } => external_id,
        other => panic!("expected a create, got {other:?}"),
    }
}

async fn full_sync(pool: &PgPool, external: Arc<InMemoryExternalStore>) {
    let app = common::build_test_app_with_external(pool.clone(), external);
    let (status, json) =
        common::post_raw(app, "/api/v1/sync/full", &[common::admin_header()], Vec::new()).await;
    assert_eq!(status, StatusCode::OK, "{json}");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_outbox_created_goal_keeps_its_id_through_full_syncs(pool: PgPool) {
    // Arrange
    let external = Arc::new(InMemoryExternalStore::new());
    let goal_id = Uuid::new_v4();
    let record_id = create_goal_through_outbox(&pool, external.clone(), goal_id).await;
    let mappings_before = mapping_rows(&pool).await;

    // Act
    full_sync(&pool, external.clone()).await;

    // Assert
    let goals = goal_rows(&pool).await;
    assert_eq!(
        goals,
        vec![(goal_id, record_id.clone(), "Walk daily".to_owned(), true)]
    );
    assert_eq!(mapping_rows(&pool).await, mappings_before);
    assert_eq!(
        mappings_before,
        vec![(
            "personal_goal".to_owned(),
            goal_id.to_string(),
            record_id,
            Some(1)
        )]
    );

    // A second pass converges on the same rows.
    full_sync(&pool, external).await;
    assert_eq!(goal_rows(&pool).await, goals);
    assert_eq!(mapping_rows(&pool).await, mappings_before);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_enqueues_for_one_goal_get_distinct_sequences(pool: PgPool) {
    // Arrange
    let outbox = Arc::new(PgOutboxRepository::new(pool));
    let goal_id = Uuid::new_v4().to_string();
    let payload = SyncPayload::PersonalGoal(PersonalGoalPayload {
        name: Some("Walk daily".into()),
        ..PersonalGoalPayload::default()
    });

    // Act
    let mut tasks = JoinSet::new();
    for _ in 0..20 {
        let outbox = outbox.clone();
        let event = NewOutboxEvent::upsert(goal_id.clone(), &payload, 50);
        tasks.spawn(async move { outbox.enqueue(event, fixed_now()).await });
    }
    let mut sequences = Vec::new();
    while let Some(result) = tasks.join_next().await {
        sequences.push(result.unwrap().unwrap().entity_sequence);
    }

    // Assert
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=20).collect::<Vec<i64>>());
}
