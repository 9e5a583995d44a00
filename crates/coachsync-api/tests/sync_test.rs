//! Integration tests for the operator endpoints.

mod common;

use axum::http::StatusCode;
use coachsync_core::outbox::{NewOutboxEvent, OutboxStatus};
use coachsync_core::payload::{PersonalGoalPayload, SyncPayload};
use coachsync_core::repository::OutboxRepository;
use coachsync_store::PgOutboxRepository;
use coachsync_test_support::fixed_now;
use sqlx::PgPool;

async fn park_event(pool: &PgPool) -> i64 {
    let outbox = PgOutboxRepository::new(pool.clone());
    let payload = SyncPayload::PersonalGoal(PersonalGoalPayload {
        name: Some("Walk daily".into()),
        ..PersonalGoalPayload::default()
    });
    let event = outbox
        .enqueue(NewOutboxEvent::upsert("goal-1", &payload, 50), fixed_now())
        .await
        .unwrap();
    outbox.claim_next(fixed_now()).await.unwrap().unwrap();
    outbox
        .dead_letter(event.id, 9, "retries exhausted: rate limited", fixed_now())
        .await
        .unwrap()
        .id
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_then_replay_dead_letter(pool: PgPool) {
    let dead_letter_id = park_event(&pool).await;

    // GET /api/v1/sync/dead-letters
    let app = common::build_test_app(pool.clone());
    let (status, json) = common::get_json(app, "/api/v1/sync/dead-letters").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["dead_letters"][0]["id"], dead_letter_id);
    assert_eq!(json["dead_letters"][0]["entity_id"], "goal-1");

    // POST /api/v1/sync/dead-letters/{id}/replay
    let app = common::build_test_app(pool.clone());
    let (status, json) = common::post_raw(
        app,
        &format!("/api/v1/sync/dead-letters/{dead_letter_id}/replay"),
        &[common::admin_header()],
        Vec::new(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["replayed"], true);

    // The replayed event is claimable again with a clean attempt count.
    let replayed = PgOutboxRepository::new(pool.clone())
        .claim_next(fixed_now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replayed.entity_id, "goal-1");
    assert_eq!(replayed.attempt_count, 0);
    assert_eq!(replayed.status, OutboxStatus::InFlight);

    // A second replay of the same entry is a 404.
    let app = common::build_test_app(pool);
    let (status, _) = common::post_raw(
        app,
        &format!("/api/v1/sync/dead-letters/{dead_letter_id}/replay"),
        &[common::admin_header()],
        Vec::new(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_operator_endpoints_reject_wrong_token(pool: PgPool) {
    let app = common::build_test_app(pool);

    let (status, json) = common::post_raw(
        app,
        "/api/v1/sync/full",
        &[("authorization", "Bearer nope".to_owned())],
        Vec::new(),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "forbidden");
}
