//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use coachsync_core::clock::Clock;
use coachsync_reconcile::ReconciliationSweep;
use coachsync_store::{
    PgDeadLetterRepository, PgInboxRepository, PgMappingRepository, PgReplicaRepository,
};
use coachsync_test_support::{FixedClock, InMemoryExternalStore, fixed_now};
use coachsync_user_sync::UserSync;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use coachsync_api::state::AppState;

pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const ADMIN_TOKEN: &str = "integration-admin-token";

/// Build the full app router over the real `PostgreSQL` repositories, a
/// fixed clock, and an in-memory spreadsheet store.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with_external(pool, Arc::new(InMemoryExternalStore::new()))
}

/// Same as [`build_test_app`] with a caller-owned spreadsheet store.
pub fn build_test_app_with_external(pool: PgPool, external: Arc<InMemoryExternalStore>) -> Router {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
    let replica = Arc::new(PgReplicaRepository::new(pool.clone()));
    let user_sync = UserSync::new(
        external.clone(),
        Arc::new(PgInboxRepository::new(pool.clone())),
        replica.clone(),
        clock.clone(),
        WEBHOOK_SECRET,
    );
    let sweep = ReconciliationSweep::new(
        external,
        replica,
        Arc::new(PgMappingRepository::new(pool.clone())),
        clock.clone(),
    );
    let app_state = AppState::new(
        clock,
        Arc::new(PgDeadLetterRepository::new(pool)),
        Arc::new(user_sync),
        Arc::new(sweep),
        Some(ADMIN_TOKEN.to_owned()),
    );

    coachsync_api::app(app_state)
}

/// Send a request and decode the JSON response.
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a POST request with a raw body and extra headers.
pub async fn post_raw(
    app: Router,
    uri: &str,
    headers: &[(&str, String)],
    body: Vec<u8>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    send(app, builder.body(Body::from(body)).unwrap()).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// The operator `Authorization` header.
pub fn admin_header() -> (&'static str, String) {
    ("authorization", format!("Bearer {ADMIN_TOKEN}"))
}
