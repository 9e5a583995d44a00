//! Operator endpoints: dead-letter inspection and replay, full sweep.
//!
//! Every route requires `Authorization: Bearer <SYNC_ADMIN_TOKEN>`. With no
//! token configured they all answer 403.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::{Json, Router, routing::get, routing::post};
use coachsync_core::error::DomainError;
use coachsync_core::outbox::DeadLetterEntry;
use coachsync_outbox::{list_dead_letters, replay_dead_letter};
use coachsync_reconcile::{SweepReport, SweepStep};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;

/// Query string for GET /dead-letters.
#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    /// Maximum entries returned.
    pub limit: Option<i64>,
}

/// Response body for GET /dead-letters.
#[derive(Debug, Serialize)]
pub struct DeadLetterListResponse {
    /// Entries, newest first.
    pub dead_letters: Vec<DeadLetterEntry>,
}

/// Response body for POST /dead-letters/{id}/replay.
#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    /// The replayed entry, now removed from the dead letters.
    pub dead_letter_id: i64,
    /// Always `true`; an unknown entry is a 404 instead.
    pub replayed: bool,
}

/// Request body for POST /full. Omitted or empty `steps` runs every step.
#[derive(Debug, Default, Deserialize)]
pub struct FullSyncRequest {
    /// Steps to run. They always run in dependency order.
    #[serde(default)]
    pub steps: Vec<SweepStep>,
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiError::Forbidden);
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default();
    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// GET /dead-letters
#[instrument(skip_all)]
async fn dead_letters(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DeadLetterQuery>,
) -> Result<Json<DeadLetterListResponse>, ApiError> {
    authorize(&state, &headers)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let dead_letters = list_dead_letters(limit, state.dead_letters.as_ref()).await?;
    Ok(Json(DeadLetterListResponse { dead_letters }))
}

/// POST /dead-letters/{id}/replay
#[instrument(skip(state, headers))]
async fn replay(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ReplayResponse>, ApiError> {
    authorize(&state, &headers)?;
    let replayed =
        replay_dead_letter(id, state.clock.as_ref(), state.dead_letters.as_ref()).await?;
    if !replayed {
        return Err(DomainError::NotFound(format!("dead letter {id}")).into());
    }
    Ok(Json(ReplayResponse {
        dead_letter_id: id,
        replayed,
    }))
}

/// POST /full
#[instrument(skip_all)]
async fn full_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SweepReport>, ApiError> {
    authorize(&state, &headers)?;
    let request: FullSyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        FullSyncRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| DomainError::Validation(format!("invalid sweep request: {e}")))?
    };

    let report = if request.steps.is_empty() {
        state.sweep.run_all().await?
    } else {
        state.sweep.run(&request.steps).await?
    };
    info!(steps = report.steps.len(), "Operator sweep finished");
    Ok(Json(report))
}

/// Returns the operator router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dead-letters", get(dead_letters))
        .route("/dead-letters/{id}/replay", post(replay))
        .route("/full", post(full_sync))
}
