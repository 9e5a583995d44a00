//! Inbound webhooks from the spreadsheet store.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Json, Router, routing::post};
use serde::Serialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Response body for an accepted delivery.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always `true`.
    pub ok: bool,
    /// `true` when the event id had already been applied.
    pub deduplicated: bool,
}

/// POST /users
///
/// The body is taken as raw bytes so the signature is checked against
/// exactly what was sent.
#[instrument(skip_all)]
async fn receive_user_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.user_sync.handle_webhook(&body, signature).await?;

    Ok(Json(WebhookResponse {
        ok: true,
        deduplicated: outcome.deduplicated,
    }))
}

/// Returns the webhook router.
pub fn router() -> Router<AppState> {
    Router::new().route("/users", post(receive_user_event))
}
