//! Signed user webhooks.

use chrono::{DateTime, Utc};
use coachsync_core::error::DomainError;
use coachsync_core::external::is_external_record_id;
use coachsync_core::inbox::SOURCE_USER_WEBHOOK;
use coachsync_core::replica::UserRow;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::signature::verify_signature;
use crate::{UserSync, UserSyncError};

/// Kind of identity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEventType {
    /// A new user.
    #[serde(rename = "user.created")]
    Created,
    /// Profile or credential change.
    #[serde(rename = "user.updated")]
    Updated,
    /// Removal; applied as a soft delete.
    #[serde(rename = "user.deleted")]
    Deleted,
}

/// User snapshot carried by a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookUser {
    /// Identity id; the user's spreadsheet record id.
    pub id: String,
    /// Login e-mail.
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Authorization role.
    #[serde(default)]
    pub role: Option<String>,
    /// Preferred UI language.
    #[serde(default)]
    pub language_code: Option<String>,
    /// Password hash, passed through unchanged.
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// Webhook body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWebhookEvent {
    /// Sender-assigned id, unique per delivery intent. Redeliveries reuse it.
    pub event_id: String,
    /// What happened.
    pub event_type: UserEventType,
    /// When the change happened at the sender.
    pub occurred_at: DateTime<Utc>,
    /// User state after the change.
    pub user: WebhookUser,
}

impl WebhookUser {
    fn to_row(&self) -> UserRow {
        UserRow {
            id: self.id.clone(),
            email: self.email.trim().to_owned(),
            name: self.name.clone(),
            role: self.role.clone(),
            language_code: self.language_code.clone(),
            password_hash: self.password_hash.clone(),
            deleted_at: None,
        }
    }
}

/// Result of an accepted delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    /// `true` when the event id had already been applied.
    pub deduplicated: bool,
}

impl UserSync {
    /// Verifies, deduplicates, and applies one webhook delivery.
    ///
    /// `body` must be the raw request bytes the signature was computed over.
    ///
    /// # Errors
    ///
    /// Returns `UserSyncError::Signature` for an unsigned or forged request,
    /// `UserSyncError::InvalidPayload` for a body that is not a user event,
    /// and `UserSyncError::Store` when the inbox or the users table fails. A
    /// failed apply leaves no inbox marker, so the sender's retry is
    /// processed. A duplicate arriving while the first delivery is still
    /// applying waits for it; deliveries racing across processes are not
    /// serialized.
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, UserSyncError> {
        verify_signature(&self.webhook_secret, body, signature)?;
        let event: UserWebhookEvent = serde_json::from_slice(body)
            .map_err(|e| UserSyncError::InvalidPayload(e.to_string()))?;
        if event.event_id.trim().is_empty() {
            return Err(UserSyncError::InvalidPayload("eventId is empty".into()));
        }
        if !is_external_record_id(&event.user.id) {
            return Err(UserSyncError::InvalidPayload(format!(
                "user id {} is not a record id",
                event.user.id
            )));
        }

        let _delivery = self
            .deliveries
            .lock(format!("{SOURCE_USER_WEBHOOK}:{}", event.event_id))
            .await;
        let fresh = self
            .inbox
            .record(SOURCE_USER_WEBHOOK, &event.event_id, self.clock.now())
            .await?;
        if !fresh {
            info!(event_id = %event.event_id, deduplicated = true, "Duplicate user webhook");
            return Ok(WebhookOutcome { deduplicated: true });
        }

        if let Err(err) = self.apply(&event).await {
            self.forget(SOURCE_USER_WEBHOOK, &event.event_id).await;
            return Err(err.into());
        }
        info!(
            event_id = %event.event_id,
            user_id = %event.user.id,
            event_type = ?event.event_type,
            deduplicated = false,
            "User webhook applied"
        );
        Ok(WebhookOutcome { deduplicated: false })
    }

    async fn apply(&self, event: &UserWebhookEvent) -> Result<(), DomainError> {
        match event.event_type {
            UserEventType::Created | UserEventType::Updated => {
                self.replica.upsert_user(&event.user.to_row()).await
            }
            UserEventType::Deleted => {
                let known = self
                    .replica
                    .soft_delete_user(&event.user.id, event.occurred_at)
                    .await?;
                if !known {
                    info!(user_id = %event.user.id, "Delete for unknown user ignored");
                }
                Ok(())
            }
        }
    }

    pub(crate) async fn forget(&self, source: &str, event_id: &str) {
        if let Err(err) = self.inbox.forget(source, event_id).await {
            warn!(
                source,
                event_id,
                error = %err,
                "Could not remove inbox marker after failed apply"
            );
        }
    }
}
