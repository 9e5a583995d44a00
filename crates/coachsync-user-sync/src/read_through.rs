//! Read-through fetches on an authentication cache miss.

use coachsync_core::external::{ExternalRecord, is_external_record_id};
use coachsync_core::fields::user;
use coachsync_core::inbox::SOURCE_READ_THROUGH;
use coachsync_core::replica::UserRow;
use tracing::{debug, info};

use crate::{UserSync, UserSyncError};

/// Builds the case-insensitive e-mail filter for the `Users` table.
#[must_use]
pub fn email_formula(email: &str) -> String {
    let mut literal = String::with_capacity(email.len());
    for c in email.trim().to_lowercase().chars() {
        if matches!(c, '\\' | '\'') {
            literal.push('\\');
        }
        literal.push(c);
    }
    format!("LOWER({{{}}}) = '{literal}'", user::EMAIL)
}

/// Inbox event id of a fetched record. Changes whenever the record does, so
/// an unchanged record is only applied once.
fn read_through_event_id(record: &ExternalRecord) -> String {
    let version = record
        .timestamp(user::LAST_MODIFIED)
        .unwrap_or(record.created_time);
    format!("{}-{}", version.timestamp_millis(), record.id)
}

impl UserSync {
    /// Fetches a user by e-mail straight from the spreadsheet store and
    /// upserts it. Returns `None` when the store has no such user.
    ///
    /// # Errors
    ///
    /// Returns `UserSyncError::External` if the store cannot be queried and
    /// `UserSyncError::Store` if the inbox or users table fails.
    pub async fn read_through_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserRow>, UserSyncError> {
        if email.trim().is_empty() {
            return Ok(None);
        }
        let records = self
            .external
            .list_records(user::TABLE, Some(&email_formula(email)))
            .await?;
        match records.into_iter().next() {
            Some(record) => self.ingest(&record).await,
            None => {
                debug!("Read-through found no user for e-mail");
                Ok(None)
            }
        }
    }

    /// Fetches a user by record id and upserts it. Ids that are not record
    /// ids return `None` without a call.
    ///
    /// # Errors
    ///
    /// Returns `UserSyncError::External` if the store cannot be queried and
    /// `UserSyncError::Store` if the inbox or users table fails.
    pub async fn read_through_by_id(&self, id: &str) -> Result<Option<UserRow>, UserSyncError> {
        if !is_external_record_id(id) {
            return Ok(None);
        }
        match self.external.get_record(user::TABLE, id).await? {
            Some(record) => self.ingest(&record).await,
            None => Ok(None),
        }
    }

    async fn ingest(&self, record: &ExternalRecord) -> Result<Option<UserRow>, UserSyncError> {
        let Some(row) = UserRow::from_record(record) else {
            debug!(user_id = %record.id, "Read-through record has no e-mail, ignored");
            return Ok(None);
        };
        let event_id = read_through_event_id(record);
        let _delivery = self
            .deliveries
            .lock(format!("{SOURCE_READ_THROUGH}:{event_id}"))
            .await;

        let fresh = self
            .inbox
            .record(SOURCE_READ_THROUGH, &event_id, self.clock.now())
            .await?;
        if !fresh {
            debug!(event_id = %event_id, deduplicated = true, "Read-through already applied");
            let stored = self.replica.find_user_by_id(&row.id).await?;
            return Ok(Some(stored.unwrap_or(row)));
        }

        if let Err(err) = self.replica.upsert_user(&row).await {
            self.forget(SOURCE_READ_THROUGH, &event_id).await;
            return Err(err.into());
        }
        info!(event_id = %event_id, user_id = %row.id, "Read-through user applied");
        Ok(Some(row))
    }
}
