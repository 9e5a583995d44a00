//! `PostgreSQL` implementation of the `InboxRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use coachsync_core::error::DomainError;
use coachsync_core::repository::InboxRepository;

use crate::schema::infrastructure;

/// PostgreSQL-backed inbox markers.
#[derive(Debug, Clone)]
pub struct PgInboxRepository {
    pool: PgPool,
}

impl PgInboxRepository {
    /// Creates a new `PgInboxRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InboxRepository for PgInboxRepository {
    async fn record(
        &self,
        source: &str,
        event_id: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r"
            INSERT INTO inbox_events (source, event_id, received_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (source, event_id) DO NOTHING
            ",
        )
        .bind(source)
        .bind(event_id)
        .bind(received_at)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(result.rows_affected() == 1)
    }

    async fn forget(&self, source: &str, event_id: &str) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM inbox_events WHERE source = $1 AND event_id = $2")
            .bind(source)
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }
}
