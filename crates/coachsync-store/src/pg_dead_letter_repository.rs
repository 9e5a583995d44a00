//! `PostgreSQL` implementation of the `DeadLetterRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use coachsync_core::error::DomainError;
use coachsync_core::outbox::{DeadLetterEntry, NewOutboxEvent, OutboxEvent};
use coachsync_core::repository::DeadLetterRepository;

use crate::pg_outbox_repository::insert_event;
use crate::schema::infrastructure;

/// Raw `dead_letters` row.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DeadLetterRow {
    id: i64,
    outbox_event_id: i64,
    event_type: String,
    entity_type: String,
    entity_id: String,
    entity_sequence: i64,
    payload: serde_json::Value,
    priority: i32,
    attempt_count: i32,
    last_error: String,
    dead_lettered_at: DateTime<Utc>,
}

impl TryFrom<DeadLetterRow> for DeadLetterEntry {
    type Error = DomainError;

    fn try_from(row: DeadLetterRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            outbox_event_id: row.outbox_event_id,
            event_type: row.event_type.parse()?,
            entity_type: row.entity_type.parse()?,
            entity_id: row.entity_id,
            entity_sequence: row.entity_sequence,
            payload: row.payload,
            priority: row.priority,
            attempt_count: row.attempt_count,
            last_error: row.last_error,
            dead_lettered_at: row.dead_lettered_at,
        })
    }
}

/// PostgreSQL-backed dead-letter table.
#[derive(Debug, Clone)]
pub struct PgDeadLetterRepository {
    pool: PgPool,
}

impl PgDeadLetterRepository {
    /// Creates a new `PgDeadLetterRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterRepository for PgDeadLetterRepository {
    async fn find(&self, id: i64) -> Result<Option<DeadLetterEntry>, DomainError> {
        let row: Option<DeadLetterRow> = sqlx::query_as("SELECT * FROM dead_letters WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
        row.map(DeadLetterEntry::try_from).transpose()
    }

    async fn list(&self, limit: i64) -> Result<Vec<DeadLetterEntry>, DomainError> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(
            "SELECT * FROM dead_letters ORDER BY dead_lettered_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        rows.into_iter().map(DeadLetterEntry::try_from).collect()
    }

    async fn replay(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<OutboxEvent>, DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;

        let row: Option<DeadLetterRow> =
            sqlx::query_as("DELETE FROM dead_letters WHERE id = $1 RETURNING *")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(infrastructure)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let entry = DeadLetterEntry::try_from(row)?;

        // The replayed event keeps its original sequence so it cannot
        // overwrite anything enqueued for the entity after it.
        let event = NewOutboxEvent {
            event_type: entry.event_type,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            payload: entry.payload,
            priority: entry.priority,
        };
        let replayed = insert_event(&mut *tx, &event, Some(entry.entity_sequence), now).await?;

        tx.commit().await.map_err(infrastructure)?;
        Ok(Some(replayed))
    }
}
