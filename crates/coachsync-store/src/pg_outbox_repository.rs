//! `PostgreSQL` implementation of the `OutboxRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;
use sqlx::{PgConnection, PgPool};

use coachsync_core::error::DomainError;
use coachsync_core::outbox::{DeadLetterEntry, NewOutboxEvent, OutboxEvent};
use coachsync_core::repository::OutboxRepository;

use crate::pg_dead_letter_repository::DeadLetterRow;
use crate::schema::infrastructure;

/// Raw `outbox_events` row.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OutboxRow {
    id: i64,
    event_type: String,
    entity_type: String,
    entity_id: String,
    entity_sequence: i64,
    payload: serde_json::Value,
    priority: i32,
    attempt_count: i32,
    next_attempt_at: DateTime<Utc>,
    status: String,
    last_error: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OutboxRow> for OutboxEvent {
    type Error = DomainError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            event_type: row.event_type.parse()?,
            entity_type: row.entity_type.parse()?,
            entity_id: row.entity_id,
            entity_sequence: row.entity_sequence,
            payload: row.payload,
            priority: row.priority,
            attempt_count: row.attempt_count,
            next_attempt_at: row.next_attempt_at,
            status: row.status.parse()?,
            last_error: row.last_error,
            claimed_at: row.claimed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Inserts a pending event with an explicit per-entity sequence, or the next
/// one for the entity when `entity_sequence` is `None`.
///
/// New sequences come from the `outbox_entity_sequences` counter row, which
/// the upsert locks until the surrounding transaction ends.
pub(crate) async fn insert_event<'e, E>(
    executor: E,
    event: &NewOutboxEvent,
    entity_sequence: Option<i64>,
    now: DateTime<Utc>,
) -> Result<OutboxEvent, DomainError>
where
    E: PgExecutor<'e>,
{
    let row: OutboxRow = sqlx::query_as(
        r"
        WITH allocated AS (
            INSERT INTO outbox_entity_sequences (entity_type, entity_id, last_sequence)
            SELECT $2, $3, 1
            WHERE $4::BIGINT IS NULL
            ON CONFLICT (entity_type, entity_id) DO UPDATE
            SET last_sequence = outbox_entity_sequences.last_sequence + 1
            RETURNING last_sequence
        )
        INSERT INTO outbox_events (
            event_type, entity_type, entity_id, entity_sequence, payload,
            priority, attempt_count, next_attempt_at, status, created_at, updated_at
        )
        VALUES (
            $1, $2, $3, COALESCE($4, (SELECT last_sequence FROM allocated)), $5,
            $6, 0, $7, 'pending', $7, $7
        )
        RETURNING *
        ",
    )
    .bind(event.event_type.as_str())
    .bind(event.entity_type.as_str())
    .bind(&event.entity_id)
    .bind(entity_sequence)
    .bind(&event.payload)
    .bind(event.priority)
    .bind(now)
    .fetch_one(executor)
    .await
    .map_err(infrastructure)?;
    row.try_into()
}

/// Enqueues `event` on an open connection or transaction, so the outbox row
/// commits or rolls back together with the business write that caused it.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the insert fails. Callers must
/// propagate it and abort the surrounding transaction.
pub async fn enqueue_in_transaction(
    conn: &mut PgConnection,
    event: &NewOutboxEvent,
    now: DateTime<Utc>,
) -> Result<OutboxEvent, DomainError> {
    insert_event(conn, event, None, now).await
}

/// PostgreSQL-backed outbox.
#[derive(Debug, Clone)]
pub struct PgOutboxRepository {
    pool: PgPool,
}

impl PgOutboxRepository {
    /// Creates a new `PgOutboxRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn lost_claim(id: i64) -> DomainError {
        DomainError::Validation(format!("outbox event {id} is not in_flight"))
    }
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    async fn enqueue(
        &self,
        event: NewOutboxEvent,
        now: DateTime<Utc>,
    ) -> Result<OutboxEvent, DomainError> {
        insert_event(&self.pool, &event, None, now).await
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<OutboxEvent>, DomainError> {
        // SKIP LOCKED lets concurrent workers claim different rows instead of
        // queueing behind each other's row locks.
        let row: Option<OutboxRow> = sqlx::query_as(
            r"
            UPDATE outbox_events
            SET status = 'in_flight', claimed_at = $1, updated_at = $1
            WHERE id = (
                SELECT id FROM outbox_events
                WHERE status IN ('pending', 'failed_retryable')
                  AND next_attempt_at <= $1
                ORDER BY priority ASC, created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            ",
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;
        row.map(OutboxEvent::try_from).transpose()
    }

    async fn mark_done(&self, id: i64, now: DateTime<Utc>) -> Result<(), DomainError> {
        let result = sqlx::query(
            r"
            UPDATE outbox_events
            SET status = 'done', claimed_at = NULL, updated_at = $2
            WHERE id = $1 AND status = 'in_flight'
            ",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        if result.rows_affected() == 0 {
            return Err(Self::lost_claim(id));
        }
        Ok(())
    }

    async fn mark_retryable(
        &self,
        id: i64,
        attempt_count: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r"
            UPDATE outbox_events
            SET status = 'failed_retryable',
                attempt_count = GREATEST(attempt_count, $2),
                next_attempt_at = $3,
                last_error = $4,
                claimed_at = NULL,
                updated_at = $5
            WHERE id = $1 AND status = 'in_flight'
            ",
        )
        .bind(id)
        .bind(attempt_count)
        .bind(next_attempt_at)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        if result.rows_affected() == 0 {
            return Err(Self::lost_claim(id));
        }
        Ok(())
    }

    async fn dead_letter(
        &self,
        id: i64,
        attempt_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<DeadLetterEntry, DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;

        let updated = sqlx::query(
            r"
            UPDATE outbox_events
            SET status = 'dead_lettered',
                attempt_count = GREATEST(attempt_count, $2),
                last_error = $3,
                claimed_at = NULL,
                updated_at = $4
            WHERE id = $1 AND status = 'in_flight'
            ",
        )
        .bind(id)
        .bind(attempt_count)
        .bind(error)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(infrastructure)?;
        if updated.rows_affected() == 0 {
            return Err(Self::lost_claim(id));
        }

        let row: DeadLetterRow = sqlx::query_as(
            r"
            INSERT INTO dead_letters (
                outbox_event_id, event_type, entity_type, entity_id, entity_sequence,
                payload, priority, attempt_count, last_error, dead_lettered_at
            )
            SELECT id, event_type, entity_type, entity_id, entity_sequence,
                   payload, priority, attempt_count, $2, $3
            FROM outbox_events
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(infrastructure)?;

        tx.commit().await.map_err(infrastructure)?;
        row.try_into()
    }

    async fn release_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r"
            UPDATE outbox_events
            SET status = 'pending', claimed_at = NULL, updated_at = $2
            WHERE status = 'in_flight' AND claimed_at < $1
            ",
        )
        .bind(claimed_before)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(result.rows_affected())
    }

    async fn find(&self, id: i64) -> Result<Option<OutboxEvent>, DomainError> {
        let row: Option<OutboxRow> = sqlx::query_as("SELECT * FROM outbox_events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
        row.map(OutboxEvent::try_from).transpose()
    }
}
