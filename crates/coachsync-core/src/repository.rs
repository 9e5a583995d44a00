//! Repository ports owned by the relational store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entity::EntityType;
use crate::error::DomainError;
use crate::mapping::IdentifierMapping;
use crate::outbox::{DeadLetterEntry, NewOutboxEvent, OutboxEvent};
use crate::replica::{
    CatalogKind, CatalogRow, HabitUsageRow, MethodUsageRow, OvertuigingUsageRow,
    PersonalGoalRow, PersonalGoalUsageRow, ProgramRow, ProgramScheduleRow, TranslationRow,
    UserRow,
};

/// Durable queue of pending changes.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Inserts a pending event, assigning the next per-entity sequence.
    async fn enqueue(
        &self,
        event: NewOutboxEvent,
        now: DateTime<Utc>,
    ) -> Result<OutboxEvent, DomainError>;

    /// Atomically claims the most urgent eligible event (lowest priority
    /// value, then oldest) whose `next_attempt_at` has passed, marking it
    /// in flight. Two concurrent callers never receive the same event.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<OutboxEvent>, DomainError>;

    /// Marks a claimed event delivered.
    async fn mark_done(&self, id: i64, now: DateTime<Utc>) -> Result<(), DomainError>;

    /// Records a retryable failure and schedules the next attempt.
    async fn mark_retryable(
        &self,
        id: i64,
        attempt_count: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    /// Marks a claimed event dead-lettered and copies it into the
    /// dead-letter table in one step.
    async fn dead_letter(
        &self,
        id: i64,
        attempt_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<DeadLetterEntry, DomainError>;

    /// Returns in-flight events claimed before `claimed_before` to pending.
    async fn release_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, DomainError>;

    /// Loads one event.
    async fn find(&self, id: i64) -> Result<Option<OutboxEvent>, DomainError>;
}

/// Parking lot for permanently failed events.
#[async_trait]
pub trait DeadLetterRepository: Send + Sync {
    /// Loads one entry.
    async fn find(&self, id: i64) -> Result<Option<DeadLetterEntry>, DomainError>;

    /// Lists entries, newest first.
    async fn list(&self, limit: i64) -> Result<Vec<DeadLetterEntry>, DomainError>;

    /// Removes the entry and enqueues an equivalent fresh pending event with
    /// `attempt_count = 0`, atomically. Returns the new outbox event, or
    /// `None` if no entry has that id.
    async fn replay(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<OutboxEvent>, DomainError>;
}

/// Bidirectional id lookup between both stores.
#[async_trait]
pub trait MappingRepository: Send + Sync {
    /// Full mapping row for a relational id.
    async fn find_mapping(
        &self,
        entity_type: EntityType,
        postgres_id: &str,
    ) -> Result<Option<IdentifierMapping>, DomainError>;

    /// Reverse lookup: relational id for a spreadsheet record id.
    async fn find_postgres_id(
        &self,
        entity_type: EntityType,
        external_record_id: &str,
    ) -> Result<Option<String>, DomainError>;

    /// Creates or refreshes a mapping. `applied_sequence`, when given, only
    /// ever raises the stored value.
    async fn upsert_mapping(
        &self,
        entity_type: EntityType,
        postgres_id: &str,
        external_record_id: &str,
        applied_sequence: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    /// Spreadsheet record id for a relational id.
    async fn find_external_id(
        &self,
        entity_type: EntityType,
        postgres_id: &str,
    ) -> Result<Option<String>, DomainError> {
        Ok(self
            .find_mapping(entity_type, postgres_id)
            .await?
            .map(|mapping| mapping.external_record_id))
    }
}

/// Deduplication set for inbound events.
#[async_trait]
pub trait InboxRepository: Send + Sync {
    /// Insert-or-ignore. Returns `true` when the marker is new and the event
    /// should be processed, `false` for a duplicate.
    async fn record(
        &self,
        source: &str,
        event_id: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool, DomainError>;

    /// Removes a marker so a redelivery is processed again.
    async fn forget(&self, source: &str, event_id: &str) -> Result<(), DomainError>;
}

/// Idempotent writes of spreadsheet data into the relational business tables.
///
/// Each upsert is keyed by the spreadsheet record id and returns the row's
/// relational id. Where an upsert takes `known_id`, a new row is created
/// under that id instead of a generated one; an existing row keeps its id.
#[async_trait]
pub trait ReplicaRepository: Send + Sync {
    /// Upserts one catalog row.
    async fn upsert_catalog(&self, kind: CatalogKind, row: &CatalogRow)
    -> Result<Uuid, DomainError>;

    /// Upserts one translation string.
    async fn upsert_translation(&self, row: &TranslationRow) -> Result<(), DomainError>;

    /// Upserts a user identity row.
    async fn upsert_user(&self, row: &UserRow) -> Result<(), DomainError>;

    /// Marks a user deleted. Returns `false` if the user is unknown.
    async fn soft_delete_user(&self, id: &str, at: DateTime<Utc>) -> Result<bool, DomainError>;

    /// Loads a user by identity id.
    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserRow>, DomainError>;

    /// Loads a live user by e-mail, case-insensitively.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>, DomainError>;

    /// Upserts a personal goal.
    async fn upsert_personal_goal(
        &self,
        row: &PersonalGoalRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError>;

    /// Upserts a program.
    async fn upsert_program(
        &self,
        row: &ProgramRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError>;

    /// Upserts a schedule row.
    async fn upsert_program_schedule(
        &self,
        row: &ProgramScheduleRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError>;

    /// Upserts a method usage.
    async fn upsert_method_usage(
        &self,
        row: &MethodUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError>;

    /// Upserts a habit usage.
    async fn upsert_habit_usage(
        &self,
        row: &HabitUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError>;

    /// Upserts a personal goal usage.
    async fn upsert_personal_goal_usage(
        &self,
        row: &PersonalGoalUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError>;

    /// Upserts a belief usage.
    async fn upsert_overtuiging_usage(
        &self,
        row: &OvertuigingUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError>;

    /// Recomputes `program_schedule.method_usage_ids` from the usage rows,
    /// ordered by usage date then creation order. Returns schedules touched.
    async fn refresh_method_usage_rollup(&self) -> Result<u64, DomainError>;
}
