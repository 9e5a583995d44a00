//! `PostgreSQL` implementation of the `ReplicaRepository` trait.
//!
//! Every upsert is keyed by the spreadsheet record id, so replaying a sweep
//! rewrites rows in place and keeps their relational ids stable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use coachsync_core::error::DomainError;
use coachsync_core::replica::{
    CatalogKind, CatalogRow, HabitUsageRow, MethodUsageRow, OvertuigingUsageRow,
    PersonalGoalRow, PersonalGoalUsageRow, ProgramRow, ProgramScheduleRow, TranslationRow,
    UserRow,
};
use coachsync_core::repository::ReplicaRepository;

use crate::schema::infrastructure;

#[derive(Debug, sqlx::FromRow)]
struct UserRecord {
    id: String,
    email: String,
    name: String,
    role: Option<String>,
    language_code: Option<String>,
    password_hash: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<UserRecord> for UserRow {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            name: record.name,
            role: record.role,
            language_code: record.language_code,
            password_hash: record.password_hash,
            deleted_at: record.deleted_at,
        }
    }
}

/// PostgreSQL-backed replica of the spreadsheet business tables.
#[derive(Debug, Clone)]
pub struct PgReplicaRepository {
    pool: PgPool,
}

impl PgReplicaRepository {
    /// Creates a new `PgReplicaRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReplicaRepository for PgReplicaRepository {
    async fn upsert_catalog(
        &self,
        kind: CatalogKind,
        row: &CatalogRow,
    ) -> Result<Uuid, DomainError> {
        // Table names come from a closed enum, never from input.
        let sql = format!(
            r"
            INSERT INTO {table} (airtable_id, name, description, sort_order, linked_ids)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (airtable_id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                sort_order = EXCLUDED.sort_order,
                linked_ids = EXCLUDED.linked_ids
            RETURNING id
            ",
            table = kind.table()
        );
        sqlx::query_scalar(&sql)
            .bind(&row.airtable_id)
            .bind(&row.name)
            .bind(&row.description)
            .bind(row.sort_order)
            .bind(&row.linked_ids)
            .fetch_one(&self.pool)
            .await
            .map_err(infrastructure)
    }

    async fn upsert_translation(&self, row: &TranslationRow) -> Result<(), DomainError> {
        sqlx::query(
            r"
            INSERT INTO translations (airtable_id, key, language_code, value)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (airtable_id) DO UPDATE
            SET key = EXCLUDED.key,
                language_code = EXCLUDED.language_code,
                value = EXCLUDED.value
            ",
        )
        .bind(&row.airtable_id)
        .bind(&row.key)
        .bind(&row.language_code)
        .bind(&row.value)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(())
    }

    async fn upsert_user(&self, row: &UserRow) -> Result<(), DomainError> {
        sqlx::query(
            r"
            INSERT INTO users (id, email, name, role, language_code, password_hash, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                name = EXCLUDED.name,
                role = EXCLUDED.role,
                language_code = EXCLUDED.language_code,
                password_hash = EXCLUDED.password_hash,
                deleted_at = EXCLUDED.deleted_at
            ",
        )
        .bind(&row.id)
        .bind(&row.email)
        .bind(&row.name)
        .bind(&row.role)
        .bind(&row.language_code)
        .bind(&row.password_hash)
        .bind(row.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(())
    }

    async fn soft_delete_user(&self, id: &str, at: DateTime<Utc>) -> Result<bool, DomainError> {
        let result = sqlx::query("UPDATE users SET deleted_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserRow>, DomainError> {
        let record: Option<UserRecord> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(record.map(UserRow::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>, DomainError> {
        let record: Option<UserRecord> = sqlx::query_as(
            r"
            SELECT * FROM users
            WHERE LOWER(email) = LOWER($1) AND deleted_at IS NULL
            ORDER BY id
            LIMIT 1
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(record.map(UserRow::from))
    }

    async fn upsert_personal_goal(
        &self,
        row: &PersonalGoalRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        sqlx::query_scalar(
            r"
            INSERT INTO personal_goals (id, airtable_id, user_id, name, active, created_at)
            VALUES (COALESCE($6, gen_random_uuid()), $1, $2, $3, $4, $5)
            ON CONFLICT (airtable_id) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                name = EXCLUDED.name,
                active = EXCLUDED.active,
                created_at = EXCLUDED.created_at
            RETURNING id
            ",
        )
        .bind(&row.airtable_id)
        .bind(&row.user_id)
        .bind(&row.name)
        .bind(row.active)
        .bind(row.created_at)
        .bind(known_id)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)
    }

    async fn upsert_program(
        &self,
        row: &ProgramRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        sqlx::query_scalar(
            r"
            INSERT INTO programs (
                id, airtable_id, user_id, goal_ids, day_ids, start_date,
                duration, motivation, created_at
            )
            VALUES (COALESCE($9, gen_random_uuid()), $1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (airtable_id) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                goal_ids = EXCLUDED.goal_ids,
                day_ids = EXCLUDED.day_ids,
                start_date = EXCLUDED.start_date,
                duration = EXCLUDED.duration,
                motivation = EXCLUDED.motivation,
                created_at = EXCLUDED.created_at
            RETURNING id
            ",
        )
        .bind(&row.airtable_id)
        .bind(&row.user_id)
        .bind(&row.goal_ids)
        .bind(&row.day_ids)
        .bind(row.start_date)
        .bind(&row.duration)
        .bind(&row.motivation)
        .bind(row.created_at)
        .bind(known_id)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)
    }

    async fn upsert_program_schedule(
        &self,
        row: &ProgramScheduleRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        sqlx::query_scalar(
            r"
            INSERT INTO program_schedule (id, airtable_id, program_id, day_id, date, method_ids)
            VALUES (COALESCE($6, gen_random_uuid()), $1, $2, $3, $4, $5)
            ON CONFLICT (airtable_id) DO UPDATE
            SET program_id = EXCLUDED.program_id,
                day_id = EXCLUDED.day_id,
                date = EXCLUDED.date,
                method_ids = EXCLUDED.method_ids
            RETURNING id
            ",
        )
        .bind(&row.airtable_id)
        .bind(row.program_id)
        .bind(&row.day_id)
        .bind(row.date)
        .bind(&row.method_ids)
        .bind(known_id)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)
    }

    async fn upsert_method_usage(
        &self,
        row: &MethodUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        sqlx::query_scalar(
            r"
            INSERT INTO method_usage (
                id, airtable_id, user_id, method_id, program_id, program_schedule_id,
                used_at, remark, created_at
            )
            VALUES (COALESCE($9, gen_random_uuid()), $1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (airtable_id) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                method_id = EXCLUDED.method_id,
                program_id = EXCLUDED.program_id,
                program_schedule_id = EXCLUDED.program_schedule_id,
                used_at = EXCLUDED.used_at,
                remark = EXCLUDED.remark,
                created_at = EXCLUDED.created_at
            RETURNING id
            ",
        )
        .bind(&row.airtable_id)
        .bind(&row.user_id)
        .bind(&row.method_id)
        .bind(row.program_id)
        .bind(row.program_schedule_id)
        .bind(row.used_at)
        .bind(&row.remark)
        .bind(row.created_at)
        .bind(known_id)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)
    }

    async fn upsert_habit_usage(
        &self,
        row: &HabitUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        sqlx::query_scalar(
            r"
            INSERT INTO habit_usage (
                id, airtable_id, user_id, method_id, date, completed, created_at
            )
            VALUES (COALESCE($7, gen_random_uuid()), $1, $2, $3, $4, $5, $6)
            ON CONFLICT (airtable_id) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                method_id = EXCLUDED.method_id,
                date = EXCLUDED.date,
                completed = EXCLUDED.completed,
                created_at = EXCLUDED.created_at
            RETURNING id
            ",
        )
        .bind(&row.airtable_id)
        .bind(&row.user_id)
        .bind(&row.method_id)
        .bind(row.date)
        .bind(row.completed)
        .bind(row.created_at)
        .bind(known_id)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)
    }

    async fn upsert_personal_goal_usage(
        &self,
        row: &PersonalGoalUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        sqlx::query_scalar(
            r"
            INSERT INTO personal_goal_usage (
                id, airtable_id, user_id, personal_goal_id, date, created_at
            )
            VALUES (COALESCE($6, gen_random_uuid()), $1, $2, $3, $4, $5)
            ON CONFLICT (airtable_id) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                personal_goal_id = EXCLUDED.personal_goal_id,
                date = EXCLUDED.date,
                created_at = EXCLUDED.created_at
            RETURNING id
            ",
        )
        .bind(&row.airtable_id)
        .bind(&row.user_id)
        .bind(row.personal_goal_id)
        .bind(row.date)
        .bind(row.created_at)
        .bind(known_id)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)
    }

    async fn upsert_overtuiging_usage(
        &self,
        row: &OvertuigingUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        sqlx::query_scalar(
            r"
            INSERT INTO belief_usage (
                id, airtable_id, user_id, overtuiging_id, program_id, date, created_at
            )
            VALUES (COALESCE($7, gen_random_uuid()), $1, $2, $3, $4, $5, $6)
            ON CONFLICT (airtable_id) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                overtuiging_id = EXCLUDED.overtuiging_id,
                program_id = EXCLUDED.program_id,
                date = EXCLUDED.date,
                created_at = EXCLUDED.created_at
            RETURNING id
            ",
        )
        .bind(&row.airtable_id)
        .bind(&row.user_id)
        .bind(&row.overtuiging_id)
        .bind(row.program_id)
        .bind(row.date)
        .bind(row.created_at)
        .bind(known_id)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)
    }

    async fn refresh_method_usage_rollup(&self) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r"
            UPDATE program_schedule ps
            SET method_usage_ids = COALESCE(
                (
                    SELECT array_agg(mu.id ORDER BY mu.used_at NULLS FIRST, mu.created_at, mu.id)
                    FROM method_usage mu
                    WHERE mu.program_schedule_id = ps.id
                ),
                '{}'
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        let touched = result.rows_affected();
        debug!(schedules = touched, "Refreshed method usage rollup");
        Ok(touched)
    }
}
