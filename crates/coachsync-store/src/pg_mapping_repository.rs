//! `PostgreSQL` implementation of the `MappingRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use coachsync_core::entity::EntityType;
use coachsync_core::error::DomainError;
use coachsync_core::mapping::IdentifierMapping;
use coachsync_core::repository::MappingRepository;

use crate::schema::infrastructure;

#[derive(Debug, sqlx::FromRow)]
struct MappingRow {
    entity_type: String,
    postgres_id: String,
    external_record_id: String,
    last_applied_sequence: Option<i64>,
    last_synced_at: DateTime<Utc>,
}

impl TryFrom<MappingRow> for IdentifierMapping {
    type Error = DomainError;

    fn try_from(row: MappingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            entity_type: row.entity_type.parse()?,
            postgres_id: row.postgres_id,
            external_record_id: row.external_record_id,
            last_applied_sequence: row.last_applied_sequence,
            last_synced_at: row.last_synced_at,
        })
    }
}

/// PostgreSQL-backed identifier mappings.
#[derive(Debug, Clone)]
pub struct PgMappingRepository {
    pool: PgPool,
}

impl PgMappingRepository {
    /// Creates a new `PgMappingRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingRepository for PgMappingRepository {
    async fn find_mapping(
        &self,
        entity_type: EntityType,
        postgres_id: &str,
    ) -> Result<Option<IdentifierMapping>, DomainError> {
        let row: Option<MappingRow> = sqlx::query_as(
            r"
            SELECT entity_type, postgres_id, external_record_id,
                   last_applied_sequence, last_synced_at
            FROM identifier_mappings
            WHERE entity_type = $1 AND postgres_id = $2
            ",
        )
        .bind(entity_type.as_str())
        .bind(postgres_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;
        row.map(IdentifierMapping::try_from).transpose()
    }

    async fn find_postgres_id(
        &self,
        entity_type: EntityType,
        external_record_id: &str,
    ) -> Result<Option<String>, DomainError> {
        sqlx::query_scalar(
            r"
            SELECT postgres_id FROM identifier_mappings
            WHERE entity_type = $1 AND external_record_id = $2
            ",
        )
        .bind(entity_type.as_str())
        .bind(external_record_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)
    }

    async fn upsert_mapping(
        &self,
        entity_type: EntityType,
        postgres_id: &str,
        external_record_id: &str,
        applied_sequence: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r"
            INSERT INTO identifier_mappings (
                entity_type, postgres_id, external_record_id,
                last_applied_sequence, last_synced_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (entity_type, postgres_id) DO UPDATE
            SET external_record_id = EXCLUDED.external_record_id,
                last_applied_sequence = GREATEST(
                    identifier_mappings.last_applied_sequence,
                    EXCLUDED.last_applied_sequence
                ),
                last_synced_at = EXCLUDED.last_synced_at
            ",
        )
        .bind(entity_type.as_str())
        .bind(postgres_id)
        .bind(external_record_id)
        .bind(applied_sequence)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(())
    }
}
