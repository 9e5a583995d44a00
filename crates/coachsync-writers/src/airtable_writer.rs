//! Outbox writer for the spreadsheet store.

use std::sync::Arc;

use async_trait::async_trait;
use coachsync_core::clock::Clock;
use coachsync_core::entity::EntityType;
use coachsync_core::error::{ExternalStoreError, WriteError};
use coachsync_core::external::{ExternalStore, is_external_record_id};
use coachsync_core::fields::table_for;
use coachsync_core::mapping::IdentifierMapping;
use coachsync_core::outbox::{OutboxEvent, OutboxWriter, SyncEventType, WriteOutcome};
use coachsync_core::payload::SyncPayload;
use coachsync_core::repository::MappingRepository;
use tracing::{debug, warn};

use crate::field_map::build_field_map;
use crate::references::{ResolvedReferences, resolve_references};

/// Applies outbox events to the spreadsheet store, keeping the identifier
/// mapping current.
pub struct AirtableWriter {
    external: Arc<dyn ExternalStore>,
    mappings: Arc<dyn MappingRepository>,
    clock: Arc<dyn Clock>,
}

impl AirtableWriter {
    /// Creates a writer over the given store and mapping repository.
    #[must_use]
    pub fn new(
        external: Arc<dyn ExternalStore>,
        mappings: Arc<dyn MappingRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            external,
            mappings,
            clock,
        }
    }

    async fn find_mapping(
        &self,
        event: &OutboxEvent,
    ) -> Result<Option<IdentifierMapping>, WriteError> {
        self.mappings
            .find_mapping(event.entity_type, &event.entity_id)
            .await
            .map_err(|e| WriteError::from_domain("mapping lookup failed", &e))
    }

    async fn record_mapping(&self, event: &OutboxEvent, external_id: &str) -> Result<(), WriteError> {
        self.mappings
            .upsert_mapping(
                event.entity_type,
                &event.entity_id,
                external_id,
                Some(event.entity_sequence),
                self.clock.now(),
            )
            .await
            .map_err(|e| WriteError::from_domain("mapping upsert failed", &e))
    }

    async fn upsert(&self, event: &OutboxEvent) -> Result<WriteOutcome, WriteError> {
        let payload = SyncPayload::decode(event.entity_type, event.payload.clone())
            .map_err(WriteError::Permanent)?;
        if let SyncPayload::User(_) = payload {
            return self.upsert_user(event, &payload).await;
        }

        let mapping = self.find_mapping(event).await?;
        if let Some(applied_sequence) = stale_against(mapping.as_ref(), event) {
            return Ok(WriteOutcome::SkippedStale { applied_sequence });
        }

        let references = resolve_references(self.mappings.as_ref(), &payload).await?;
        let fields = build_field_map(&payload, &references);
        let table = table_for(event.entity_type);

        match mapping {
            Some(mapping) => {
                let record_id = mapping.external_record_id;
                self.external
                    .update_record(table, &record_id, fields)
                    .await
                    .map_err(|e| match e {
                        // Re-creating would give the entity a second record id.
                        ExternalStoreError::NotFound => WriteError::Permanent(format!(
                            "mapped record {record_id} no longer exists in {table}"
                        )),
                        other => WriteError::from_external("update failed", &other),
                    })?;
                self.record_mapping(event, &record_id).await?;
                Ok(WriteOutcome::Updated {
                    external_id: record_id,
                })
            }
            None => {
                let created = self
                    .external
                    .create_record(table, fields)
                    .await
                    .map_err(|e| WriteError::from_external("create failed", &e))?;
                if let Err(e) = self.record_mapping(event, &created.id).await {
                    warn!(
                        entity_type = %event.entity_type,
                        entity_id = %event.entity_id,
                        record_id = %created.id,
                        "Created record but failed to store its mapping"
                    );
                    return Err(e);
                }
                Ok(WriteOutcome::Created {
                    external_id: created.id,
                })
            }
        }
    }

    /// Users share their id with the spreadsheet record, so there is no
    /// mapping and no create path.
    async fn upsert_user(
        &self,
        event: &OutboxEvent,
        payload: &SyncPayload,
    ) -> Result<WriteOutcome, WriteError> {
        let record_id = user_record_id(event)?;
        let fields = build_field_map(payload, &ResolvedReferences::default());
        self.external
            .update_record(table_for(EntityType::User), record_id, fields)
            .await
            .map_err(|e| match e {
                ExternalStoreError::NotFound => {
                    WriteError::Permanent(format!("user record {record_id} does not exist"))
                }
                other => WriteError::from_external("user update failed", &other),
            })?;
        Ok(WriteOutcome::Updated {
            external_id: record_id.to_owned(),
        })
    }

    async fn delete(&self, event: &OutboxEvent) -> Result<WriteOutcome, WriteError> {
        let table = table_for(event.entity_type);
        if event.entity_type == EntityType::User {
            let record_id = user_record_id(event)?;
            return self.destroy(table, record_id).await;
        }

        let Some(mapping) = self.find_mapping(event).await? else {
            return Ok(WriteOutcome::AlreadyDeleted);
        };
        if let Some(applied_sequence) = stale_against(Some(&mapping), event) {
            return Ok(WriteOutcome::SkippedStale { applied_sequence });
        }
        let outcome = self.destroy(table, &mapping.external_record_id).await?;
        // The mapping outlives the record; only the applied sequence moves.
        self.record_mapping(event, &mapping.external_record_id)
            .await?;
        Ok(outcome)
    }

    async fn destroy(&self, table: &str, record_id: &str) -> Result<WriteOutcome, WriteError> {
        match self.external.delete_record(table, record_id).await {
            Ok(()) => Ok(WriteOutcome::Deleted {
                external_id: record_id.to_owned(),
            }),
            Err(ExternalStoreError::NotFound) => Ok(WriteOutcome::AlreadyDeleted),
            Err(e) => Err(WriteError::from_external("delete failed", &e)),
        }
    }
}

/// The applied sequence if `event` is older than what the mapping has seen.
fn stale_against(mapping: Option<&IdentifierMapping>, event: &OutboxEvent) -> Option<i64> {
    mapping
        .and_then(|m| m.last_applied_sequence)
        .filter(|applied| *applied > event.entity_sequence)
}

fn user_record_id(event: &OutboxEvent) -> Result<&str, WriteError> {
    if is_external_record_id(&event.entity_id) {
        Ok(&event.entity_id)
    } else {
        Err(WriteError::Retryable(format!(
            "user {} has no spreadsheet record id yet",
            event.entity_id
        )))
    }
}

#[async_trait]
impl OutboxWriter for AirtableWriter {
    async fn write_outbox_event(&self, event: &OutboxEvent) -> Result<WriteOutcome, WriteError> {
        let outcome = match event.event_type {
            SyncEventType::Upsert => self.upsert(event).await?,
            SyncEventType::Delete => self.delete(event).await?,
        };
        debug!(
            event_id = event.id,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            outcome = outcome.label(),
            "Applied outbox event to spreadsheet store"
        );
        Ok(outcome)
    }
}
