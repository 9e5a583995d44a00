//! Foreign-key resolution from relational ids to spreadsheet record ids.

use std::collections::BTreeMap;

use coachsync_core::entity::EntityType;
use coachsync_core::error::WriteError;
use coachsync_core::external::is_external_record_id;
use coachsync_core::payload::SyncPayload;
use coachsync_core::repository::MappingRepository;

/// Spreadsheet record ids per canonical reference field (`userId`,
/// `programId`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedReferences {
    by_field: BTreeMap<&'static str, Vec<String>>,
}

impl ResolvedReferences {
    /// Record ids for a canonical field; `None` if the payload left it unset.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.by_field.get(field).map(Vec::as_slice)
    }

    fn insert(&mut self, field: &'static str, ids: Vec<String>) {
        self.by_field.insert(field, ids);
    }
}

/// Resolves one relational id of `target` to its spreadsheet record id.
///
/// Users share ids across both stores. Everything else goes through the
/// identifier mapping, falling back to ids that already have the
/// spreadsheet store's shape (catalog links are stored that way).
async fn resolve_one(
    mappings: &dyn MappingRepository,
    target: EntityType,
    id: &str,
) -> Result<String, WriteError> {
    if target != EntityType::User {
        let mapped = mappings
            .find_external_id(target, id)
            .await
            .map_err(|e| WriteError::from_domain("mapping lookup failed", &e))?;
        if let Some(external_id) = mapped {
            return Ok(external_id);
        }
    }
    if is_external_record_id(id) {
        return Ok(id.to_owned());
    }
    Err(WriteError::Retryable(format!(
        "{target} {id} is not synced to the spreadsheet store yet"
    )))
}

/// Resolves every foreign key of `payload`.
///
/// # Errors
///
/// Returns `WriteError::Retryable` when a referenced entity has no mapping
/// yet and its id is not already a spreadsheet record id, or when the
/// mapping lookup itself fails.
pub async fn resolve_references(
    mappings: &dyn MappingRepository,
    payload: &SyncPayload,
) -> Result<ResolvedReferences, WriteError> {
    let mut resolved = ResolvedReferences::default();
    for reference in payload.references() {
        let mut ids = Vec::with_capacity(reference.ids.len());
        for id in &reference.ids {
            ids.push(resolve_one(mappings, reference.target, id).await?);
        }
        resolved.insert(reference.field, ids);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use coachsync_core::payload::{MethodUsagePayload, ProgramPayload};
    use coachsync_test_support::{FailingSyncStore, InMemorySyncStore, fixed_now};

    use super::*;

    #[tokio::test]
    async fn test_resolves_mapped_and_native_ids() {
        // Arrange
        let store = InMemorySyncStore::new();
        store
            .upsert_mapping(EntityType::Program, "p-1", "recPROGRAM0000001", None, fixed_now())
            .await
            .unwrap();
        let payload = SyncPayload::MethodUsage(MethodUsagePayload {
            user_id: Some("recUSER0000000001".into()),
            method_id: Some("recMETHOD00000001".into()),
            program_id: Some("p-1".into()),
            ..MethodUsagePayload::default()
        });

        // Act
        let resolved = resolve_references(&store, &payload).await.unwrap();

        // Assert
        assert_eq!(resolved.get("userId"), Some(&["recUSER0000000001".to_owned()][..]));
        assert_eq!(resolved.get("methodId"), Some(&["recMETHOD00000001".to_owned()][..]));
        assert_eq!(resolved.get("programId"), Some(&["recPROGRAM0000001".to_owned()][..]));
        assert_eq!(resolved.get("programScheduleId"), None);
    }

    #[tokio::test]
    async fn test_unmapped_relational_id_is_retryable() {
        // Arrange
        let store = InMemorySyncStore::new();
        let payload = SyncPayload::MethodUsage(MethodUsagePayload {
            program_schedule_id: Some("sched-7".into()),
            ..MethodUsagePayload::default()
        });

        // Act
        let err = resolve_references(&store, &payload).await.unwrap_err();

        // Assert
        assert!(matches!(err, WriteError::Retryable(_)));
        assert!(err.message().contains("program_schedule sched-7"));
    }

    #[tokio::test]
    async fn test_user_reference_must_have_record_id_shape() {
        // Arrange
        let store = InMemorySyncStore::new();
        let payload = SyncPayload::Program(ProgramPayload {
            user_id: Some("42".into()),
            ..ProgramPayload::default()
        });

        // Act
        let err = resolve_references(&store, &payload).await.unwrap_err();

        // Assert
        assert!(matches!(err, WriteError::Retryable(_)));
    }

    #[tokio::test]
    async fn test_mapping_lookup_failure_is_retryable() {
        // Arrange
        let payload = SyncPayload::Program(ProgramPayload {
            goal_ids: Some(vec!["goal-1".into()]),
            ..ProgramPayload::default()
        });

        // Act
        let err = resolve_references(&FailingSyncStore, &payload).await.unwrap_err();

        // Assert
        assert!(matches!(err, WriteError::Retryable(_)));
    }
}
