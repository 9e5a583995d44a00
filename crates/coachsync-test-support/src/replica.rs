//! In-memory relational replica.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coachsync_core::error::DomainError;
use coachsync_core::replica::{
    CatalogKind, CatalogRow, HabitUsageRow, MethodUsageRow, OvertuigingUsageRow,
    PersonalGoalRow, PersonalGoalUsageRow, ProgramRow, ProgramScheduleRow, TranslationRow,
    UserRow,
};
use coachsync_core::repository::ReplicaRepository;
use uuid::Uuid;

/// Full contents of the replica. Comparable, so tests can assert that a
/// second sweep leaves the store unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaSnapshot {
    /// Catalog rows keyed by kind and spreadsheet id.
    pub catalogs: BTreeMap<(CatalogKind, String), (Uuid, CatalogRow)>,
    /// Translations keyed by spreadsheet id.
    pub translations: BTreeMap<String, TranslationRow>,
    /// Users keyed by id.
    pub users: BTreeMap<String, UserRow>,
    /// Personal goals keyed by spreadsheet id.
    pub personal_goals: BTreeMap<String, (Uuid, PersonalGoalRow)>,
    /// Programs keyed by spreadsheet id.
    pub programs: BTreeMap<String, (Uuid, ProgramRow)>,
    /// Schedule rows keyed by spreadsheet id.
    pub program_schedule: BTreeMap<String, (Uuid, ProgramScheduleRow)>,
    /// `program_schedule.method_usage_ids`, keyed by schedule id.
    pub method_usage_rollup: BTreeMap<Uuid, Vec<Uuid>>,
    /// Method usages keyed by spreadsheet id.
    pub method_usage: BTreeMap<String, (Uuid, MethodUsageRow)>,
    /// Habit usages keyed by spreadsheet id.
    pub habit_usage: BTreeMap<String, (Uuid, HabitUsageRow)>,
    /// Personal goal usages keyed by spreadsheet id.
    pub personal_goal_usage: BTreeMap<String, (Uuid, PersonalGoalUsageRow)>,
    /// Belief usages keyed by spreadsheet id.
    pub overtuiging_usage: BTreeMap<String, (Uuid, OvertuigingUsageRow)>,
}

fn upsert_keyed<R: Clone>(
    table: &mut BTreeMap<String, (Uuid, R)>,
    key: &str,
    row: &R,
    known_id: Option<Uuid>,
) -> Uuid {
    let id = table
        .get(key)
        .map(|(id, _)| *id)
        .or(known_id)
        .unwrap_or_else(Uuid::new_v4);
    table.insert(key.to_owned(), (id, row.clone()));
    id
}

/// Replica fake backed by [`ReplicaSnapshot`].
#[derive(Debug, Default)]
pub struct InMemoryReplica {
    state: Mutex<ReplicaSnapshot>,
    user_writes_fail: AtomicBool,
    next_user_write_fails: Mutex<Option<Duration>>,
}

impl InMemoryReplica {
    /// Creates an empty replica.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn snapshot(&self) -> ReplicaSnapshot {
        self.state.lock().unwrap().clone()
    }

    /// Makes every later user upsert or soft delete fail.
    pub fn fail_user_writes(&self) {
        self.user_writes_fail.store(true, Ordering::SeqCst);
    }

    /// Makes only the next user upsert or soft delete fail, after `delay`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next_user_write(&self, delay: Duration) {
        *self.next_user_write_fails.lock().unwrap() = Some(delay);
    }

    async fn check_user_write(&self) -> Result<(), DomainError> {
        let one_shot = self.next_user_write_fails.lock().unwrap().take();
        if let Some(delay) = one_shot {
            tokio::time::sleep(delay).await;
            return Err(DomainError::Infrastructure("users table unavailable".into()));
        }
        if self.user_writes_fail.load(Ordering::SeqCst) {
            return Err(DomainError::Infrastructure("users table unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplicaRepository for InMemoryReplica {
    async fn upsert_catalog(
        &self,
        kind: CatalogKind,
        row: &CatalogRow,
    ) -> Result<Uuid, DomainError> {
        let mut state = self.state.lock().unwrap();
        let key = (kind, row.airtable_id.clone());
        let id = state
            .catalogs
            .get(&key)
            .map_or_else(Uuid::new_v4, |(id, _)| *id);
        state.catalogs.insert(key, (id, row.clone()));
        Ok(id)
    }

    async fn upsert_translation(&self, row: &TranslationRow) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        state.translations.insert(row.airtable_id.clone(), row.clone());
        Ok(())
    }

    async fn upsert_user(&self, row: &UserRow) -> Result<(), DomainError> {
        self.check_user_write().await?;
        let mut state = self.state.lock().unwrap();
        state.users.insert(row.id.clone(), row.clone());
        Ok(())
    }

    async fn soft_delete_user(&self, id: &str, at: DateTime<Utc>) -> Result<bool, DomainError> {
        self.check_user_write().await?;
        let mut state = self.state.lock().unwrap();
        match state.users.get_mut(id) {
            Some(user) => {
                user.deleted_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserRow>, DomainError> {
        Ok(self.state.lock().unwrap().users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>, DomainError> {
        let wanted = email.to_lowercase();
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .values()
            .find(|u| u.deleted_at.is_none() && u.email.to_lowercase() == wanted)
            .cloned())
    }

    async fn upsert_personal_goal(
        &self,
        row: &PersonalGoalRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        let mut state = self.state.lock().unwrap();
        Ok(upsert_keyed(&mut state.personal_goals, &row.airtable_id, row, known_id))
    }

    async fn upsert_program(
        &self,
        row: &ProgramRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        let mut state = self.state.lock().unwrap();
        Ok(upsert_keyed(&mut state.programs, &row.airtable_id, row, known_id))
    }

    async fn upsert_program_schedule(
        &self,
        row: &ProgramScheduleRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        let mut state = self.state.lock().unwrap();
        let id = upsert_keyed(&mut state.program_schedule, &row.airtable_id, row, known_id);
        state.method_usage_rollup.entry(id).or_default();
        Ok(id)
    }

    async fn upsert_method_usage(
        &self,
        row: &MethodUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        let mut state = self.state.lock().unwrap();
        Ok(upsert_keyed(&mut state.method_usage, &row.airtable_id, row, known_id))
    }

    async fn upsert_habit_usage(
        &self,
        row: &HabitUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        let mut state = self.state.lock().unwrap();
        Ok(upsert_keyed(&mut state.habit_usage, &row.airtable_id, row, known_id))
    }

    async fn upsert_personal_goal_usage(
        &self,
        row: &PersonalGoalUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        let mut state = self.state.lock().unwrap();
        Ok(upsert_keyed(&mut state.personal_goal_usage, &row.airtable_id, row, known_id))
    }

    async fn upsert_overtuiging_usage(
        &self,
        row: &OvertuigingUsageRow,
        known_id: Option<Uuid>,
    ) -> Result<Uuid, DomainError> {
        let mut state = self.state.lock().unwrap();
        Ok(upsert_keyed(&mut state.overtuiging_usage, &row.airtable_id, row, known_id))
    }

    async fn refresh_method_usage_rollup(&self) -> Result<u64, DomainError> {
        let mut state = self.state.lock().unwrap();
        let mut usages: Vec<_> = state
            .method_usage
            .values()
            .filter_map(|(id, row)| {
                row.program_schedule_id
                    .map(|s| (s, row.used_at, row.created_at, *id))
            })
            .collect();
        usages.sort();

        let schedule_ids: Vec<Uuid> = state.program_schedule.values().map(|(id, _)| *id).collect();
        for schedule_id in &schedule_ids {
            let ids = usages
                .iter()
                .filter(|(s, ..)| s == schedule_id)
                .map(|(.., id)| *id)
                .collect();
            state.method_usage_rollup.insert(*schedule_id, ids);
        }
        Ok(u64::try_from(schedule_ids.len()).unwrap_or(u64::MAX))
    }
}
