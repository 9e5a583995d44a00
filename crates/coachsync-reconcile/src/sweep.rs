//! The reconciliation sweep.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use coachsync_core::clock::Clock;
use coachsync_core::entity::EntityType;
use coachsync_core::error::{DomainError, ExternalStoreError};
use coachsync_core::external::{ExternalRecord, ExternalStore};
use coachsync_core::fields::{
    habit_usage, method_usage, overtuiging_usage, personal_goal, personal_goal_usage, program,
    program_schedule, translation, user,
};
use coachsync_core::replica::{CatalogKind, UserRow};
use coachsync_core::repository::{MappingRepository, ReplicaRepository};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::records;

/// One table pulled by the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStep {
    /// Catalog: coaching methods.
    Methods,
    /// Catalog: program goals.
    Goals,
    /// Catalog: weekdays.
    Days,
    /// Catalog: belief categories.
    OvertuigingCategories,
    /// Catalog: belief statements.
    Overtuigingen,
    /// UI translation strings.
    Translations,
    /// User identities.
    Users,
    /// Personal goals.
    PersonalGoals,
    /// Programs.
    Programs,
    /// Program schedule rows. Needs program mappings.
    ProgramSchedule,
    /// Method usages, followed by the schedule rollup. Needs program and
    /// schedule mappings.
    MethodUsage,
    /// Habit usages.
    HabitUsage,
    /// Personal goal usages. Needs personal goal mappings.
    PersonalGoalUsage,
    /// Belief usages. Needs program mappings.
    OvertuigingUsage,
}

impl SweepStep {
    /// Every step, in dependency order.
    pub const ALL: [Self; 14] = [
        Self::Methods,
        Self::Goals,
        Self::Days,
        Self::OvertuigingCategories,
        Self::Overtuigingen,
        Self::Translations,
        Self::Users,
        Self::PersonalGoals,
        Self::Programs,
        Self::ProgramSchedule,
        Self::MethodUsage,
        Self::HabitUsage,
        Self::PersonalGoalUsage,
        Self::OvertuigingUsage,
    ];

    /// Stable name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Methods => "methods",
            Self::Goals => "goals",
            Self::Days => "days",
            Self::OvertuigingCategories => "overtuiging_categories",
            Self::Overtuigingen => "overtuigingen",
            Self::Translations => "translations",
            Self::Users => "users",
            Self::PersonalGoals => "personal_goals",
            Self::Programs => "programs",
            Self::ProgramSchedule => "program_schedule",
            Self::MethodUsage => "method_usage",
            Self::HabitUsage => "habit_usage",
            Self::PersonalGoalUsage => "personal_goal_usage",
            Self::OvertuigingUsage => "overtuiging_usage",
        }
    }

    const fn catalog(self) -> Option<CatalogKind> {
        match self {
            Self::Methods => Some(CatalogKind::Method),
            Self::Goals => Some(CatalogKind::Goal),
            Self::Days => Some(CatalogKind::Day),
            Self::OvertuigingCategories => Some(CatalogKind::OvertuigingCategory),
            Self::Overtuigingen => Some(CatalogKind::Overtuiging),
            _ => None,
        }
    }

    const fn table(self) -> &'static str {
        if let Some(kind) = self.catalog() {
            return kind.layout().table;
        }
        match self {
            Self::Translations => translation::TABLE,
            Self::Users => user::TABLE,
            Self::PersonalGoals => personal_goal::TABLE,
            Self::Programs => program::TABLE,
            Self::ProgramSchedule => program_schedule::TABLE,
            Self::MethodUsage => method_usage::TABLE,
            Self::HabitUsage => habit_usage::TABLE,
            Self::PersonalGoalUsage => personal_goal_usage::TABLE,
            _ => overtuiging_usage::TABLE,
        }
    }
}

impl fmt::Display for SweepStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SweepStep {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("unknown sweep step: {s}")))
    }
}

/// Counts for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// The step.
    pub step: SweepStep,
    /// Records read from the spreadsheet store.
    pub fetched: usize,
    /// Rows written to the replica.
    pub upserted: usize,
    /// Records left for a later pass (missing parent or required field).
    pub skipped: usize,
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Per-step counts, in the order the steps ran.
    pub steps: Vec<StepReport>,
    /// Schedule rows whose usage rollup was recomputed, when method usages
    /// were swept.
    pub rollup_schedules: Option<u64>,
}

impl SweepReport {
    /// Counts for `step`, if it ran.
    #[must_use]
    pub fn step(&self, step: SweepStep) -> Option<&StepReport> {
        self.steps.iter().find(|report| report.step == step)
    }
}

/// Failure that aborted a sweep. Steps completed before it stay applied.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Reading from the spreadsheet store failed.
    #[error("fetching {step} failed: {source}")]
    External {
        /// Step being run.
        step: SweepStep,
        /// Adapter error.
        source: ExternalStoreError,
    },

    /// Writing to the relational store failed.
    #[error("applying {step} failed: {source}")]
    Store {
        /// Step being run.
        step: SweepStep,
        /// Repository error.
        source: DomainError,
    },
}

enum Applied {
    Upserted,
    Skipped,
}

/// Pulls selected spreadsheet tables into the relational replica.
///
/// Every write is an upsert keyed by the record id, so the sweep can be
/// re-run or resumed after a crash at any point.
pub struct ReconciliationSweep {
    external: Arc<dyn ExternalStore>,
    replica: Arc<dyn ReplicaRepository>,
    mappings: Arc<dyn MappingRepository>,
    clock: Arc<dyn Clock>,
}

impl ReconciliationSweep {
    /// Creates a sweep.
    #[must_use]
    pub fn new(
        external: Arc<dyn ExternalStore>,
        replica: Arc<dyn ReplicaRepository>,
        mappings: Arc<dyn MappingRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            external,
            replica,
            mappings,
            clock,
        }
    }

    /// Runs every step.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub async fn run_all(&self) -> Result<SweepReport, SweepError> {
        self.run(&SweepStep::ALL).await
    }

    /// Runs the selected steps in dependency order, whatever order they are
    /// given in.
    ///
    /// # Errors
    ///
    /// Returns `SweepError` on the first fetch or write failure.
    pub async fn run(&self, selected: &[SweepStep]) -> Result<SweepReport, SweepError> {
        let mut report = SweepReport::default();
        for step in SweepStep::ALL.into_iter().filter(|s| selected.contains(s)) {
            let step_report = self.run_step(step).await?;
            info!(
                step = %step,
                fetched = step_report.fetched,
                upserted = step_report.upserted,
                skipped = step_report.skipped,
                "Sweep step finished"
            );
            report.steps.push(step_report);

            if step == SweepStep::MethodUsage {
                let touched = self
                    .replica
                    .refresh_method_usage_rollup()
                    .await
                    .map_err(|source| SweepError::Store { step, source })?;
                report.rollup_schedules = Some(touched);
            }
        }
        Ok(report)
    }

    async fn run_step(&self, step: SweepStep) -> Result<StepReport, SweepError> {
        let records = self
            .external
            .list_records(step.table(), None)
            .await
            .map_err(|source| SweepError::External { step, source })?;

        let mut report = StepReport {
            step,
            fetched: records.len(),
            upserted: 0,
            skipped: 0,
        };
        for record in &records {
            let applied = self
                .apply(step, record)
                .await
                .map_err(|source| SweepError::Store { step, source })?;
            match applied {
                Applied::Upserted => report.upserted += 1,
                Applied::Skipped => {
                    debug!(step = %step, record_id = %record.id, "Record skipped for this pass");
                    report.skipped += 1;
                }
            }
        }
        Ok(report)
    }

    async fn apply(&self, step: SweepStep, record: &ExternalRecord) -> Result<Applied, DomainError> {
        if let Some(kind) = step.catalog() {
            let Some(row) = records::catalog_row(kind.layout(), record) else {
                return Ok(Applied::Skipped);
            };
            let known = self.known(kind.entity_type(), record).await?;
            let id = self.replica.upsert_catalog(kind, &row).await?;
            return self.mapped(kind.entity_type(), id, record, known).await;
        }

        match step {
            SweepStep::Translations => {
                let Some(row) = records::translation_row(record) else {
                    return Ok(Applied::Skipped);
                };
                self.replica.upsert_translation(&row).await?;
                Ok(Applied::Upserted)
            }
            SweepStep::Users => {
                let Some(row) = UserRow::from_record(record) else {
                    return Ok(Applied::Skipped);
                };
                self.replica.upsert_user(&row).await?;
                Ok(Applied::Upserted)
            }
            SweepStep::PersonalGoals => {
                let known = self.known(EntityType::PersonalGoal, record).await?;
                let row = records::personal_goal_row(record);
                let id = self
                    .replica
                    .upsert_personal_goal(&row, row_id(known.as_deref()))
                    .await?;
                self.mapped(EntityType::PersonalGoal, id, record, known).await
            }
            SweepStep::Programs => {
                let known = self.known(EntityType::Program, record).await?;
                let row = records::program_row(record);
                let id = self
                    .replica
                    .upsert_program(&row, row_id(known.as_deref()))
                    .await?;
                self.mapped(EntityType::Program, id, record, known).await
            }
            SweepStep::ProgramSchedule => {
                let Some(program_id) = self
                    .required_link(record, program_schedule::PROGRAM, EntityType::Program)
                    .await?
                else {
                    return Ok(Applied::Skipped);
                };
                let row = records::program_schedule_row(record, program_id);
                let known = self.known(EntityType::ProgramSchedule, record).await?;
                let id = self
                    .replica
                    .upsert_program_schedule(&row, row_id(known.as_deref()))
                    .await?;
                self.mapped(EntityType::ProgramSchedule, id, record, known).await
            }
            SweepStep::MethodUsage => {
                let Some(program_id) = self
                    .optional_link(record, method_usage::PROGRAM, EntityType::Program)
                    .await?
                else {
                    return Ok(Applied::Skipped);
                };
                let Some(schedule_id) = self
                    .optional_link(
                        record,
                        method_usage::PROGRAM_SCHEDULE,
                        EntityType::ProgramSchedule,
                    )
                    .await?
                else {
                    return Ok(Applied::Skipped);
                };
                let row = records::method_usage_row(record, program_id, schedule_id);
                let known = self.known(EntityType::MethodUsage, record).await?;
                let id = self
                    .replica
                    .upsert_method_usage(&row, row_id(known.as_deref()))
                    .await?;
                self.mapped(EntityType::MethodUsage, id, record, known).await
            }
            SweepStep::HabitUsage => {
                let known = self.known(EntityType::HabitUsage, record).await?;
                let row = records::habit_usage_row(record);
                let id = self
                    .replica
                    .upsert_habit_usage(&row, row_id(known.as_deref()))
                    .await?;
                self.mapped(EntityType::HabitUsage, id, record, known).await
            }
            SweepStep::PersonalGoalUsage => {
                let Some(goal_id) = self
                    .required_link(
                        record,
                        personal_goal_usage::PERSONAL_GOAL,
                        EntityType::PersonalGoal,
                    )
                    .await?
                else {
                    return Ok(Applied::Skipped);
                };
                let row = records::personal_goal_usage_row(record, goal_id);
                let known = self.known(EntityType::PersonalGoalUsage, record).await?;
                let id = self
                    .replica
                    .upsert_personal_goal_usage(&row, row_id(known.as_deref()))
                    .await?;
                self.mapped(EntityType::PersonalGoalUsage, id, record, known).await
            }
            SweepStep::OvertuigingUsage => {
                let Some(program_id) = self
                    .optional_link(record, overtuiging_usage::PROGRAM, EntityType::Program)
                    .await?
                else {
                    return Ok(Applied::Skipped);
                };
                let row = records::overtuiging_usage_row(record, program_id);
                let known = self.known(EntityType::OvertuigingUsage, record).await?;
                let id = self
                    .replica
                    .upsert_overtuiging_usage(&row, row_id(known.as_deref()))
                    .await?;
                self.mapped(EntityType::OvertuigingUsage, id, record, known).await
            }
            SweepStep::Methods
            | SweepStep::Goals
            | SweepStep::Days
            | SweepStep::OvertuigingCategories
            | SweepStep::Overtuigingen => Ok(Applied::Skipped),
        }
    }

    /// Relational id already mapped to `record`, typically by an outbox
    /// create that wrote the record in the first place.
    async fn known(
        &self,
        entity_type: EntityType,
        record: &ExternalRecord,
    ) -> Result<Option<String>, DomainError> {
        self.mappings.find_postgres_id(entity_type, &record.id).await
    }

    /// Records `record` as the spreadsheet side of replica row `id`. A
    /// record already mapped to some other relational id keeps that
    /// mapping; the external id is unique per entity type.
    async fn mapped(
        &self,
        entity_type: EntityType,
        id: Uuid,
        record: &ExternalRecord,
        known: Option<String>,
    ) -> Result<Applied, DomainError> {
        let id = id.to_string();
        if let Some(existing) = known.filter(|existing| *existing != id) {
            warn!(
                entity_type = %entity_type,
                record_id = %record.id,
                postgres_id = %existing,
                replica_id = %id,
                "Record is mapped to another relational id, keeping that mapping"
            );
            return Ok(Applied::Upserted);
        }
        self.mappings
            .upsert_mapping(entity_type, &id, &record.id, None, self.clock.now())
            .await?;
        Ok(Applied::Upserted)
    }

    /// Relational id behind a link the row cannot exist without. `None` when
    /// the link is empty or its target is not mapped yet.
    async fn required_link(
        &self,
        record: &ExternalRecord,
        field: &str,
        target: EntityType,
    ) -> Result<Option<Uuid>, DomainError> {
        match record.first_link(field) {
            Some(linked) => self.resolve(target, &linked).await,
            None => Ok(None),
        }
    }

    /// Like [`Self::required_link`], but an empty link is fine:
    /// `Some(None)`. Only an unmapped target yields `None`.
    async fn optional_link(
        &self,
        record: &ExternalRecord,
        field: &str,
        target: EntityType,
    ) -> Result<Option<Option<Uuid>>, DomainError> {
        match record.first_link(field) {
            Some(linked) => Ok(self.resolve(target, &linked).await?.map(Some)),
            None => Ok(Some(None)),
        }
    }

    async fn resolve(&self, target: EntityType, record_id: &str) -> Result<Option<Uuid>, DomainError> {
        let Some(postgres_id) = self.mappings.find_postgres_id(target, record_id).await? else {
            return Ok(None);
        };
        match Uuid::parse_str(&postgres_id) {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                warn!(
                    entity_type = %target,
                    record_id,
                    postgres_id,
                    "Mapped id is not a replica row id"
                );
                Ok(None)
            }
        }
    }
}

/// The known relational id, when it can key a replica row.
fn row_id(known: Option<&str>) -> Option<Uuid> {
    known.and_then(|id| Uuid::parse_str(id).ok())
}
