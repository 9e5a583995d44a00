//! Payload → spreadsheet field map translation.
//!
//! Each payload variant maps its canonical fields onto the static layout in
//! [`coachsync_core::fields`]. Absent values are left out of the map so a
//! partial update never clears fields the change did not touch.

use chrono::NaiveDate;
use coachsync_core::external::FieldMap;
use coachsync_core::fields::{
    habit_usage, method_usage, overtuiging_usage, personal_goal, personal_goal_usage, program,
    program_schedule, user,
};
use coachsync_core::payload::SyncPayload;
use serde_json::Value;

use crate::references::ResolvedReferences;

struct FieldMapBuilder<'a> {
    fields: FieldMap,
    references: &'a ResolvedReferences,
}

impl<'a> FieldMapBuilder<'a> {
    fn new(references: &'a ResolvedReferences) -> Self {
        Self {
            fields: FieldMap::new(),
            references,
        }
    }

    fn text(mut self, field: &str, value: Option<&String>) -> Self {
        if let Some(value) = value {
            self.fields
                .insert(field.to_owned(), Value::String(value.clone()));
        }
        self
    }

    fn date(mut self, field: &str, value: Option<NaiveDate>) -> Self {
        if let Some(value) = value {
            self.fields.insert(
                field.to_owned(),
                Value::String(value.format("%Y-%m-%d").to_string()),
            );
        }
        self
    }

    fn flag(mut self, field: &str, value: Option<bool>) -> Self {
        if let Some(value) = value {
            self.fields.insert(field.to_owned(), Value::Bool(value));
        }
        self
    }

    /// Linked-record field, written as an array of record ids.
    fn link(mut self, field: &str, canonical: &str) -> Self {
        if let Some(ids) = self.references.get(canonical) {
            let ids = ids.iter().cloned().map(Value::String).collect();
            self.fields.insert(field.to_owned(), Value::Array(ids));
        }
        self
    }

    fn build(self) -> FieldMap {
        self.fields
    }
}

/// Builds the spreadsheet field map for `payload`, with foreign keys already
/// resolved to record ids.
#[must_use]
pub fn build_field_map(payload: &SyncPayload, references: &ResolvedReferences) -> FieldMap {
    let builder = FieldMapBuilder::new(references);
    match payload {
        SyncPayload::Program(p) => builder
            .link(program::USER, "userId")
            .link(program::GOALS, "goalIds")
            .link(program::DAYS, "dayIds")
            .date(program::START_DATE, p.start_date)
            .text(program::DURATION, p.duration.as_ref())
            .text(program::MOTIVATION, p.motivation.as_ref()),
        SyncPayload::ProgramSchedule(p) => builder
            .link(program_schedule::PROGRAM, "programId")
            .link(program_schedule::DAY, "dayId")
            .date(program_schedule::DATE, p.date)
            .link(program_schedule::METHODS, "methodIds"),
        SyncPayload::MethodUsage(p) => builder
            .link(method_usage::USER, "userId")
            .link(method_usage::METHOD, "methodId")
            .link(method_usage::PROGRAM, "programId")
            .link(method_usage::PROGRAM_SCHEDULE, "programScheduleId")
            .date(method_usage::USED_AT, p.used_at)
            .text(method_usage::REMARK, p.remark.as_ref()),
        SyncPayload::HabitUsage(p) => builder
            .link(habit_usage::USER, "userId")
            .link(habit_usage::METHOD, "methodId")
            .date(habit_usage::DATE, p.date)
            .flag(habit_usage::COMPLETED, p.completed),
        SyncPayload::PersonalGoal(p) => builder
            .link(personal_goal::USER, "userId")
            .text(personal_goal::NAME, p.name.as_ref())
            .flag(personal_goal::ACTIVE, p.active),
        SyncPayload::PersonalGoalUsage(p) => builder
            .link(personal_goal_usage::USER, "userId")
            .link(personal_goal_usage::PERSONAL_GOAL, "personalGoalId")
            .date(personal_goal_usage::DATE, p.date),
        SyncPayload::OvertuigingUsage(p) => builder
            .link(overtuiging_usage::USER, "userId")
            .link(overtuiging_usage::OVERTUIGING, "overtuigingId")
            .link(overtuiging_usage::PROGRAM, "programId")
            .date(overtuiging_usage::DATE, p.date),
        SyncPayload::User(p) => builder
            .text(user::EMAIL, p.email.as_ref())
            .text(user::NAME, p.name.as_ref())
            .text(user::ROLE, p.role.as_ref())
            .text(user::LANGUAGE_CODE, p.language_code.as_ref())
            .text(user::PASSWORD_HASH, p.password_hash.as_ref()),
    }
    .build()
}
