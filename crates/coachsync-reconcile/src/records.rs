//! Spreadsheet record → replica row parsing.
//!
//! Links between replicated entities arrive as record ids and are resolved by
//! the sweep before these functions run; the resolved relational ids are
//! passed in. Links to catalog data and users keep their record ids.

use coachsync_core::external::ExternalRecord;
use coachsync_core::fields::{
    CatalogLayout, habit_usage, method_usage, overtuiging_usage, personal_goal,
    personal_goal_usage, program, program_schedule, translation,
};
use coachsync_core::replica::{
    CatalogRow, HabitUsageRow, MethodUsageRow, OvertuigingUsageRow, PersonalGoalRow,
    PersonalGoalUsageRow, ProgramRow, ProgramScheduleRow, TranslationRow,
};
use uuid::Uuid;

pub(crate) fn catalog_row(layout: CatalogLayout, record: &ExternalRecord) -> Option<CatalogRow> {
    Some(CatalogRow {
        airtable_id: record.id.clone(),
        name: record.text(layout.name)?,
        description: layout.description.and_then(|field| record.text(field)),
        sort_order: layout.sort_order.and_then(|field| record.integer(field)),
        linked_ids: layout
            .links
            .map(|field| record.links(field))
            .unwrap_or_default(),
    })
}

pub(crate) fn translation_row(record: &ExternalRecord) -> Option<TranslationRow> {
    Some(TranslationRow {
        airtable_id: record.id.clone(),
        key: record.text(translation::KEY)?,
        language_code: record.text(translation::LANGUAGE)?,
        value: record.text(translation::VALUE).unwrap_or_default(),
    })
}

pub(crate) fn personal_goal_row(record: &ExternalRecord) -> PersonalGoalRow {
    PersonalGoalRow {
        airtable_id: record.id.clone(),
        user_id: record.first_link(personal_goal::USER),
        name: record.text(personal_goal::NAME).unwrap_or_default(),
        active: record.checkbox(personal_goal::ACTIVE),
        created_at: record.created_time,
    }
}

pub(crate) fn program_row(record: &ExternalRecord) -> ProgramRow {
    ProgramRow {
        airtable_id: record.id.clone(),
        user_id: record.first_link(program::USER),
        goal_ids: record.links(program::GOALS),
        day_ids: record.links(program::DAYS),
        start_date: record.date(program::START_DATE),
        duration: record.text(program::DURATION),
        motivation: record.text(program::MOTIVATION),
        created_at: record.created_time,
    }
}

pub(crate) fn program_schedule_row(record: &ExternalRecord, program_id: Uuid) -> ProgramScheduleRow {
    ProgramScheduleRow {
        airtable_id: record.id.clone(),
        program_id,
        day_id: record.first_link(program_schedule::DAY),
        date: record.date(program_schedule::DATE),
        method_ids: record.links(program_schedule::METHODS),
    }
}

pub(crate) fn method_usage_row(
    record: &ExternalRecord,
    program_id: Option<Uuid>,
    program_schedule_id: Option<Uuid>,
) -> MethodUsageRow {
    MethodUsageRow {
        airtable_id: record.id.clone(),
        user_id: record.first_link(method_usage::USER),
        method_id: record.first_link(method_usage::METHOD),
        program_id,
        program_schedule_id,
        used_at: record.date(method_usage::USED_AT),
        remark: record.text(method_usage::REMARK),
        created_at: record.created_time,
    }
}

pub(crate) fn habit_usage_row(record: &ExternalRecord) -> HabitUsageRow {
    HabitUsageRow {
        airtable_id: record.id.clone(),
        user_id: record.first_link(habit_usage::USER),
        method_id: record.first_link(habit_usage::METHOD),
        date: record.date(habit_usage::DATE),
        completed: record.checkbox(habit_usage::COMPLETED),
        created_at: record.created_time,
    }
}

pub(crate) fn personal_goal_usage_row(
    record: &ExternalRecord,
    personal_goal_id: Uuid,
) -> PersonalGoalUsageRow {
    PersonalGoalUsageRow {
        airtable_id: record.id.clone(),
        user_id: record.first_link(personal_goal_usage::USER),
        personal_goal_id,
        date: record.date(personal_goal_usage::DATE),
        created_at: record.created_time,
    }
}

pub(crate) fn overtuiging_usage_row(
    record: &ExternalRecord,
    program_id: Option<Uuid>,
) -> OvertuigingUsageRow {
    OvertuigingUsageRow {
        airtable_id: record.id.clone(),
        user_id: record.first_link(overtuiging_usage::USER),
        overtuiging_id: record.first_link(overtuiging_usage::OVERTUIGING),
        program_id,
        date: record.date(overtuiging_usage::DATE),
        created_at: record.created_time,
    }
}
