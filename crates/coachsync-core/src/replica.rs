//! Relational-store rows populated from the spreadsheet store.
//!
//! Rows are keyed by the spreadsheet record id (`airtable_id`) so upserts are
//! idempotent. Foreign keys between replicated entities are relational-store
//! UUIDs resolved through the identifier mapping; links to read-only catalog
//! data keep the spreadsheet record ids.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::entity::EntityType;
use crate::external::ExternalRecord;
use crate::fields::{self, CatalogLayout};

/// Read-only catalog tables that share one row shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    /// Coaching methods.
    Method,
    /// Program goals.
    Goal,
    /// Weekdays.
    Day,
    /// Belief categories.
    OvertuigingCategory,
    /// Belief statements.
    Overtuiging,
}

impl CatalogKind {
    /// Relational table name.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Method => "methods",
            Self::Goal => "goals",
            Self::Day => "days",
            Self::OvertuigingCategory => "belief_categories",
            Self::Overtuiging => "beliefs",
        }
    }

    /// Spreadsheet layout of the catalog.
    #[must_use]
    pub const fn layout(self) -> CatalogLayout {
        match self {
            Self::Method => fields::METHODS,
            Self::Goal => fields::GOALS,
            Self::Day => fields::DAYS,
            Self::OvertuigingCategory => fields::OVERTUIGING_CATEGORIES,
            Self::Overtuiging => fields::OVERTUIGINGEN,
        }
    }

    /// Entity type used for identifier mappings.
    #[must_use]
    pub const fn entity_type(self) -> EntityType {
        match self {
            Self::Method => EntityType::Method,
            Self::Goal => EntityType::Goal,
            Self::Day => EntityType::Day,
            Self::OvertuigingCategory => EntityType::OvertuigingCategory,
            Self::Overtuiging => EntityType::Overtuiging,
        }
    }
}

/// Row of a catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRow {
    /// Spreadsheet record id.
    pub airtable_id: String,
    /// Display name.
    pub name: String,
    /// Long description.
    pub description: Option<String>,
    /// Ordering hint.
    pub sort_order: Option<i32>,
    /// Linked catalog record ids (e.g. a belief's categories).
    pub linked_ids: Vec<String>,
}

/// Row of the `translations` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationRow {
    /// Spreadsheet record id.
    pub airtable_id: String,
    /// Translation key.
    pub key: String,
    /// Language code.
    pub language_code: String,
    /// Translated text.
    pub value: String,
}

/// Row of the `users` table. `id` is the spreadsheet record id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRow {
    /// Identity id, equal to the spreadsheet record id.
    pub id: String,
    /// Login e-mail.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Authorization role.
    pub role: Option<String>,
    /// Preferred UI language.
    pub language_code: Option<String>,
    /// Password hash.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UserRow {
    /// Reads a user from its spreadsheet record. `None` when the record has
    /// no e-mail, since such a user cannot sign in.
    #[must_use]
    pub fn from_record(record: &ExternalRecord) -> Option<Self> {
        Some(Self {
            id: record.id.clone(),
            email: record.text(fields::user::EMAIL)?.trim().to_owned(),
            name: record.text(fields::user::NAME).unwrap_or_default(),
            role: record.text(fields::user::ROLE),
            language_code: record.text(fields::user::LANGUAGE_CODE),
            password_hash: record.text(fields::user::PASSWORD_HASH),
            deleted_at: None,
        })
    }
}

/// Row of the `personal_goals` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonalGoalRow {
    /// Spreadsheet record id.
    pub airtable_id: String,
    /// Owning user.
    pub user_id: Option<String>,
    /// Goal title.
    pub name: String,
    /// Active flag.
    pub active: bool,
    /// Creation time in the spreadsheet store.
    pub created_at: DateTime<Utc>,
}

/// Row of the `programs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramRow {
    /// Spreadsheet record id.
    pub airtable_id: String,
    /// Owning user.
    pub user_id: Option<String>,
    /// Catalog goal record ids.
    pub goal_ids: Vec<String>,
    /// Catalog day record ids.
    pub day_ids: Vec<String>,
    /// First day.
    pub start_date: Option<NaiveDate>,
    /// Duration label.
    pub duration: Option<String>,
    /// Motivation text.
    pub motivation: Option<String>,
    /// Creation time in the spreadsheet store.
    pub created_at: DateTime<Utc>,
}

/// Row of the `program_schedule` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramScheduleRow {
    /// Spreadsheet record id.
    pub airtable_id: String,
    /// Parent program (relational id).
    pub program_id: Uuid,
    /// Catalog day record id.
    pub day_id: Option<String>,
    /// Session date.
    pub date: Option<NaiveDate>,
    /// Catalog method record ids.
    pub method_ids: Vec<String>,
}

/// Row of the `method_usage` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodUsageRow {
    /// Spreadsheet record id.
    pub airtable_id: String,
    /// User who completed the method.
    pub user_id: Option<String>,
    /// Catalog method record id.
    pub method_id: Option<String>,
    /// Program (relational id).
    pub program_id: Option<Uuid>,
    /// Schedule row (relational id).
    pub program_schedule_id: Option<Uuid>,
    /// Usage date.
    pub used_at: Option<NaiveDate>,
    /// Reflection text.
    pub remark: Option<String>,
    /// Creation time in the spreadsheet store.
    pub created_at: DateTime<Utc>,
}

/// Row of the `habit_usage` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HabitUsageRow {
    /// Spreadsheet record id.
    pub airtable_id: String,
    /// User tracking the habit.
    pub user_id: Option<String>,
    /// Catalog method record id.
    pub method_id: Option<String>,
    /// Check-in date.
    pub date: Option<NaiveDate>,
    /// Completion flag.
    pub completed: bool,
    /// Creation time in the spreadsheet store.
    pub created_at: DateTime<Utc>,
}

/// Row of the `personal_goal_usage` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonalGoalUsageRow {
    /// Spreadsheet record id.
    pub airtable_id: String,
    /// User checking in.
    pub user_id: Option<String>,
    /// Personal goal (relational id).
    pub personal_goal_id: Uuid,
    /// Check-in date.
    pub date: Option<NaiveDate>,
    /// Creation time in the spreadsheet store.
    pub created_at: DateTime<Utc>,
}

/// Row of the `belief_usage` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OvertuigingUsageRow {
    /// Spreadsheet record id.
    pub airtable_id: String,
    /// User practicing the belief.
    pub user_id: Option<String>,
    /// Catalog belief record id.
    pub overtuiging_id: Option<String>,
    /// Program (relational id).
    pub program_id: Option<Uuid>,
    /// Practice date.
    pub date: Option<NaiveDate>,
    /// Creation time in the spreadsheet store.
    pub created_at: DateTime<Utc>,
}
