//! Strongly typed change payloads carried by outbox events.
//!
//! Each outbound entity type has its own payload struct with canonical field
//! names and relational-store foreign keys. Absent fields (`None`) mean "not
//! touched by this change" and are never written to the spreadsheet store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;

/// Payload for [`EntityType::Program`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProgramPayload {
    /// Owning user (identity id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Catalog goals the program works on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_ids: Option<Vec<String>>,
    /// Catalog weekdays the program is scheduled on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_ids: Option<Vec<String>>,
    /// First day of the program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Human-readable duration label (e.g. "6 weken").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Free-text motivation entered by the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motivation: Option<String>,
}

/// Payload for [`EntityType::ProgramSchedule`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProgramSchedulePayload {
    /// Parent program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    /// Catalog weekday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_id: Option<String>,
    /// Calendar date of the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Methods planned for the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_ids: Option<Vec<String>>,
}

/// Payload for [`EntityType::MethodUsage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MethodUsagePayload {
    /// User who completed the method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Catalog method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_id: Option<String>,
    /// Program the session belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    /// Schedule row the session completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_schedule_id: Option<String>,
    /// Day the method was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<NaiveDate>,
    /// Optional reflection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

/// Payload for [`EntityType::HabitUsage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HabitUsagePayload {
    /// User tracking the habit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Catalog method used as a habit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_id: Option<String>,
    /// Check-in date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Whether the habit was completed on `date`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// Payload for [`EntityType::PersonalGoal`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PersonalGoalPayload {
    /// Owning user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Goal title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the goal is still being tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// Payload for [`EntityType::PersonalGoalUsage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PersonalGoalUsagePayload {
    /// User checking in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Personal goal checked in against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_goal_id: Option<String>,
    /// Check-in date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// Payload for [`EntityType::OvertuigingUsage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OvertuigingUsagePayload {
    /// User practicing the belief.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Catalog belief statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overtuiging_id: Option<String>,
    /// Program context, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    /// Practice date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// Payload for [`EntityType::User`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserPayload {
    /// Login e-mail address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Authorization role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Preferred UI language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    /// Password hash, replicated verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

/// A foreign-key field inside a payload that must be translated to the
/// spreadsheet store's identifiers before writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Canonical payload field name.
    pub field: &'static str,
    /// Entity type the ids point at.
    pub target: EntityType,
    /// Relational-store (or already-external) ids.
    pub ids: Vec<String>,
}

impl Reference {
    fn one(field: &'static str, target: EntityType, id: Option<&String>) -> Option<Self> {
        id.map(|id| Self {
            field,
            target,
            ids: vec![id.clone()],
        })
    }

    fn many(field: &'static str, target: EntityType, ids: Option<&Vec<String>>) -> Option<Self> {
        ids.map(|ids| Self {
            field,
            target,
            ids: ids.clone(),
        })
    }
}

/// Tagged union of every outbound change payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPayload {
    /// See [`ProgramPayload`].
    Program(ProgramPayload),
    /// See [`ProgramSchedulePayload`].
    ProgramSchedule(ProgramSchedulePayload),
    /// See [`MethodUsagePayload`].
    MethodUsage(MethodUsagePayload),
    /// See [`HabitUsagePayload`].
    HabitUsage(HabitUsagePayload),
    /// See [`PersonalGoalPayload`].
    PersonalGoal(PersonalGoalPayload),
    /// See [`PersonalGoalUsagePayload`].
    PersonalGoalUsage(PersonalGoalUsagePayload),
    /// See [`OvertuigingUsagePayload`].
    OvertuigingUsage(OvertuigingUsagePayload),
    /// See [`UserPayload`].
    User(UserPayload),
}

impl SyncPayload {
    /// The entity type this payload belongs to.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Program(_) => EntityType::Program,
            Self::ProgramSchedule(_) => EntityType::ProgramSchedule,
            Self::MethodUsage(_) => EntityType::MethodUsage,
            Self::HabitUsage(_) => EntityType::HabitUsage,
            Self::PersonalGoal(_) => EntityType::PersonalGoal,
            Self::PersonalGoalUsage(_) => EntityType::PersonalGoalUsage,
            Self::OvertuigingUsage(_) => EntityType::OvertuigingUsage,
            Self::User(_) => EntityType::User,
        }
    }

    /// Serializes the variant body (without a tag) for the outbox `payload`
    /// column. The tag lives in the `entity_type` column.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        let value = match self {
            Self::Program(p) => serde_json::to_value(p),
            Self::ProgramSchedule(p) => serde_json::to_value(p),
            Self::MethodUsage(p) => serde_json::to_value(p),
            Self::HabitUsage(p) => serde_json::to_value(p),
            Self::PersonalGoal(p) => serde_json::to_value(p),
            Self::PersonalGoalUsage(p) => serde_json::to_value(p),
            Self::OvertuigingUsage(p) => serde_json::to_value(p),
            Self::User(p) => serde_json::to_value(p),
        };
        value.expect("payload serialization is infallible")
    }

    /// Decodes a stored payload body for `entity_type`.
    ///
    /// # Errors
    ///
    /// Returns a message when the entity type has no outbound payload or the
    /// body carries unknown or mistyped fields.
    pub fn decode(entity_type: EntityType, value: serde_json::Value) -> Result<Self, String> {
        let decoded = match entity_type {
            EntityType::Program => serde_json::from_value(value).map(Self::Program),
            EntityType::ProgramSchedule => serde_json::from_value(value).map(Self::ProgramSchedule),
            EntityType::MethodUsage => serde_json::from_value(value).map(Self::MethodUsage),
            EntityType::HabitUsage => serde_json::from_value(value).map(Self::HabitUsage),
            EntityType::PersonalGoal => serde_json::from_value(value).map(Self::PersonalGoal),
            EntityType::PersonalGoalUsage => {
                serde_json::from_value(value).map(Self::PersonalGoalUsage)
            }
            EntityType::OvertuigingUsage => {
                serde_json::from_value(value).map(Self::OvertuigingUsage)
            }
            EntityType::User => serde_json::from_value(value).map(Self::User),
            other => return Err(format!("{other} is read-only and has no outbound payload")),
        };
        decoded.map_err(|e| format!("invalid {entity_type} payload: {e}"))
    }

    /// Foreign-key fields that must be resolved before writing.
    #[must_use]
    pub fn references(&self) -> Vec<Reference> {
        let refs = match self {
            Self::Program(p) => vec![
                Reference::one("userId", EntityType::User, p.user_id.as_ref()),
                Reference::many("goalIds", EntityType::Goal, p.goal_ids.as_ref()),
                Reference::many("dayIds", EntityType::Day, p.day_ids.as_ref()),
            ],
            Self::ProgramSchedule(p) => vec![
                Reference::one("programId", EntityType::Program, p.program_id.as_ref()),
                Reference::one("dayId", EntityType::Day, p.day_id.as_ref()),
                Reference::many("methodIds", EntityType::Method, p.method_ids.as_ref()),
            ],
            Self::MethodUsage(p) => vec![
                Reference::one("userId", EntityType::User, p.user_id.as_ref()),
                Reference::one("methodId", EntityType::Method, p.method_id.as_ref()),
                Reference::one("programId", EntityType::Program, p.program_id.as_ref()),
                Reference::one(
                    "programScheduleId",
                    EntityType::ProgramSchedule,
                    p.program_schedule_id.as_ref(),
                ),
            ],
            Self::HabitUsage(p) => vec![
                Reference::one("userId", EntityType::User, p.user_id.as_ref()),
                Reference::one("methodId", EntityType::Method, p.method_id.as_ref()),
            ],
            Self::PersonalGoal(p) => vec![Reference::one(
                "userId",
                EntityType::User,
                p.user_id.as_ref(),
            )],
            Self::PersonalGoalUsage(p) => vec![
                Reference::one("userId", EntityType::User, p.user_id.as_ref()),
                Reference::one(
                    "personalGoalId",
                    EntityType::PersonalGoal,
                    p.personal_goal_id.as_ref(),
                ),
            ],
            Self::OvertuigingUsage(p) => vec![
                Reference::one("userId", EntityType::User, p.user_id.as_ref()),
                Reference::one(
                    "overtuigingId",
                    EntityType::Overtuiging,
                    p.overtuiging_id.as_ref(),
                ),
                Reference::one("programId", EntityType::Program, p.program_id.as_ref()),
            ],
            Self::User(_) => Vec::new(),
        };
        refs.into_iter().flatten().collect()
    }
}
