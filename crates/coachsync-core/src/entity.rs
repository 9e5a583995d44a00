//! Entity types known to the synchronization engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Logical entity type shared by both stores.
///
/// The first eight variants are replicated outbound through the outbox. The
/// catalog variants are read-only reference data pulled in by the
/// reconciliation sweep; they only ever appear in identifier mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A coaching program owned by a user.
    Program,
    /// One scheduled day within a program.
    ProgramSchedule,
    /// A completed method (exercise) session.
    MethodUsage,
    /// A tracked habit check-in.
    HabitUsage,
    /// A user-defined goal.
    PersonalGoal,
    /// A check-in against a personal goal.
    PersonalGoalUsage,
    /// A practiced belief statement.
    OvertuigingUsage,
    /// A user identity record.
    User,
    /// Catalog: coaching method.
    Method,
    /// Catalog: program goal.
    Goal,
    /// Catalog: weekday.
    Day,
    /// Catalog: belief statement.
    Overtuiging,
    /// Catalog: belief category.
    OvertuigingCategory,
}

impl EntityType {
    /// Entity types that flow from the relational store to the spreadsheet
    /// store through the outbox.
    pub const OUTBOUND: [Self; 8] = [
        Self::Program,
        Self::ProgramSchedule,
        Self::MethodUsage,
        Self::HabitUsage,
        Self::PersonalGoal,
        Self::PersonalGoalUsage,
        Self::OvertuigingUsage,
        Self::User,
    ];

    /// Stable wire/database name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Program => "program",
            Self::ProgramSchedule => "program_schedule",
            Self::MethodUsage => "method_usage",
            Self::HabitUsage => "habit_usage",
            Self::PersonalGoal => "personal_goal",
            Self::PersonalGoalUsage => "personal_goal_usage",
            Self::OvertuigingUsage => "overtuiging_usage",
            Self::User => "user",
            Self::Method => "method",
            Self::Goal => "goal",
            Self::Day => "day",
            Self::Overtuiging => "overtuiging",
            Self::OvertuigingCategory => "overtuiging_category",
        }
    }

    /// Whether the outbox may carry writes for this type.
    #[must_use]
    pub fn is_outbound(self) -> bool {
        Self::OUTBOUND.contains(&self)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entity_type = match s {
            "program" => Self::Program,
            "program_schedule" => Self::ProgramSchedule,
            "method_usage" => Self::MethodUsage,
            "habit_usage" => Self::HabitUsage,
            "personal_goal" => Self::PersonalGoal,
            "personal_goal_usage" => Self::PersonalGoalUsage,
            "overtuiging_usage" => Self::OvertuigingUsage,
            "user" => Self::User,
            "method" => Self::Method,
            "goal" => Self::Goal,
            "day" => Self::Day,
            "overtuiging" => Self::Overtuiging,
            "overtuiging_category" => Self::OvertuigingCategory,
            other => {
                return Err(DomainError::Validation(format!(
                    "unknown entity type: {other}"
                )));
            }
        };
        Ok(entity_type)
    }
}
