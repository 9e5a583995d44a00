//! Static field layouts of the spreadsheet store.
//!
//! One module per table: the table name plus the external field name for
//! every canonical field. Writers and the reconciliation sweep share these
//! so both directions agree on the layout.

use crate::entity::EntityType;

/// `Users` table.
pub mod user {
    /// Table name.
    pub const TABLE: &str = "Users";
    /// Login e-mail.
    pub const EMAIL: &str = "Email";
    /// Display name.
    pub const NAME: &str = "Name";
    /// Authorization role.
    pub const ROLE: &str = "Role";
    /// Preferred UI language.
    pub const LANGUAGE_CODE: &str = "Language";
    /// Password hash.
    pub const PASSWORD_HASH: &str = "Password Hash";
    /// Computed last-modified timestamp.
    pub const LAST_MODIFIED: &str = "Last Modified";
}

/// `Programs` table.
pub mod program {
    /// Table name.
    pub const TABLE: &str = "Programs";
    /// Link to `Users`.
    pub const USER: &str = "User";
    /// Links to `Goals`.
    pub const GOALS: &str = "Goals";
    /// Links to `Days`.
    pub const DAYS: &str = "Days of Week";
    /// First day.
    pub const START_DATE: &str = "Start Date";
    /// Duration label.
    pub const DURATION: &str = "Duration";
    /// Motivation text.
    pub const MOTIVATION: &str = "Motivation";
}

/// `Program Schedule` table.
pub mod program_schedule {
    /// Table name.
    pub const TABLE: &str = "Program Schedule";
    /// Link to `Programs`.
    pub const PROGRAM: &str = "Program";
    /// Link to `Days`.
    pub const DAY: &str = "Day";
    /// Session date.
    pub const DATE: &str = "Date";
    /// Links to `Methods`.
    pub const METHODS: &str = "Methods";
}

/// `Method Usage` table.
pub mod method_usage {
    /// Table name.
    pub const TABLE: &str = "Method Usage";
    /// Link to `Users`.
    pub const USER: &str = "User";
    /// Link to `Methods`.
    pub const METHOD: &str = "Method";
    /// Link to `Programs`.
    pub const PROGRAM: &str = "Program";
    /// Link to `Program Schedule`.
    pub const PROGRAM_SCHEDULE: &str = "Program Schedule";
    /// Usage date.
    pub const USED_AT: &str = "Used At";
    /// Reflection text.
    pub const REMARK: &str = "Remark";
}

/// `Habit Usage` table.
pub mod habit_usage {
    /// Table name.
    pub const TABLE: &str = "Habit Usage";
    /// Link to `Users`.
    pub const USER: &str = "User";
    /// Link to `Methods`.
    pub const METHOD: &str = "Method";
    /// Check-in date.
    pub const DATE: &str = "Date";
    /// Completion checkbox.
    pub const COMPLETED: &str = "Completed";
}

/// `Personal Goals` table.
pub mod personal_goal {
    /// Table name.
    pub const TABLE: &str = "Personal Goals";
    /// Link to `Users`.
    pub const USER: &str = "User";
    /// Goal title.
    pub const NAME: &str = "Name";
    /// Active checkbox.
    pub const ACTIVE: &str = "Active";
}

/// `Personal Goal Usage` table.
pub mod personal_goal_usage {
    /// Table name.
    pub const TABLE: &str = "Personal Goal Usage";
    /// Link to `Users`.
    pub const USER: &str = "User";
    /// Link to `Personal Goals`.
    pub const PERSONAL_GOAL: &str = "Personal Goal";
    /// Check-in date.
    pub const DATE: &str = "Date";
}

/// `Overtuiging Usage` table.
pub mod overtuiging_usage {
    /// Table name.
    pub const TABLE: &str = "Overtuiging Usage";
    /// Link to `Users`.
    pub const USER: &str = "User";
    /// Link to `Overtuigingen`.
    pub const OVERTUIGING: &str = "Overtuiging";
    /// Link to `Programs`.
    pub const PROGRAM: &str = "Program";
    /// Practice date.
    pub const DATE: &str = "Date";
}

/// `Translations` table.
pub mod translation {
    /// Table name.
    pub const TABLE: &str = "Translations";
    /// Translation key.
    pub const KEY: &str = "Key";
    /// Language code.
    pub const LANGUAGE: &str = "Language";
    /// Translated text.
    pub const VALUE: &str = "Value";
}

/// Layout shared by the read-only catalog tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogLayout {
    /// Table name.
    pub table: &'static str,
    /// Display name field.
    pub name: &'static str,
    /// Description field, if the table has one.
    pub description: Option<&'static str>,
    /// Ordering field, if the table has one.
    pub sort_order: Option<&'static str>,
    /// Link field to another catalog, if any.
    pub links: Option<&'static str>,
}

/// `Methods` catalog.
pub const METHODS: CatalogLayout = CatalogLayout {
    table: "Methods",
    name: "Name",
    description: Some("Description"),
    sort_order: None,
    links: None,
};

/// `Goals` catalog.
pub const GOALS: CatalogLayout = CatalogLayout {
    table: "Goals",
    name: "Name",
    description: Some("Description"),
    sort_order: None,
    links: None,
};

/// `Days` catalog.
pub const DAYS: CatalogLayout = CatalogLayout {
    table: "Days",
    name: "Name",
    description: None,
    sort_order: Some("Order"),
    links: None,
};

/// `Overtuiging Categories` catalog.
pub const OVERTUIGING_CATEGORIES: CatalogLayout = CatalogLayout {
    table: "Overtuiging Categories",
    name: "Name",
    description: None,
    sort_order: Some("Order"),
    links: None,
};

/// `Overtuigingen` catalog.
pub const OVERTUIGINGEN: CatalogLayout = CatalogLayout {
    table: "Overtuigingen",
    name: "Name",
    description: None,
    sort_order: Some("Order"),
    links: Some("Category"),
};

/// Spreadsheet table that stores `entity_type`.
#[must_use]
pub const fn table_for(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Program => program::TABLE,
        EntityType::ProgramSchedule => program_schedule::TABLE,
        EntityType::MethodUsage => method_usage::TABLE,
        EntityType::HabitUsage => habit_usage::TABLE,
        EntityType::PersonalGoal => personal_goal::TABLE,
        EntityType::PersonalGoalUsage => personal_goal_usage::TABLE,
        EntityType::OvertuigingUsage => overtuiging_usage::TABLE,
        EntityType::User => user::TABLE,
        EntityType::Method => METHODS.table,
        EntityType::Goal => GOALS.table,
        EntityType::Day => DAYS.table,
        EntityType::Overtuiging => OVERTUIGINGEN.table,
        EntityType::OvertuigingCategory => OVERTUIGING_CATEGORIES.table,
    }
}
