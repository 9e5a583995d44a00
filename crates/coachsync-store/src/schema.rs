//! Database schema for sync state and replica tables.
//!
//! The SQL lives in the workspace `migrations/` directory and is embedded at
//! compile time.

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};

/// Embedded migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Applies pending migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the history diverges.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

pub(crate) fn infrastructure(err: sqlx::Error) -> coachsync_core::error::DomainError {
    coachsync_core::error::DomainError::Infrastructure(err.to_string())
}
