//! # Database Migration Management
//!
//! SQL migrations under `migrations/` are embedded in the binary at compile
//! time and applied in version order.

use crate::errors::Result;
use crate::storage::DbPool;
use sqlx::migrate::Migrator;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!(embedded = MIGRATOR.iter().count(), "Starting database migration process");
    MIGRATOR.run(pool).await?;
    info!("Database migrations completed");
    Ok(())
}

/// Versions of every embedded migration, oldest first.
pub fn embedded_versions() -> Vec<i64> {
    MIGRATOR.iter().map(|m| m.version).collect()
}
