//! Database migration command.
//!
//! Migrations live in `crates/server/migrations/` and are embedded at
//! compile time.

use greens_server::config::AppConfig;

use super::{CommandError, connect};

/// Apply all pending migrations.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a migration fails.
pub async fn run(config: &AppConfig) -> Result<(), CommandError> {
    tracing::info!("Connecting to database...");
    let pool = connect(config).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    pool.close().await;
    Ok(())
}
