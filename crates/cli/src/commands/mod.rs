//! Subcommand implementations.

pub mod embeddings;
pub mod migrate;

use thiserror::Error;

use greens_server::config::ConfigError;
use greens_server::db::RepositoryError;
use greens_server::embeddings::EmbeddingError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Embedding provider error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("No embedding provider configured (set OPENAI_API_KEY)")]
    NoEmbeddingProvider,
}

/// Connect a small pool for one-off commands.
pub(crate) async fn connect(
    config: &greens_server::config::AppConfig,
) -> Result<sqlx::PgPool, CommandError> {
    let options = config.database.connect_options()?;
    Ok(greens_server::db::create_pool(options, 2).await?)
}
