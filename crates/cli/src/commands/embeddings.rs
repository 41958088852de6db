//! Embedding backfill for products listed before a provider was configured
//! or whose background embedding failed.

use greens_server::config::AppConfig;
use greens_server::db::embeddings;
use greens_server::embeddings::EmbeddingClient;
use greens_server::services::products::embed_product;

use super::{CommandError, connect};

/// Embed up to `limit` listed products lacking an embedding, one provider
/// call per product. Individual failures are logged and skipped.
///
/// # Errors
///
/// Returns `CommandError` if no provider is configured or the database fails.
pub async fn backfill(config: &AppConfig, limit: u32) -> Result<(), CommandError> {
    let provider = config
        .embedding
        .as_ref()
        .ok_or(CommandError::NoEmbeddingProvider)?;
    let client = EmbeddingClient::new(provider)?;
    let pool = connect(config).await?;

    let pending = embeddings::missing(&pool, i64::from(limit)).await?;
    tracing::info!(count = pending.len(), model = client.model(), "Backfilling embeddings");

    let mut embedded = 0_usize;
    let mut failed = 0_usize;
    for product in &pending {
        match embed_product(&pool, &client, product.id, &product.title, &product.description).await
        {
            Ok(()) => embedded += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(product_id = %product.id, error = %e, "Failed to embed product");
            }
        }
    }

    tracing::info!(embedded, failed, "Backfill complete");
    pool.close().await;
    Ok(())
}
