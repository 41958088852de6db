//! Product embedding storage and pgvector similarity queries.
//!
//! Vectors are bound as text literals and cast with `::vector`, since sqlx has
//! no built-in pgvector type. Similarity is `1 - cosine distance` (`<=>`).

use sqlx::PgPool;
use tracing::{debug, instrument};

use greens_core::{CategoryId, ProductId};

use super::products::{PRODUCT_COLUMNS, ProductRow};
use super::{RepositoryError, format_embedding};
use crate::models::product::ScoredProduct;

/// The three vectors stored per product.
#[derive(Debug, Clone)]
pub struct ProductVectors {
    pub title: Vec<f32>,
    pub description: Vec<f32>,
    pub combined: Vec<f32>,
}

#[derive(Debug, sqlx::FromRow)]
struct ScoredRow {
    #[sqlx(flatten)]
    product: ProductRow,
    similarity: f64,
}

impl TryFrom<ScoredRow> for ScoredProduct {
    type Error = RepositoryError;

    fn try_from(row: ScoredRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product: row.product.try_into()?,
            similarity: row.similarity,
        })
    }
}

/// Writes nothing unless the product row exists and is not deleted.
const UPSERT: &str = "INSERT INTO marketplace.product_embedding \
         (product_id, title_embedding, description_embedding, combined_embedding, model) \
     SELECT p.id, $2::vector, $3::vector, $4::vector, $5 \
     FROM marketplace.product p \
     WHERE p.id = $1 AND p.deleted_at IS NULL \
     ON CONFLICT (product_id) DO UPDATE SET \
         title_embedding = EXCLUDED.title_embedding, \
         description_embedding = EXCLUDED.description_embedding, \
         combined_embedding = EXCLUDED.combined_embedding, \
         model = EXCLUDED.model, \
         updated_at = NOW()";

/// Insert or replace a product's embedding row.
///
/// Returns `false` when the product was deleted before the write landed, so
/// a late background refresh cannot resurrect its embedding.
///
/// # Errors
///
/// Returns error if the database write fails.
#[instrument(skip(pool, vectors), fields(product = %product))]
pub async fn upsert(
    pool: &PgPool,
    product: ProductId,
    model: &str,
    vectors: &ProductVectors,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(UPSERT)
        .bind(product)
        .bind(format_embedding(&vectors.title))
        .bind(format_embedding(&vectors.description))
        .bind(format_embedding(&vectors.combined))
        .bind(model)
        .execute(pool)
        .await?;

    let stored = result.rows_affected() > 0;
    if stored {
        debug!("Stored product embedding");
    } else {
        debug!("Product gone, embedding discarded");
    }
    Ok(stored)
}

/// Rank listed products by cosine similarity to `embedding`.
///
/// Products without an embedding row never match.
///
/// # Errors
///
/// Returns error if the database query fails.
#[instrument(skip(pool, embedding))]
pub async fn search(
    pool: &PgPool,
    embedding: &[f32],
    category: Option<CategoryId>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ScoredProduct>, RepositoryError> {
    let rows = sqlx::query_as::<_, ScoredRow>(&format!(
        "SELECT {PRODUCT_COLUMNS}, \
             1 - (e.combined_embedding <=> $1::vector) AS similarity \
         FROM marketplace.product_embedding e \
         JOIN marketplace.product p ON p.id = e.product_id \
         WHERE p.is_active AND p.deleted_at IS NULL \
           AND ($2::INTEGER IS NULL OR p.category_id = $2) \
         ORDER BY e.combined_embedding <=> $1::vector \
         LIMIT $3 OFFSET $4"
    ))
    .bind(format_embedding(embedding))
    .bind(category)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ScoredProduct::try_from).collect()
}

/// Nearest listed neighbours of a product's own stored embedding.
///
/// Returns an empty list when the product has no embedding.
///
/// # Errors
///
/// Returns error if the database query fails.
#[instrument(skip(pool))]
pub async fn similar(
    pool: &PgPool,
    product: ProductId,
    limit: i64,
) -> Result<Vec<ScoredProduct>, RepositoryError> {
    let rows = sqlx::query_as::<_, ScoredRow>(&format!(
        "SELECT {PRODUCT_COLUMNS}, \
             1 - (e.combined_embedding <=> src.combined_embedding) AS similarity \
         FROM marketplace.product_embedding src \
         JOIN marketplace.product_embedding e ON e.product_id <> src.product_id \
         JOIN marketplace.product p ON p.id = e.product_id \
         WHERE src.product_id = $1 \
           AND p.is_active AND p.deleted_at IS NULL \
         ORDER BY e.combined_embedding <=> src.combined_embedding \
         LIMIT $2"
    ))
    .bind(product)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ScoredProduct::try_from).collect()
}

/// A listed product with no embedding row yet.
#[derive(Debug, sqlx::FromRow)]
pub struct MissingEmbedding {
    pub id: ProductId,
    pub title: String,
    pub description: String,
}

/// Listed products lacking an embedding, oldest first.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn missing(pool: &PgPool, limit: i64) -> Result<Vec<MissingEmbedding>, RepositoryError> {
    let rows = sqlx::query_as::<_, MissingEmbedding>(
        "SELECT p.id, p.title, p.description \
         FROM marketplace.product p \
         LEFT JOIN marketplace.product_embedding e ON e.product_id = p.id \
         WHERE e.product_id IS NULL AND p.is_active AND p.deleted_at IS NULL \
         ORDER BY p.id \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_only_targets_live_products() {
        assert!(UPSERT.contains("FROM marketplace.product p"));
        assert!(UPSERT.contains("WHERE p.id = $1 AND p.deleted_at IS NULL"));
        assert!(!UPSERT.contains("VALUES"));
    }
}
