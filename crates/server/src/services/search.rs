//! Keyword and vector search over listed products.
//!
//! Semantic search degrades to keyword search when the embedding provider is
//! missing, slow, or failing; the response says which mode answered.

use sqlx::PgPool;
use thiserror::Error;
use tracing::{instrument, warn};

use greens_core::{Pagination, ProductId, UserId};

use crate::db::embeddings;
use crate::db::{PreferencesRepository, ProductRepository, RepositoryError};
use crate::embeddings::EmbeddingClient;
use crate::error::{DomainError, ErrorKind};
use crate::models::Page;
use crate::models::product::{
    ProductFilters, RankedProduct, ScoredProduct, SearchHit, SearchMode, SemanticQuery,
    SemanticResults,
};
use crate::services::products::validate_filters;

pub const MAX_QUERY_LENGTH: usize = 500;
const DEFAULT_SIMILAR_LIMIT: u32 = 10;
const MAX_SIMILAR_LIMIT: u32 = 50;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search query cannot be empty")]
    EmptyQuery,

    #[error("search query must be at most {MAX_QUERY_LENGTH} characters")]
    QueryTooLong,

    #[error("{0}")]
    Validation(String),

    #[error("product not found")]
    ProductNotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DomainError for SearchError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuery | Self::QueryTooLong | Self::Validation(_) => ErrorKind::Validation,
            Self::ProductNotFound => ErrorKind::NotFound,
            Self::Repository(e) => e.kind(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "EMPTY_QUERY",
            Self::QueryTooLong => "QUERY_TOO_LONG",
            Self::ProductNotFound => "PRODUCT_NOT_FOUND",
            other => other.kind().code(),
        }
    }
}

pub struct SearchService<'a> {
    pool: &'a PgPool,
    products: ProductRepository<'a>,
    preferences: PreferencesRepository<'a>,
    embedder: Option<&'a EmbeddingClient>,
}

impl<'a> SearchService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, embedder: Option<&'a EmbeddingClient>) -> Self {
        Self {
            pool,
            products: ProductRepository::new(pool),
            preferences: PreferencesRepository::new(pool),
            embedder,
        }
    }

    /// Full-text search, recorded in the caller's search history.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::EmptyQuery` for a blank query.
    #[instrument(skip(self, filters))]
    pub async fn keyword(
        &self,
        user: UserId,
        query: &str,
        filters: &ProductFilters,
        pagination: Pagination,
    ) -> Result<Page<RankedProduct>, SearchError> {
        let query = normalize_query(query)?;
        validate_filters(filters).map_err(|e| SearchError::Validation(e.to_string()))?;

        let (items, total) = self
            .products
            .keyword_search(query, filters, pagination)
            .await?;
        self.remember(user, query).await;

        Ok(Page::new(items, pagination, total))
    }

    /// Vector search by cosine similarity, falling back to keyword search.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::EmptyQuery` for a blank query, or a repository
    /// error if the database fails.
    #[instrument(skip(self, request), fields(query = %request.query))]
    pub async fn semantic(
        &self,
        user: UserId,
        request: &SemanticQuery,
    ) -> Result<SemanticResults, SearchError> {
        let query = normalize_query(&request.query)?;
        let limit = request
            .limit
            .unwrap_or(Pagination::DEFAULT_LIMIT)
            .clamp(1, Pagination::MAX_LIMIT);
        let offset = request.offset.unwrap_or(0);

        let embedding = match self.embedder {
            Some(client) => match client.embed(query).await {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    warn!(error = %e, "Embedding provider failed; using keyword search");
                    None
                }
            },
            None => None,
        };

        let results = if let Some(embedding) = embedding {
            let hits: Vec<ScoredProduct> = embeddings::search(
                self.pool,
                &embedding,
                request.category_id,
                i64::from(limit),
                i64::from(offset),
            )
            .await?;
            SemanticResults {
                mode: SearchMode::Semantic,
                items: hits.into_iter().map(SearchHit::from).collect(),
                limit,
                offset,
            }
        } else {
            let filters = ProductFilters {
                category_id: request.category_id,
                ..ProductFilters::default()
            };
            let hits = self
                .products
                .keyword_window(query, &filters, i64::from(limit), i64::from(offset))
                .await?;
            SemanticResults {
                mode: SearchMode::KeywordFallback,
                items: hits.into_iter().map(SearchHit::from).collect(),
                limit,
                offset,
            }
        };

        self.remember(user, query).await;
        Ok(results)
    }

    /// Nearest neighbours of a product's stored embedding.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::ProductNotFound` for unknown or deleted products.
    pub async fn similar(
        &self,
        product: ProductId,
        limit: Option<u32>,
    ) -> Result<Vec<ScoredProduct>, SearchError> {
        if self.products.get(product).await?.is_none() {
            return Err(SearchError::ProductNotFound);
        }
        let limit = limit
            .unwrap_or(DEFAULT_SIMILAR_LIMIT)
            .clamp(1, MAX_SIMILAR_LIMIT);
        Ok(embeddings::similar(self.pool, product, i64::from(limit)).await?)
    }

    async fn remember(&self, user: UserId, query: &str) {
        if let Err(e) = self.preferences.record_search(user, query).await {
            warn!(error = %e, user_id = %user, "Failed to record search history");
        }
    }
}

fn normalize_query(query: &str) -> Result<&str, SearchError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(SearchError::QueryTooLong);
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_queries_rejected() {
        assert!(matches!(normalize_query(""), Err(SearchError::EmptyQuery)));
        assert!(matches!(normalize_query("   \t"), Err(SearchError::EmptyQuery)));
        assert_eq!(normalize_query("  kale ").ok(), Some("kale"));
    }

    #[test]
    fn test_long_query_rejected() {
        let long = "k".repeat(MAX_QUERY_LENGTH + 1);
        assert!(matches!(normalize_query(&long), Err(SearchError::QueryTooLong)));
    }

    #[test]
    fn test_empty_query_is_validation() {
        assert_eq!(SearchError::EmptyQuery.kind(), ErrorKind::Validation);
        assert_eq!(SearchError::EmptyQuery.code(), "EMPTY_QUERY");
    }
}
