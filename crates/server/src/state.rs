//! Application state shared across handlers.

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::cache::CacheStore;
use crate::config::{AppConfig, RateLimitBackendKind};
use crate::embeddings::{EmbeddingClient, EmbeddingError};
use crate::middleware::rate_limit::RateLimiter;
use crate::services::auth::TokenKeys;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and is immutable once built.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    pool: PgPool,
    cache: CacheStore,
    keys: TokenKeys,
    embedder: Option<EmbeddingClient>,
    rate_limiter: RateLimiter,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The embedding client is only built when a provider is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding client cannot be constructed.
    pub fn new(config: AppConfig, pool: PgPool, cache: CacheStore) -> Result<Self, EmbeddingError> {
        let keys = TokenKeys::new(&config.jwt);
        let embedder = config
            .embedding
            .as_ref()
            .map(EmbeddingClient::new)
            .transpose()?;
        let rate_limiter = match config.rate_limit.backend {
            RateLimitBackendKind::Redis => RateLimiter::redis(cache.clone(), &config.rate_limit),
            RateLimitBackendKind::Memory => RateLimiter::memory(&config.rate_limit),
        };

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                cache,
                keys,
                embedder,
                rate_limiter,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the Redis cache store.
    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    /// JWT signing and verification keys.
    #[must_use]
    pub fn keys(&self) -> &TokenKeys {
        &self.inner.keys
    }

    /// The embedding provider, if one is configured.
    #[must_use]
    pub fn embedder(&self) -> Option<&EmbeddingClient> {
        self.inner.embedder.as_ref()
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }
}

impl FromRef<AppState> for TokenKeys {
    fn from_ref(state: &AppState) -> Self {
        state.inner.keys.clone()
    }
}

impl FromRef<AppState> for RateLimiter {
    fn from_ref(state: &AppState) -> Self {
        state.inner.rate_limiter.clone()
    }
}
