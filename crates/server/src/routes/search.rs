//! Keyword and semantic search.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use greens_core::Pagination;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Page;
use crate::models::product::{ProductFilters, RankedProduct, SemanticQuery, SemanticResults};
use crate::routes::extract::{ApiJson, ApiQuery};
use crate::services::search::SearchService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct KeywordQuery {
    #[serde(default)]
    pub q: String,
}

/// `GET /search?q=...` with the product listing filters.
#[instrument(skip(state, filters, pagination), fields(user_id = %user.id))]
pub async fn keyword(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiQuery(query): ApiQuery<KeywordQuery>,
    ApiQuery(filters): ApiQuery<ProductFilters>,
    ApiQuery(pagination): ApiQuery<Pagination>,
) -> Result<Json<Page<RankedProduct>>> {
    let page = SearchService::new(state.pool(), state.embedder())
        .keyword(user.id, &query.q, &filters, pagination.normalized())
        .await?;
    Ok(Json(page))
}

/// `POST /search/semantic`. Answers from keyword search when the embedding
/// provider is unavailable; `mode` tells which.
pub async fn semantic(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(request): ApiJson<SemanticQuery>,
) -> Result<Json<SemanticResults>> {
    let results = SearchService::new(state.pool(), state.embedder())
        .semantic(user.id, &request)
        .await?;
    Ok(Json(results))
}

/// Bearer-only routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", get(keyword))
        .route("/search/semantic", post(semantic))
}
