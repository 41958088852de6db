//! Catalog endpoints: products, reviews, similar items and categories.
//!
//! ```text
//! GET    /categories              - Active categories (public)
//! GET    /products                - Filtered listing (public)
//! GET    /products/{id}           - Detail, counts a view (public)
//! GET    /products/{id}/reviews   - Reviews, newest first (public)
//! GET    /products/{id}/similar   - Nearest neighbours (public)
//! POST   /products                - Create a listing
//! PUT    /products/{id}           - Update own listing
//! DELETE /products/{id}           - Soft delete own listing
//! POST   /products/{id}/reviews   - Review a product
//! ```

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use greens_core::{Pagination, ProductId};

use crate::error::Result;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::Page;
use crate::models::category::Category;
use crate::models::product::{NewProduct, Product, ProductFilters, ProductPatch, ScoredProduct};
use crate::models::review::{NewReview, Review};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::products::ProductService;
use crate::services::reviews::ReviewService;
use crate::services::search::SearchService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub limit: Option<u32>,
}

fn service(state: &AppState) -> ProductService<'_> {
    ProductService::new(state.pool(), state.cache(), state.embedder())
}

pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(service(&state).categories().await?))
}

#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(filters): ApiQuery<ProductFilters>,
    ApiQuery(pagination): ApiQuery<Pagination>,
) -> Result<Json<Page<Product>>> {
    let page = service(&state)
        .list(&filters, pagination.normalized())
        .await?;
    Ok(Json(page))
}

pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(viewer): OptionalAuth,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<Product>> {
    let product = service(&state).get(id, viewer.map(|u| u.id)).await?;
    Ok(Json(product))
}

pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(input): ApiJson<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = service(&state).create(user.id, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> Result<Json<Product>> {
    Ok(Json(service(&state).update(user.id, id, patch).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<StatusCode> {
    service(&state).delete(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reviews(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
    ApiQuery(pagination): ApiQuery<Pagination>,
) -> Result<Json<Page<Review>>> {
    let page = ReviewService::new(state.pool())
        .list(id, pagination.normalized())
        .await?;
    Ok(Json(page))
}

pub async fn create_review(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(input): ApiJson<NewReview>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = ReviewService::new(state.pool())
        .create(user.id, id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn similar(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
    ApiQuery(query): ApiQuery<SimilarQuery>,
) -> Result<Json<Vec<ScoredProduct>>> {
    let items = SearchService::new(state.pool(), state.embedder())
        .similar(id, query.limit)
        .await?;
    Ok(Json(items))
}

/// Routes readable without a token.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(categories))
        .route("/products", get(list))
        .route("/products/{id}", get(show))
        .route("/products/{id}/reviews", get(reviews))
        .route("/products/{id}/similar", get(similar))
}

/// Bearer-only routes; merged with [`public_router`] on shared paths.
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/products", post(create))
        .route("/products/{id}", axum::routing::put(update).delete(delete))
        .route("/products/{id}/reviews", post(create_review))
}
