//! Cart and wishlist endpoints for the caller.
//!
//! ```text
//! GET    /cart                   - Cart at current prices
//! POST   /cart                   - Add a product (merges quantities)
//! PUT    /cart/{product_id}      - Set quantity, below 1 removes
//! DELETE /cart/{product_id}      - Remove a line
//! GET    /wishlist               - Wishlist entries
//! POST   /wishlist/{product_id}  - Add (idempotent)
//! DELETE /wishlist/{product_id}  - Remove
//! ```

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use greens_core::ProductId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::cart::{Cart, WishlistEntry};
use crate::routes::extract::{ApiJson, ApiPath};
use crate::services::cart::CartService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddToCart {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: i32,
}

const fn one() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct SetQuantity {
    pub quantity: i32,
}

pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Cart>> {
    Ok(Json(CartService::new(state.pool()).get(user.id).await?))
}

pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(request): ApiJson<AddToCart>,
) -> Result<Json<Cart>> {
    let cart = CartService::new(state.pool())
        .add(user.id, request.product_id, request.quantity)
        .await?;
    Ok(Json(cart))
}

pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(product): ApiPath<ProductId>,
    ApiJson(request): ApiJson<SetQuantity>,
) -> Result<Json<Cart>> {
    let cart = CartService::new(state.pool())
        .update(user.id, product, request.quantity)
        .await?;
    Ok(Json(cart))
}

pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(product): ApiPath<ProductId>,
) -> Result<StatusCode> {
    CartService::new(state.pool()).remove(user.id, product).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn wishlist(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<WishlistEntry>>> {
    Ok(Json(CartService::new(state.pool()).wishlist(user.id).await?))
}

pub async fn wishlist_add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(product): ApiPath<ProductId>,
) -> Result<StatusCode> {
    CartService::new(state.pool())
        .wishlist_add(user.id, product)
        .await?;
    Ok(StatusCode::CREATED)
}

pub async fn wishlist_remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(product): ApiPath<ProductId>,
) -> Result<StatusCode> {
    CartService::new(state.pool())
        .wishlist_remove(user.id, product)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Bearer-only routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cart", get(show).post(add))
        .route("/cart/{product_id}", axum::routing::put(update).delete(remove))
        .route("/wishlist", get(wishlist))
        .route(
            "/wishlist/{product_id}",
            post(wishlist_add).delete(wishlist_remove),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_add_defaults_to_one() {
        let request: AddToCart = serde_json::from_str(r#"{"product_id": 3}"#).unwrap();
        assert_eq!(request.product_id, ProductId::new(3));
        assert_eq!(request.quantity, 1);
    }
}
