//! Order placement, fulfilment and payment.
//!
//! ```text
//! GET  /orders?role=buyer|seller  - Orders the caller bought or sold
//! POST /orders                    - Place an order
//! GET  /orders/{id}               - One order (buyer or seller)
//! PUT  /orders/{id}/status        - Advance or cancel
//! POST /orders/{id}/payment       - Pay the full total
//! ```

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;
use tracing::instrument;

use greens_core::{OrderId, Pagination};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Page;
use crate::models::order::{NewOrder, Order, OrderRole, PaymentRequest, StatusChange};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::orders::OrderService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    #[serde(default)]
    pub role: OrderRole,
}

#[instrument(skip(state, request), fields(buyer_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(request): ApiJson<NewOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = OrderService::new(state.pool())
        .create(user.id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiQuery(query): ApiQuery<RoleQuery>,
    ApiQuery(pagination): ApiQuery<Pagination>,
) -> Result<Json<Page<Order>>> {
    let page = OrderService::new(state.pool())
        .list(user.id, query.role, pagination.normalized())
        .await?;
    Ok(Json(page))
}

pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(OrderService::new(state.pool()).get(user.id, id).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(change): ApiJson<StatusChange>,
) -> Result<Json<Order>> {
    let order = OrderService::new(state.pool())
        .update_status(user.id, id, change.status)
        .await?;
    Ok(Json(order))
}

pub async fn pay(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(payment): ApiJson<PaymentRequest>,
) -> Result<Json<Order>> {
    let order = OrderService::new(state.pool())
        .process_payment(user.id, id, &payment)
        .await?;
    Ok(Json(order))
}

/// Bearer-only routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list).post(create))
        .route("/orders/{id}", get(show))
        .route("/orders/{id}/status", put(update_status))
        .route("/orders/{id}/payment", post(pay))
}
