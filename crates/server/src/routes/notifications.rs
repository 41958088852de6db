//! The caller's in-app notifications.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, put},
};
use serde::{Deserialize, Serialize};

use greens_core::{NotificationId, Pagination};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::notification::{Notification, NotificationList};
use crate::routes::extract::{ApiPath, ApiQuery};
use crate::services::notifications::NotificationService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiQuery(query): ApiQuery<ListQuery>,
    ApiQuery(pagination): ApiQuery<Pagination>,
) -> Result<Json<NotificationList>> {
    let list = NotificationService::new(state.pool())
        .list(user.id, query.unread_only, pagination.normalized())
        .await?;
    Ok(Json(list))
}

pub async fn mark_read(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<NotificationId>,
) -> Result<Json<Notification>> {
    let notification = NotificationService::new(state.pool())
        .mark_read(user.id, id)
        .await?;
    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<MarkedRead>> {
    let updated = NotificationService::new(state.pool())
        .mark_all_read(user.id)
        .await?;
    Ok(Json(MarkedRead { updated }))
}

pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<NotificationId>,
) -> Result<StatusCode> {
    NotificationService::new(state.pool())
        .delete(user.id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Bearer-only routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/{id}/read", put(mark_read))
        .route("/notifications/{id}", delete(remove))
}
