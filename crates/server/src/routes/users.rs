//! Profile and preference endpoints for the caller.

use axum::{Json, Router, extract::State, routing::get};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::user::{PreferencesUpdate, ProfileUpdate, User, UserPreferences};
use crate::routes::extract::ApiJson;
use crate::services::users::UserService;
use crate::state::AppState;

pub async fn profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<User>> {
    Ok(Json(UserService::new(state.pool()).profile(user.id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Json<User>> {
    let user = UserService::new(state.pool())
        .update_profile(user.id, &update)
        .await?;
    Ok(Json(user))
}

pub async fn preferences(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<UserPreferences>> {
    Ok(Json(
        UserService::new(state.pool()).preferences(user.id).await?,
    ))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(update): ApiJson<PreferencesUpdate>,
) -> Result<Json<UserPreferences>> {
    let preferences = UserService::new(state.pool())
        .update_preferences(user.id, &update)
        .await?;
    Ok(Json(preferences))
}

/// Bearer-only routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(profile).put(update_profile))
        .route(
            "/users/preferences",
            get(preferences).put(update_preferences),
        )
}
