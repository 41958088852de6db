//! Account registration and token endpoints.
//!
//! ```text
//! POST /auth/register  - Create an account
//! POST /auth/login     - Exchange credentials for a token pair
//! POST /auth/refresh   - Rotate a refresh token
//! POST /auth/logout    - Revoke a refresh token
//! ```

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::models::user::User;
use crate::routes::extract::ApiJson;
use crate::services::auth::{AuthService, TokenPair};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Login accepts either an email or a username as the identifier.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "username")]
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

fn service(state: &AppState) -> AuthService<'_> {
    AuthService::new(state.pool(), state.cache(), state.keys())
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = service(&state)
        .register(&request.email, &request.username, &request.password)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (user, tokens) = service(&state)
        .login(&request.identifier, &request.password)
        .await?;
    Ok(Json(LoginResponse { user, tokens }))
}

#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Json<TokenPair>> {
    let tokens = service(&state).refresh(&request.refresh_token).await?;
    Ok(Json(tokens))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<StatusCode> {
    service(&state).logout(&request.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_login_accepts_email_or_username_field() {
        let by_email: LoginRequest =
            serde_json::from_str(r#"{"email":"alice@example.com","password":"pw"}"#).unwrap();
        assert_eq!(by_email.identifier, "alice@example.com");

        let by_name: LoginRequest =
            serde_json::from_str(r#"{"username":"alice","password":"pw"}"#).unwrap();
        assert_eq!(by_name.identifier, "alice");
    }
}
