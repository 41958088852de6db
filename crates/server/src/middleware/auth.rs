//! Bearer-token authentication middleware and extractors.
//!
//! Protected routers are wrapped in [`require_auth`] via `route_layer`, which
//! verifies the access token and stores an [`AuthUser`] extension. Handlers
//! read it with [`RequireAuth`]. Public routes that personalise their
//! response use [`OptionalAuth`], which never rejects.

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use greens_core::UserId;

use crate::error::{AppError, set_sentry_user};
use crate::services::auth::{TokenKeys, TokenType};

/// The authenticated caller of the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
}

/// Verify `Authorization: Bearer <access token>` or reject with 401.
///
/// Refresh tokens are not accepted here.
pub async fn require_auth(
    State(keys): State<TokenKeys>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&keys, request.headers()) {
        Ok(user) => {
            set_sentry_user(&user.id);
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn authenticate(keys: &TokenKeys, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthenticated("Missing bearer token".to_string()))?;

    let claims = keys
        .verify(token, TokenType::Access)
        .map_err(|_| AppError::Unauthenticated("Invalid or expired token".to_string()))?;

    Ok(AuthUser { id: claims.sub })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Extractor for the caller verified by [`require_auth`].
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(user): RequireAuth) -> String {
///     format!("Hello, {}!", user.id)
/// }
/// ```
pub struct RequireAuth(pub AuthUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .map(Self)
            .ok_or_else(|| AppError::Unauthenticated("Authentication required".to_string()))
    }
}

/// Extractor that optionally gets the current caller.
///
/// A missing, malformed or expired token is treated as anonymous.
pub struct OptionalAuth(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
    TokenKeys: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(Self(Some(*user)));
        }
        let keys = TokenKeys::from_ref(state);
        Ok(Self(authenticate(&keys, &parts.headers).ok()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use axum::{Router, body::Body, http::Request as HttpRequest, http::StatusCode, routing::get};
    use secrecy::SecretString;
    use tower::ServiceExt;

    use super::*;
    use crate::config::JwtConfig;

    fn keys() -> TokenKeys {
        TokenKeys::new(&JwtConfig {
            secret: SecretString::from("0123456789abcdef0123456789abcdef"),
            access_ttl: Duration::from_secs(3600),
            refresh_ttl: Duration::from_secs(7200),
        })
    }

    fn app(keys: TokenKeys) -> Router {
        Router::new()
            .route(
                "/me",
                get(|RequireAuth(user): RequireAuth| async move { user.id.to_string() }),
            )
            .route_layer(axum::middleware::from_fn_with_state(keys, require_auth))
    }

    async fn status_with(auth: Option<String>) -> StatusCode {
        let mut builder = HttpRequest::builder().uri("/me");
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        app(keys())
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthenticated() {
        assert_eq!(status_with(None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_with(Some("Basic abc".into())).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_access_token_passes() {
        let pair = keys().issue_pair(UserId::new(42)).unwrap();
        let status = status_with(Some(format!("Bearer {}", pair.access_token))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_token_is_rejected() {
        let pair = keys().issue_pair(UserId::new(42)).unwrap();
        let status = status_with(Some(format!("Bearer {}", pair.refresh_token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_rejection_body_code() {
        let response = app(keys())
            .oneshot(
                HttpRequest::builder()
                    .uri("/me")
                    .header(AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "UNAUTHENTICATED");
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}
