//! Unified error handling with Sentry integration.
//!
//! Every service error maps onto an [`ErrorKind`], which fixes the HTTP
//! status, plus a stable machine-readable `code`. Handlers return
//! `Result<T, AppError>`; responses are always `{"error": ..., "code": ...}`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;
use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::notifications::NotificationError;
use crate::services::orders::OrderError;
use crate::services::products::ProductError;
use crate::services::reviews::ReviewError;
use crate::services::search::SearchError;
use crate::services::users::UserError;

/// Error categories, each tied to exactly one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    Unauthenticated,
    RateLimited,
    UpstreamUnavailable,
    Timeout,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Conflict => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Generic code used when an error has nothing more specific.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Conflict => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::RateLimited => "RATE_LIMITED",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }

    /// Failures on our side: logged, captured, and never detailed to clients.
    #[must_use]
    pub const fn is_server_side(self) -> bool {
        matches!(self, Self::UpstreamUnavailable | Self::Internal)
    }
}

/// Classification shared by every service error type.
pub trait DomainError: std::error::Error {
    fn kind(&self) -> ErrorKind;

    fn code(&self) -> &'static str {
        self.kind().code()
    }
}

impl DomainError for RepositoryError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            e if e.is_unavailable() => ErrorKind::UpstreamUnavailable,
            _ => ErrorKind::Internal,
        }
    }
}

impl DomainError for CacheError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Redis(_) | Self::Timeout => ErrorKind::UpstreamUnavailable,
            Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Product(#[from] ProductError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Malformed request (body, query string, path).
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn domain(&self) -> Option<&dyn DomainError> {
        Some(match self {
            Self::Auth(e) => e,
            Self::User(e) => e,
            Self::Product(e) => e,
            Self::Review(e) => e,
            Self::Search(e) => e,
            Self::Cart(e) => e,
            Self::Order(e) => e,
            Self::Notification(e) => e,
            Self::Database(e) => e,
            Self::Cache(e) => e,
            Self::BadRequest(_) | Self::Unauthenticated(_) | Self::Internal(_) => return None,
        })
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::Validation,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Internal(_) => ErrorKind::Internal,
            other => other.domain().map_or(ErrorKind::Internal, DomainError::kind),
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_REQUEST",
            other => other.domain().map_or_else(|| other.kind().code(), DomainError::code),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: &'a str,
}

/// Build the standard JSON error response.
#[must_use]
pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message,
            code,
        }),
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();

        // Don't expose internal error details to clients
        let message = if kind.is_server_side() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
            match kind {
                ErrorKind::UpstreamUnavailable => "Service temporarily unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        error_response(kind.status(), self.code(), &message)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the current request scope.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_every_kind_has_one_status() {
        let kinds = [
            (ErrorKind::Validation, 400),
            (ErrorKind::Unauthenticated, 401),
            (ErrorKind::Forbidden, 403),
            (ErrorKind::NotFound, 404),
            (ErrorKind::Conflict, 409),
            (ErrorKind::RateLimited, 429),
            (ErrorKind::Internal, 500),
            (ErrorKind::UpstreamUnavailable, 503),
            (ErrorKind::Timeout, 504),
        ];
        for (kind, status) in kinds {
            assert_eq!(kind.status().as_u16(), status, "{kind:?}");
        }
    }

    #[test]
    fn test_repository_error_classification() {
        assert_eq!(RepositoryError::NotFound.kind(), ErrorKind::NotFound);
        assert_eq!(
            RepositoryError::Conflict("x".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            RepositoryError::Database(sqlx::Error::PoolTimedOut).kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(
            RepositoryError::DataCorruption("bad".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[tokio::test]
    async fn test_body_shape() {
        let response = AppError::from(OrderError::InsufficientStock {
            product_id: greens_core::ProductId::new(7),
            available: 2,
            requested: 3,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INSUFFICIENT_STOCK");
        assert!(body["error"].as_str().unwrap().contains("7"));
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response = AppError::Internal("connection string leaked".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INTERNAL");
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_unavailable_store_is_503() {
        let response =
            AppError::Database(RepositoryError::Database(sqlx::Error::PoolClosed)).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["code"], "UPSTREAM_UNAVAILABLE");
    }
}
