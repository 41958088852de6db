//! Per-request deadline.
//!
//! The inner future is dropped when the deadline passes, so an in-flight
//! handler stops at its next await point.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::{ErrorKind, error_response};

/// Answer 504 `TIMEOUT` if the rest of the stack takes longer than the limit.
pub async fn timeout_middleware(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    if let Ok(response) = tokio::time::timeout(limit, next.run(request)).await {
        response
    } else {
        warn!(%method, %path, timeout_ms = limit.as_millis(), "Request timed out");
        let kind = ErrorKind::Timeout;
        error_response(kind.status(), kind.code(), "Request timed out")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Router, body::Body, http::Request as HttpRequest, http::StatusCode, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        Router::new()
            .route("/fast", get(|| async { "ok" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                Duration::from_millis(50),
                timeout_middleware,
            ))
    }

    async fn get_status(path: &str) -> StatusCode {
        app()
            .oneshot(HttpRequest::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_slow_handler_times_out() {
        assert_eq!(get_status("/slow").await, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_fast_handler_passes() {
        assert_eq!(get_status("/fast").await, StatusCode::OK);
    }
}
