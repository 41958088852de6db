//! JSON body for requests whose handler panicked.

use std::any::Any;

use axum::response::Response;

use crate::error::{ErrorKind, error_response};

/// Response factory for `tower_http::catch_panic::CatchPanicLayer::custom`.
///
/// The panic payload is logged (and captured by the Sentry tracing layer),
/// never returned to the client.
#[allow(clippy::needless_pass_by_value)]
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");

    tracing::error!(panic = detail, "Handler panicked");

    let kind = ErrorKind::Internal;
    error_response(kind.status(), kind.code(), "Internal server error")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Router, body::Body, http::Request, http::StatusCode, routing::get};
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;

    use super::*;

    #[tokio::test]
    async fn test_panic_becomes_json_500() {
        async fn boom() -> &'static str {
            panic!("kaboom")
        }

        let app = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(panic_response));

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "INTERNAL");
        assert_eq!(json["error"], "Internal server error");
    }
}
