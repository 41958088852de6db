//! HTTP routes and the middleware stack.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health, /health/ready       - Health checks (no rate limit, no auth)
//!
//! /api/v1 (rate limited)
//!   /auth/*                         - Registration and tokens
//!   /categories, /products/*        - Catalog (reads public)
//!   /users/*                        - Profile and preferences
//!   /search, /search/semantic       - Search
//!   /cart/*, /wishlist/*            - Cart and wishlist
//!   /orders/*                       - Orders and payment
//!   /notifications/*                - Notifications
//! ```

pub mod auth;
pub mod cart;
pub mod extract;
pub mod health;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod search;
pub mod users;

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK},
    },
    middleware::{from_fn, from_fn_with_state},
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

use crate::config::{AppConfig, CorsConfig};
use crate::middleware::{
    ClientIp, RequestId, client_ip_middleware, panic_response, rate_limit_middleware,
    request_id_middleware, require_auth, timeout_middleware,
};
use crate::state::AppState;

const CORS_MAX_AGE: Duration = Duration::from_secs(300);

/// Build the complete application.
pub fn app(state: AppState) -> Router {
    let config = state.config().clone();

    let api = Router::new()
        .nest("/api/v1", api_routes(&state))
        .layer(from_fn_with_state(
            state.rate_limiter().clone(),
            rate_limit_middleware,
        ));

    let router = Router::new()
        .merge(health::router())
        .merge(api)
        .with_state(state);

    with_middleware(router, &config)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Everything under `/api/v1`. Protected routers get bearer auth through
/// `route_layer`, so unmatched paths still answer 404 instead of 401.
fn api_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .merge(auth::router())
        .merge(products::public_router());

    let protected = Router::new()
        .merge(products::protected_router())
        .merge(users::router())
        .merge(search::router())
        .merge(cart::router())
        .merge(orders::router())
        .merge(notifications::router())
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    public.merge(protected)
}

/// Apply the shared stack, outermost first: request ID, client IP, access
/// log, panic recovery, timeout, CORS.
pub fn with_middleware(router: Router, config: &AppConfig) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(from_fn(request_id_middleware))
            .layer(from_fn(client_ip_middleware))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(make_span)
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(from_fn_with_state(
                config.server.request_timeout,
                timeout_middleware,
            ))
            .layer(cors_layer(&config.cors)),
    )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map_or("-", |id| id.0.as_str());
    let client_ip = request
        .extensions()
        .get::<ClientIp>()
        .map(ToString::to_string)
        .unwrap_or_default();

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
        client_ip = %client_ip,
    )
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([LINK])
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        http::{StatusCode, header},
        routing::get,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::REQUEST_ID_HEADER;

    fn config() -> AppConfig {
        AppConfig::from_yaml_with_env(
            "cors:\n  allowed_origins: [\"http://localhost:3000\"]\n",
            &|key| {
                (key == "JWT_SECRET").then(|| "0123456789abcdef0123456789abcdef".to_string())
            },
        )
        .unwrap()
    }

    fn app() -> Router {
        async fn boom() -> &'static str {
            panic!("handler bug")
        }

        let router = Router::new()
            .route("/health", get(health::health))
            .route("/boom", get(boom));
        with_middleware(router, &config())
    }

    #[tokio::test]
    async fn test_health_through_stack() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn test_cors_preflight_for_allowed_origin() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/health")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "300");
    }

    #[tokio::test]
    async fn test_unknown_origin_gets_no_cors_headers() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(
            !response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }

    #[tokio::test]
    async fn test_issued_token_opens_protected_routes() {
        use greens_core::UserId;

        use crate::middleware::{OptionalAuth, RequireAuth};
        use crate::services::auth::TokenKeys;

        let config = config();
        let keys = TokenKeys::new(&config.jwt);

        let protected = Router::new()
            .route(
                "/me",
                get(|RequireAuth(user): RequireAuth| async move { user.id.to_string() }),
            )
            .route_layer(from_fn_with_state(keys.clone(), require_auth));
        let public = Router::new().route(
            "/whoami",
            get(|OptionalAuth(user): OptionalAuth| async move {
                user.map_or_else(|| "anonymous".to_string(), |u| u.id.to_string())
            }),
        );
        let router = with_middleware(public.merge(protected).with_state(keys.clone()), &config);

        let pair = keys.issue_pair(UserId::new(42)).unwrap();
        for uri in ["/me", "/whoami"] {
            let response = router
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(uri)
                        .header(AUTHORIZATION, format!("Bearer {}", pair.access_token))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            let body = http_body_util::BodyExt::collect(response.into_body())
                .await
                .unwrap()
                .to_bytes();
            assert_eq!(body.as_ref(), b"42", "{uri}");
        }
    }

    #[tokio::test]
    async fn test_panic_is_json_500() {
        let response = app()
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
