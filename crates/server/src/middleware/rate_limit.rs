//! Per-IP rate limiting.
//!
//! The Redis backend is a sliding-window counter shared across instances.
//! Each `(ip, window)` pair gets a counter `{prefix}:rl:{ip}:{window}` where
//! `window` is the Unix time divided by the window length; a request is
//! weighed against the previous window's count scaled by how much of it still
//! overlaps the sliding window:
//!
//! ```text
//! estimate = previous * (window - elapsed) / window + current
//! ```
//!
//! The request passes while `estimate <= limit`.
//!
//! The memory backend is a keyed `governor` limiter (GCRA) with a burst of
//! `limit` replenished over one window; each instance limits independently.
//!
//! A failing backend lets the request through with a warning.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header::RETRY_AFTER},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, clock::Clock};
use tracing::warn;

use crate::cache::{CacheError, CacheStore};
use crate::config::RateLimitConfig;
use crate::error::{ErrorKind, error_response};
use crate::middleware::client_ip::ClientIp;

/// Tracked IPs above which idle memory-backend entries are pruned.
const MEMORY_MAX_KEYS: usize = 100_000;

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Over the limit; retry in `retry_after` seconds.
    Limited { retry_after: u64 },
}

#[derive(Clone)]
enum Backend {
    Redis(CacheStore),
    Memory(Arc<DefaultKeyedRateLimiter<IpAddr>>),
}

/// Per-IP request counter shared by all handlers.
#[derive(Clone)]
pub struct RateLimiter {
    backend: Backend,
    limit: u64,
    window: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn redis(cache: CacheStore, config: &RateLimitConfig) -> Self {
        Self {
            backend: Backend::Redis(cache),
            limit: config.requests,
            window: config.window,
        }
    }

    /// In-process limiter; each instance limits independently.
    #[must_use]
    pub fn memory(config: &RateLimitConfig) -> Self {
        let burst = u32::try_from(config.requests)
            .ok()
            .and_then(NonZeroU32::new)
            .unwrap_or(NonZeroU32::MIN);
        let period = config.window / burst.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            backend: Backend::Memory(Arc::new(governor::RateLimiter::keyed(quota))),
            limit: config.requests,
            window: config.window,
        }
    }

    /// Count one request from `ip`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the Redis backend fails.
    pub async fn check(&self, ip: IpAddr) -> Result<Decision, CacheError> {
        match &self.backend {
            Backend::Redis(cache) => self.check_redis(cache, ip).await,
            Backend::Memory(limiter) => Ok(check_memory(limiter, ip)),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    async fn check_redis(&self, cache: &CacheStore, ip: IpAddr) -> Result<Decision, CacheError> {
        let window_ms = u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX).max(1);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        let window = now_ms / window_ms;
        let elapsed_ms = now_ms % window_ms;

        let (current, previous) = window_keys(ip, window);
        let (current, previous) = (cache.key(&current), cache.key(&previous));
        let (prev_count, curr_count) = cache
            .incr_window(&current, &previous, self.window * 2)
            .await?;

        if sliding_estimate(prev_count, curr_count, elapsed_ms, window_ms) > self.limit as f64 {
            let retry_after = (window_ms - elapsed_ms).div_ceil(1000);
            Ok(Decision::Limited {
                retry_after: retry_after.max(1),
            })
        } else {
            Ok(Decision::Allowed)
        }
    }
}

fn check_memory(limiter: &DefaultKeyedRateLimiter<IpAddr>, ip: IpAddr) -> Decision {
    if limiter.len() > MEMORY_MAX_KEYS {
        limiter.retain_recent();
    }
    match limiter.check_key(&ip) {
        Ok(()) => Decision::Allowed,
        Err(not_until) => {
            let wait = not_until.wait_time_from(limiter.clock().now());
            let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            Decision::Limited {
                retry_after: retry_after.max(1),
            }
        }
    }
}

/// Counter key suffixes for window `window` and the one before it.
fn window_keys(ip: IpAddr, window: u64) -> (String, String) {
    (
        format!("rl:{ip}:{window}"),
        format!("rl:{ip}:{}", window.saturating_sub(1)),
    )
}

/// Requests counted against the sliding window ending now.
#[allow(clippy::cast_precision_loss)]
fn sliding_estimate(previous: u64, current: u64, elapsed_ms: u64, window_ms: u64) -> f64 {
    let overlap = window_ms.saturating_sub(elapsed_ms) as f64 / window_ms as f64;
    (previous as f64).mul_add(overlap, current as f64)
}

/// Reject over-limit requests with 429 and `Retry-After`.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ClientIp>()
        .map_or(IpAddr::from([0, 0, 0, 0]), |ClientIp(ip)| *ip);

    match limiter.check(ip).await {
        Ok(Decision::Allowed) => next.run(request).await,
        Ok(Decision::Limited { retry_after }) => {
            let kind = ErrorKind::RateLimited;
            let mut response = error_response(kind.status(), kind.code(), "Too many requests");
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
        Err(e) => {
            warn!(error = %e, client_ip = %ip, "Rate limiter unavailable; allowing request");
            next.run(request).await
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Router, body::Body, http::Request as HttpRequest, http::StatusCode, routing::get};
    use tower::ServiceExt;

    use super::*;
    use crate::config::RateLimitBackendKind;
    use crate::middleware::client_ip::client_ip_middleware;

    fn config(requests: u64, window: Duration) -> RateLimitConfig {
        RateLimitConfig {
            requests,
            window,
            backend: RateLimitBackendKind::Memory,
        }
    }

    fn app(limiter: RateLimiter) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                limiter,
                rate_limit_middleware,
            ))
            .layer(axum::middleware::from_fn(client_ip_middleware))
    }

    fn request(ip: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri("/")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_hundred_and_first_request_is_limited() {
        let app = app(RateLimiter::memory(&config(100, Duration::from_secs(60))));

        for n in 1..=100 {
            let response = app.clone().oneshot(request("198.51.100.4")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "request {n}");
        }

        let response = app.clone().oneshot(request("198.51.100.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));

        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_limits_are_per_ip() {
        let app = app(RateLimiter::memory(&config(1, Duration::from_secs(60))));

        let first = app.clone().oneshot(request("198.51.100.4")).await.unwrap();
        let second = app.clone().oneshot(request("198.51.100.4")).await.unwrap();
        let other = app.clone().oneshot(request("203.0.113.9")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_memory_burst_does_not_reset_after_short_pause() {
        let limiter = RateLimiter::memory(&config(5, Duration::from_secs(2)));
        let ip: IpAddr = "198.51.100.4".parse().unwrap();

        for _ in 0..5 {
            assert_eq!(limiter.check(ip).await.unwrap(), Decision::Allowed);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut allowed = 0;
        for _ in 0..5 {
            if limiter.check(ip).await.unwrap() == Decision::Allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 0);
    }

    #[test]
    fn test_previous_window_counts_across_boundary() {
        // Limit 5, 2s window: five hits late in one window, then the first
        // hit 150ms into the next still sees most of the previous window.
        let estimate = sliding_estimate(5, 1, 150, 2000);
        assert!(estimate > 5.0);

        // Once the previous window has slid mostly out, capacity returns.
        assert!(sliding_estimate(5, 1, 1900, 2000) <= 5.0);
    }

    #[test]
    fn test_window_keys_pair_current_with_previous() {
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        assert_eq!(
            window_keys(ip, 29_000_000),
            ("rl:10.0.0.7:29000000".to_string(), "rl:10.0.0.7:28999999".to_string())
        );
        assert_eq!(window_keys(ip, 0).1, "rl:10.0.0.7:0");
    }

    #[test]
    fn test_estimate_without_history_is_current_count() {
        assert!((sliding_estimate(0, 100, 30_000, 60_000) - 100.0).abs() < f64::EPSILON);
        assert!(sliding_estimate(0, 101, 30_000, 60_000) > 100.0);
    }
}
