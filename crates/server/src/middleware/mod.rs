//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first, see `routes::app`)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. Request ID (reuse upstream `x-request-id` or generate one)
//! 3. Client IP (Cloudflare / proxy headers, then socket peer)
//! 4. `TraceLayer` (access log span with request ID and client IP)
//! 5. Panic recovery (JSON 500)
//! 6. Request timeout (JSON 504)
//! 7. CORS
//! 8. Rate limiting (sliding window per client IP)
//! 9. Bearer authentication (protected routers only, via `route_layer`)

pub mod auth;
pub mod client_ip;
pub mod panic;
pub mod rate_limit;
pub mod request_id;
pub mod timeout;

pub use auth::{AuthUser, OptionalAuth, RequireAuth, require_auth};
pub use client_ip::{ClientIp, client_ip_middleware};
pub use panic::panic_response;
pub use rate_limit::{RateLimiter, rate_limit_middleware};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use timeout::timeout_middleware;
