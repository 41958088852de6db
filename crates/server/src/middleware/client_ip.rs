//! Real client IP resolution behind Cloudflare and Fly.io.
//!
//! Header precedence: `CF-Connecting-IP`, first hop of `X-Forwarded-For`,
//! `X-Real-IP`, `Fly-Client-IP`, then the socket peer address.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

/// Resolved client address of the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl std::fmt::Display for ClientIp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Insert a [`ClientIp`] extension. Requests with no usable header and no
/// peer address (in-process tests) resolve to the unspecified address.
pub async fn client_ip_middleware(mut request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let ip = from_headers(request.headers())
        .or(peer)
        .unwrap_or(IpAddr::from([0, 0, 0, 0]));

    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}

fn from_headers(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("cf-connecting-ip")
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse().ok())
        })
        .or_else(|| header("x-real-ip").and_then(|s| s.trim().parse().ok()))
        .or_else(|| header("fly-client-ip").and_then(|s| s.trim().parse().ok()))
}
