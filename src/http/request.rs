//! Request inspection helpers.
//!
//! # Responsibilities
//! - Derive the client identifier used for quota keys and events
//! - Carry the gateway's correlation ID to admitted handlers
//!
//! # Design Decisions
//! - The first `X-Forwarded-For` hop wins; the gateway is expected to sit
//!   behind a proxy that overwrites it
//! - Missing or unusable values fall back to the literal `"unknown"`

use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderName};
use uuid::Uuid;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Correlation ID of an admitted request, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identify the client: forwarding headers first, then the socket peer.
pub fn client_identifier(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
