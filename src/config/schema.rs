//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::security::endpoint::EndpointClass;

/// Root configuration for the request gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Protected upstream that admitted requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Cross-origin allow-list and CORS response headers.
    pub cors: CorsConfig,

    /// Per-endpoint-class quota policies.
    pub quota: QuotaConfig,

    /// Fixed security response headers.
    pub headers: HeadersConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Security event sink settings.
    pub events: EventsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream (protected handler) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Total time allowed for the upstream round trip, in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Exact origins allowed to make cross-origin requests.
    pub allowed_origins: Vec<String>,

    /// Methods advertised in `Access-Control-Allow-Methods`.
    pub allowed_methods: Vec<String>,

    /// Headers advertised in `Access-Control-Allow-Headers`.
    pub allowed_headers: Vec<String>,

    /// Whether `Access-Control-Allow-Credentials: true` is sent.
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: ["Content-Type", "Authorization"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            allow_credentials: true,
        }
    }
}

/// Quota policy for one endpoint class.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct QuotaPolicy {
    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Requests admitted per window.
    pub max_requests: u64,

    /// Path prefixes that select this class. Ignored for `general-api`.
    #[serde(default)]
    pub path_prefixes: Vec<String>,
}

impl QuotaPolicy {
    fn new(window_ms: u64, max_requests: u64, prefix: Option<&str>) -> Self {
        Self {
            window_ms,
            max_requests,
            path_prefixes: prefix.map(|p| vec![p.to_string()]).unwrap_or_default(),
        }
    }
}

/// Quota configuration: one policy per endpoint class plus the sweep schedule.
///
/// Each `[quota.<class>]` table is merged field by field over that class's
/// defaults, so setting only `max_requests` keeps the default window and prefixes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(from = "RawQuotaConfig")]
pub struct QuotaConfig {
    /// How often expired entries are evicted, in seconds.
    pub sweep_interval_secs: u64,

    /// Policy for paths that match no other class.
    pub general: QuotaPolicy,

    /// Policy for authentication endpoints.
    pub auth: QuotaPolicy,

    /// Policy for AI inference endpoints.
    pub ai: QuotaPolicy,

    /// Policy for upload endpoints.
    pub upload: QuotaPolicy,
}

impl QuotaConfig {
    /// Policy for a given endpoint class.
    pub fn policy(&self, class: EndpointClass) -> &QuotaPolicy {
        match class {
            EndpointClass::GeneralApi => &self.general,
            EndpointClass::Auth => &self.auth,
            EndpointClass::AiInference => &self.ai,
            EndpointClass::Upload => &self.upload,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            general: QuotaPolicy::new(15 * 60 * 1000, 100, None),
            auth: QuotaPolicy::new(15 * 60 * 1000, 5, Some("/api/auth")),
            ai: QuotaPolicy::new(60 * 1000, 10, Some("/api/ai")),
            upload: QuotaPolicy::new(60 * 60 * 1000, 20, Some("/api/upload")),
        }
    }
}

/// On-disk shape of `[quota]`: every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawQuotaConfig {
    sweep_interval_secs: Option<u64>,
    general: PolicyOverride,
    auth: PolicyOverride,
    ai: PolicyOverride,
    upload: PolicyOverride,
}

/// Fields of one `[quota.<class>]` table that were actually written.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolicyOverride {
    window_ms: Option<u64>,
    max_requests: Option<u64>,
    path_prefixes: Option<Vec<String>>,
}

impl PolicyOverride {
    fn apply(self, base: QuotaPolicy) -> QuotaPolicy {
        QuotaPolicy {
            window_ms: self.window_ms.unwrap_or(base.window_ms),
            max_requests: self.max_requests.unwrap_or(base.max_requests),
            path_prefixes: self.path_prefixes.unwrap_or(base.path_prefixes),
        }
    }
}

impl From<RawQuotaConfig> for QuotaConfig {
    fn from(raw: RawQuotaConfig) -> Self {
        let defaults = QuotaConfig::default();
        Self {
            sweep_interval_secs: raw.sweep_interval_secs.unwrap_or(defaults.sweep_interval_secs),
            general: raw.general.apply(defaults.general),
            auth: raw.auth.apply(defaults.auth),
            ai: raw.ai.apply(defaults.ai),
            upload: raw.upload.apply(defaults.upload),
        }
    }
}

/// Fixed security headers attached to every response.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeadersConfig {
    /// Send `X-Content-Type-Options: nosniff`.
    pub nosniff: bool,

    /// `X-Frame-Options` value; empty disables it.
    pub frame_options: String,

    /// `Referrer-Policy` value; empty disables it.
    pub referrer_policy: String,

    /// Send `X-XSS-Protection: 1; mode=block`.
    pub xss_protection: bool,

    /// Enable `Strict-Transport-Security`.
    pub hsts_enabled: bool,

    /// HSTS max-age in seconds.
    pub hsts_max_age: u64,

    /// Add `includeSubDomains` to HSTS.
    pub hsts_include_subdomains: bool,

    /// `Content-Security-Policy` value.
    pub content_security_policy: Option<String>,

    /// `Permissions-Policy` value.
    pub permissions_policy: Option<String>,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            nosniff: true,
            frame_options: "DENY".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            xss_protection: true,
            hsts_enabled: true,
            hsts_max_age: 31_536_000,
            hsts_include_subdomains: true,
            content_security_policy: Some("default-src 'none'; frame-ancestors 'none'".to_string()),
            permissions_policy: Some("camera=(), microphone=(), geolocation=()".to_string()),
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum body size buffered for scanning, in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Which sink receives security events.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Structured log records.
    Tracing,
    /// Append-only JSON lines file.
    Jsonl,
}

/// Security event sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Sink implementation.
    pub sink: SinkKind,

    /// File path for the `jsonl` sink.
    pub path: Option<String>,

    /// Capacity of the hand-off channel between pipeline and sink.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Tracing,
            path: None,
            channel_capacity: 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
