//! Response header composition.
//!
//! # Responsibilities
//! - Fixed security headers (nosniff, frame options, referrer policy, HSTS, CSP)
//! - Request correlation ID
//! - CORS headers for validated origins
//! - Quota bookkeeping headers (`X-RateLimit-*`, `Retry-After`)
//!
//! # Design Decisions
//! - Fixed headers are rendered once at startup; per-request work is cloning
//!   a small `HeaderMap` and inserting the dynamic values
//! - Composed headers replace same-named headers from the handler, except
//!   `Vary`, which is appended

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::config::{CorsConfig, HeadersConfig};
use crate::error::GatewayError;
use crate::security::quota::QuotaStatus;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Per-request inputs to header composition.
#[derive(Debug, Clone)]
pub struct HeaderContext<'a> {
    /// Correlation ID for this request.
    pub request_id: Uuid,
    /// The request's origin, only when present and on the allow-list.
    pub allowed_origin: Option<&'a str>,
    /// Quota status to report.
    pub quota: QuotaStatus,
    /// Seconds until retry, set only for quota rejections.
    pub retry_after_secs: Option<u64>,
}

/// Renders the response header set for every gateway outcome.
#[derive(Debug, Clone)]
pub struct HeaderComposer {
    security: HeaderMap,
    cors_methods: Option<HeaderValue>,
    cors_headers: Option<HeaderValue>,
    cors_credentials: bool,
}

impl HeaderComposer {
    pub fn from_config(headers: &HeadersConfig, cors: &CorsConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            security: security_headers(headers)?,
            cors_methods: join_values(&cors.allowed_methods)?,
            cors_headers: join_values(&cors.allowed_headers)?,
            cors_credentials: cors.allow_credentials,
        })
    }

    /// The fixed security header set.
    pub fn security_headers(&self) -> &HeaderMap {
        &self.security
    }

    /// Build the full header set for one response.
    pub fn compose(&self, ctx: &HeaderContext<'_>) -> Result<HeaderMap, GatewayError> {
        let mut headers = self.security.clone();

        headers.insert(X_REQUEST_ID, header_value(&ctx.request_id.to_string())?);

        if let Some(origin) = ctx.allowed_origin {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, header_value(origin)?);
            if let Some(methods) = &self.cors_methods {
                headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods.clone());
            }
            if let Some(allowed) = &self.cors_headers {
                headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allowed.clone());
            }
            if self.cors_credentials {
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                    HeaderValue::from_static("true"),
                );
            }
            headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        }

        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(ctx.quota.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(ctx.quota.remaining));
        headers.insert(X_RATELIMIT_RESET, header_value(&format_timestamp(ctx.quota.reset_at))?);

        if let Some(secs) = ctx.retry_after_secs {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }

        Ok(headers)
    }
}

/// Merge composed headers into a handler response.
pub fn merge_headers(target: &mut HeaderMap, composed: HeaderMap) {
    let mut last_name: Option<HeaderName> = None;
    for (name, value) in composed {
        // `HeaderMap::into_iter` yields `None` for repeated values of the previous name.
        let name = match name {
            Some(name) => {
                last_name = Some(name.clone());
                name
            }
            None => match &last_name {
                Some(name) => name.clone(),
                None => continue,
            },
        };
        if name == header::VARY {
            target.append(name, value);
        } else {
            target.insert(name, value);
        }
    }
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn security_headers(config: &HeadersConfig) -> Result<HeaderMap, GatewayError> {
    let mut headers = HeaderMap::new();

    if config.nosniff {
        headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    }
    if !config.frame_options.is_empty() {
        headers.insert(header::X_FRAME_OPTIONS, header_value(&config.frame_options)?);
    }
    if !config.referrer_policy.is_empty() {
        headers.insert(header::REFERRER_POLICY, header_value(&config.referrer_policy)?);
    }
    if config.xss_protection {
        headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    }
    if config.hsts_enabled {
        let mut hsts = format!("max-age={}", config.hsts_max_age);
        if config.hsts_include_subdomains {
            hsts.push_str("; includeSubDomains");
        }
        headers.insert(header::STRICT_TRANSPORT_SECURITY, header_value(&hsts)?);
    }
    if let Some(csp) = &config.content_security_policy {
        headers.insert(header::CONTENT_SECURITY_POLICY, header_value(csp)?);
    }
    if let Some(pp) = &config.permissions_policy {
        headers.insert(HeaderName::from_static("permissions-policy"), header_value(pp)?);
    }

    Ok(headers)
}

fn join_values(values: &[String]) -> Result<Option<HeaderValue>, GatewayError> {
    if values.is_empty() {
        return Ok(None);
    }
    header_value(&values.join(", ")).map(Some)
}

fn header_value(value: &str) -> Result<HeaderValue, GatewayError> {
    HeaderValue::from_str(value).map_err(|e| GatewayError::Header(format!("{:?}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn composer() -> HeaderComposer {
        HeaderComposer::from_config(&HeadersConfig::default(), &CorsConfig::default()).unwrap()
    }

    fn quota() -> QuotaStatus {
        QuotaStatus {
            allowed: true,
            limit: 100,
            remaining: 42,
            reset_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap(),
        }
    }

    fn ctx(origin: Option<&str>, retry: Option<u64>) -> HeaderContext<'_> {
        HeaderContext {
            request_id: Uuid::nil(),
            allowed_origin: origin,
            quota: quota(),
            retry_after_secs: retry,
        }
    }

    #[test]
    fn test_always_present() {
        let headers = composer().compose(&ctx(None, None)).unwrap();

        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::REFERRER_POLICY], "strict-origin-when-cross-origin");
        assert!(headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
        assert_eq!(headers[X_REQUEST_ID], "00000000-0000-0000-0000-000000000000");
        assert_eq!(headers[X_RATELIMIT_LIMIT], "100");
        assert_eq!(headers[X_RATELIMIT_REMAINING], "42");
        assert_eq!(headers[X_RATELIMIT_RESET], "2024-03-01T08:30:00.000Z");
        assert!(!headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
        assert!(!headers.contains_key(header::RETRY_AFTER));
    }

    #[test]
    fn test_cors_echoes_origin() {
        let headers = composer().compose(&ctx(Some("http://localhost:3000"), None)).unwrap();

        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, PUT, DELETE, OPTIONS");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type, Authorization");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::VARY], "Origin");
    }

    #[test]
    fn test_retry_after() {
        let headers = composer().compose(&ctx(None, Some(17))).unwrap();
        assert_eq!(headers[header::RETRY_AFTER], "17");
    }

    #[test]
    fn test_disabled_headers_are_omitted() {
        let config = HeadersConfig {
            hsts_enabled: false,
            frame_options: String::new(),
            content_security_policy: None,
            ..Default::default()
        };
        let cors = CorsConfig {
            allow_credentials: false,
            ..Default::default()
        };
        let composer = HeaderComposer::from_config(&config, &cors).unwrap();
        let headers = composer.compose(&ctx(Some("http://localhost:3000"), None)).unwrap();

        assert!(!headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
        assert!(!headers.contains_key(header::X_FRAME_OPTIONS));
        assert!(!headers.contains_key(header::CONTENT_SECURITY_POLICY));
        assert!(!headers.contains_key(header::ACCESS_CONTROL_ALLOW_CREDENTIALS));
    }

    #[test]
    fn test_invalid_config_value() {
        let config = HeadersConfig {
            referrer_policy: "bad\nvalue".into(),
            ..Default::default()
        };
        let err = HeaderComposer::from_config(&config, &CorsConfig::default()).unwrap_err();
        assert!(matches!(err, GatewayError::Header(_)));
    }

    #[test]
    fn test_merge_overrides_and_appends_vary() {
        let mut target = HeaderMap::new();
        target.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        target.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        target.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let composed = composer().compose(&ctx(Some("http://localhost:3000"), None)).unwrap();
        merge_headers(&mut target, composed);

        assert_eq!(target[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(target[header::CONTENT_TYPE], "text/plain");
        let vary: Vec<_> = target.get_all(header::VARY).iter().collect();
        assert_eq!(vary, vec!["Accept-Encoding", "Origin"]);
    }
}
