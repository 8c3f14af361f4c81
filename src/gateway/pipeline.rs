//! Gateway decision pipeline.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::events::{EventDispatcher, EventType, SecurityEvent, Severity};
use crate::gateway::{Decision, Evaluation};
use crate::security::cors::OriginValidator;
use crate::security::endpoint::{EndpointClass, EndpointClassifier};
use crate::security::headers::{HeaderComposer, HeaderContext, X_REQUEST_ID};
use crate::security::quota::{FixedWindowQuota, QuotaStatus, QuotaStore};
use crate::security::threat;

/// The parts of a request the pipeline looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    pub method: &'a str,
    pub path: &'a str,
    /// Path plus query string.
    pub url: &'a str,
    pub origin: Option<&'a str>,
    pub client_id: &'a str,
    pub body: &'a str,
}

/// Cloneable handle to one gateway instance.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    origins: OriginValidator,
    classifier: EndpointClassifier,
    quota: Arc<dyn QuotaStore>,
    headers: HeaderComposer,
    events: EventDispatcher,
    max_body_bytes: usize,
}

impl Gateway {
    /// Build a gateway over the given quota store and event dispatcher.
    pub fn new(
        config: &GatewayConfig,
        quota: Arc<dyn QuotaStore>,
        events: EventDispatcher,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            inner: Arc::new(GatewayInner {
                origins: OriginValidator::from_config(&config.cors),
                classifier: EndpointClassifier::from_config(&config.quota),
                quota,
                headers: HeaderComposer::from_config(&config.headers, &config.cors)?,
                events,
                max_body_bytes: config.limits.max_body_bytes,
            }),
        })
    }

    /// Build a gateway with a fresh in-memory quota table.
    pub fn in_memory(config: &GatewayConfig, events: EventDispatcher) -> Result<Self, GatewayError> {
        let quota: Arc<dyn QuotaStore> = Arc::new(FixedWindowQuota::new(config.quota.clone()));
        Self::new(config, quota, events)
    }

    pub fn quota_store(&self) -> Arc<dyn QuotaStore> {
        self.inner.quota.clone()
    }

    pub fn max_body_bytes(&self) -> usize {
        self.inner.max_body_bytes
    }

    pub fn classify(&self, path: &str) -> EndpointClass {
        self.inner.classifier.classify(path)
    }

    /// Run one request through origin, threat and quota checks.
    pub fn evaluate(&self, req: &RequestView<'_>, now: DateTime<Utc>) -> Result<Evaluation, GatewayError> {
        let inner = &*self.inner;
        let request_id = Uuid::new_v4();
        let class = inner.classifier.classify(req.path);

        // OriginCheck
        if !inner.origins.validate(req.origin) {
            tracing::debug!(
                request_id = %request_id,
                client = %req.client_id,
                origin = ?req.origin,
                "Origin not allowed"
            );
            let quota = inner.quota.peek(req.client_id, class, now);
            let headers = self.compose(request_id, None, quota, None)?;
            return Ok(Evaluation {
                request_id,
                decision: Decision::RejectCors,
                headers,
            });
        }
        // From here on the origin is either absent or allowed.
        let allowed_origin = req.origin;

        // ThreatScan
        let scan = threat::scan(req.url, req.body);
        if let Some(reason) = scan.reason {
            tracing::warn!(
                request_id = %request_id,
                client = %req.client_id,
                path = %req.path,
                reason = %reason,
                "Request blocked by threat detector"
            );
            inner.events.emit(SecurityEvent::new(
                EventType::ThreatDetected,
                Severity::Critical,
                req.client_id,
                req.path,
                req.method,
                json!({
                    "reason": reason.as_str(),
                    "url": req.url,
                    "requestId": request_id,
                }),
            ));
            let quota = inner.quota.peek(req.client_id, class, now);
            let headers = self.compose(request_id, allowed_origin, quota, None)?;
            return Ok(Evaluation {
                request_id,
                decision: Decision::RejectThreat(reason),
                headers,
            });
        }

        // QuotaCheck
        let quota = inner.quota.check(req.client_id, class, now);
        if !quota.allowed {
            let retry_after_secs = quota.retry_after_secs(now);
            tracing::warn!(
                request_id = %request_id,
                client = %req.client_id,
                class = %class,
                limit = quota.limit,
                retry_after_secs,
                "Rate limit exceeded"
            );
            inner.events.emit(SecurityEvent::new(
                EventType::RateLimitExceeded,
                Severity::Medium,
                req.client_id,
                req.path,
                req.method,
                json!({
                    "endpointClass": class.as_str(),
                    "limit": quota.limit,
                    "resetAt": quota.reset_at,
                    "requestId": request_id,
                }),
            ));
            let headers = self.compose(request_id, allowed_origin, quota, Some(retry_after_secs))?;
            return Ok(Evaluation {
                request_id,
                decision: Decision::RejectQuota {
                    retry_after: quota.reset_at,
                },
                headers,
            });
        }

        tracing::debug!(
            request_id = %request_id,
            client = %req.client_id,
            class = %class,
            remaining = quota.remaining,
            "Request admitted"
        );
        let headers = self.compose(request_id, allowed_origin, quota, None)?;
        Ok(Evaluation {
            request_id,
            decision: Decision::Admit,
            headers,
        })
    }

    /// Headers and correlation ID for a pipeline fault.
    ///
    /// Logs the fault and emits a best-effort event. Never fails: if the full
    /// header set cannot be built, falls back to the fixed security headers.
    pub fn fault(
        &self,
        client_id: &str,
        method: &str,
        path: &str,
        error: &GatewayError,
    ) -> (Uuid, HeaderMap) {
        let inner = &*self.inner;
        let request_id = Uuid::new_v4();

        tracing::error!(
            request_id = %request_id,
            client = %client_id,
            path = %path,
            kind = error.kind(),
            error = %error,
            "Gateway pipeline fault"
        );

        inner.events.emit(SecurityEvent::new(
            EventType::InternalError,
            Severity::High,
            client_id,
            path,
            method,
            json!({ "kind": error.kind(), "requestId": request_id }),
        ));

        let now = Utc::now();
        let quota = inner.quota.peek(client_id, inner.classifier.classify(path), now);
        let headers = self
            .compose(request_id, None, quota, None)
            .unwrap_or_else(|_| {
                let mut headers = inner.headers.security_headers().clone();
                if let Ok(value) = request_id.to_string().parse() {
                    headers.insert(X_REQUEST_ID, value);
                }
                headers
            });
        (request_id, headers)
    }

    fn compose(
        &self,
        request_id: Uuid,
        allowed_origin: Option<&str>,
        quota: QuotaStatus,
        retry_after_secs: Option<u64>,
    ) -> Result<HeaderMap, GatewayError> {
        self.inner.headers.compose(&HeaderContext {
            request_id,
            allowed_origin,
            quota,
            retry_after_secs,
        })
    }
}
