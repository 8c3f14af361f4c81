//! Security event recording.
//!
//! # Data Flow
//! ```text
//! Pipeline rejects/flags a request
//!     → SecurityEvent (immutable record)
//!     → dispatcher.rs (bounded channel, try_send, never blocks)
//!     → background task
//!     → sink.rs (tracing / JSON lines / memory)
//! ```
//!
//! # Design Decisions
//! - The gateway keeps no event history; events are handed off and forgotten
//! - A full channel or a failing sink loses the event, never the decision

pub mod dispatcher;
pub mod sink;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use dispatcher::{run_writer, EventDispatcher};
pub use sink::{build_sink, JsonLinesSink, MemorySink, SecurityEventSink, SinkError, TracingSink};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ThreatDetected,
    RateLimitExceeded,
    InternalError,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ThreatDetected => "threat_detected",
            EventType::RateLimitExceeded => "rate_limit_exceeded",
            EventType::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of a blocked or flagged request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub severity: Severity,
    pub client_identifier: String,
    pub endpoint: String,
    pub method: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(
        event_type: EventType,
        severity: Severity,
        client_identifier: impl Into<String>,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            severity,
            client_identifier: client_identifier.into(),
            endpoint: endpoint.into(),
            method: method.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}
