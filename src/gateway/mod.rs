//! Gateway pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → middleware.rs (buffer body, derive client id)
//!     → pipeline.rs
//!         OriginCheck ──fail──▶ RejectCors (403)
//!         ThreatScan  ──hit───▶ RejectThreat (403) + critical event
//!         QuotaCheck  ──over──▶ RejectQuota (429) + medium event
//!         Admit
//!     → protected handler (admitted requests only)
//!     → composed headers merged into the response
//! ```
//!
//! # Design Decisions
//! - A pass ends in exactly one `Decision`; rejections never reach the handler
//! - Internal faults are the `Err` side of evaluation and become an opaque 500
//! - All state lives in an explicitly constructed `Gateway`; no globals

pub mod middleware;
pub mod pipeline;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::security::threat::ThreatKind;

pub use middleware::gateway_middleware;
pub use pipeline::{Gateway, RequestView};

/// Terminal outcome of one gateway pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Forward to the protected handler.
    Admit,
    /// `Origin` is not on the allow-list.
    RejectCors,
    /// An attack signature matched.
    RejectThreat(ThreatKind),
    /// Quota exhausted until `retry_after`.
    RejectQuota { retry_after: DateTime<Utc> },
}

impl Decision {
    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Admit => "admit",
            Decision::RejectCors => "reject_cors",
            Decision::RejectThreat(_) => "reject_threat",
            Decision::RejectQuota { .. } => "reject_quota",
        }
    }

    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// A decision together with the headers every response must carry.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub request_id: Uuid,
    pub decision: Decision,
    pub headers: HeaderMap,
}
