//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → endpoint.rs (path → endpoint class)
//!     → cors.rs (Origin allow-list)
//!     → threat.rs (SQLi / XSS / traversal signatures on URL + body)
//!     → quota.rs (fixed-window counter per client and class)
//!     → headers.rs (security, CORS and rate-limit response headers)
//! ```
//!
//! # Design Decisions
//! - Each check is usable on its own; `gateway::pipeline` sequences them
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod cors;
pub mod endpoint;
pub mod headers;
pub mod quota;
pub mod threat;
