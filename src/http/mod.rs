//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, layers, background tasks)
//!     → gateway::middleware (admit or reject)
//!     → request.rs (client identity, correlation ID extension)
//!     → server.rs forward_upstream (admitted requests only)
//!     → response.rs (rejection and fault bodies)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{client_identifier, RequestId};
pub use server::GatewayServer;
