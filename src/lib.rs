//! Request security gateway.
//!
//! Screens inbound HTTP requests before they reach protected handlers:
//! origin allow-listing, attack signature detection, per-client quotas by
//! endpoint class, uniform response headers and security event recording.
//!
//! Embed it as an axum middleware:
//!
//! ```ignore
//! let (events, _task) = EventDispatcher::spawn(Arc::new(TracingSink), 1024, shutdown.subscribe());
//! let gateway = Gateway::in_memory(&config, events)?;
//! let app = Router::new()
//!     .route("/api/items", get(list_items))
//!     .layer(axum::middleware::from_fn_with_state(gateway, gateway_middleware));
//! ```
//!
//! or run the standalone [`GatewayServer`] in front of an upstream service.

// Core subsystems
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod net;
pub mod security;

// Cross-cutting concerns
pub mod events;
pub mod lifecycle;
pub mod observability;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use events::{EventDispatcher, SecurityEvent, SecurityEventSink};
pub use gateway::{gateway_middleware, Decision, Gateway};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
