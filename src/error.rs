//! Gateway error types.
//!
//! Policy rejections (CORS, threat, quota) are not errors; they are
//! [`Decision`](crate::gateway::Decision) variants. Everything here is an
//! internal fault that surfaces to the client only as an opaque 500.

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Unexpected failure inside the gateway pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request body could not be read.
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// A header value could not be constructed.
    #[error("Invalid header value: {0}")]
    Header(String),

    /// Pipeline evaluation panicked.
    #[error("Pipeline panicked: {0}")]
    Panic(String),

    /// Any other internal failure.
    #[error("Internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BodyRead(_) => "body_read",
            Self::Header(_) => "header",
            Self::Panic(_) => "panic",
            Self::Internal(_) => "internal",
        }
    }
}
