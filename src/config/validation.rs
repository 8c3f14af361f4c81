//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows in (0, one year], limits > 0)
//! - Check origin and address formats
//! - Check that path prefixes are absolute
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{GatewayConfig, SinkKind};
use crate::security::endpoint::EndpointClass;

/// Longest accepted quota window, in milliseconds.
pub const MAX_WINDOW_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "upstream.address", &config.upstream.address);

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be greater than 0"));
    }

    for (i, origin) in config.cors.allowed_origins.iter().enumerate() {
        if let Err(message) = check_origin(origin) {
            errors.push(ValidationError::new(format!("cors.allowed_origins[{}]", i), message));
        }
    }

    if config.quota.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("quota.sweep_interval_secs", "must be greater than 0"));
    }

    for class in EndpointClass::ALL {
        let policy = config.quota.policy(class);
        let key = format!("quota.{}", class.config_key());
        if policy.window_ms == 0 {
            errors.push(ValidationError::new(format!("{}.window_ms", key), "must be greater than 0"));
        } else if policy.window_ms > MAX_WINDOW_MS {
            errors.push(ValidationError::new(
                format!("{}.window_ms", key),
                format!("must not exceed {} (one year)", MAX_WINDOW_MS),
            ));
        }
        if policy.max_requests == 0 {
            errors.push(ValidationError::new(format!("{}.max_requests", key), "must be greater than 0"));
        }
        if class != EndpointClass::GeneralApi && policy.path_prefixes.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.path_prefixes", key),
                "must list at least one prefix",
            ));
        }
        for prefix in &policy.path_prefixes {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::new(
                    format!("{}.path_prefixes", key),
                    format!("prefix {:?} must start with '/'", prefix),
                ));
            }
        }
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }

    if config.events.channel_capacity == 0 {
        errors.push(ValidationError::new("events.channel_capacity", "must be greater than 0"));
    }
    if config.events.sink == SinkKind::Jsonl && config.events.path.is_none() {
        errors.push(ValidationError::new("events.path", "required when sink = \"jsonl\""));
    }

    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("{:?} is not a socket address", value)));
    }
}

/// Origins are compared byte-for-byte against the `Origin` header, so they must
/// be in the exact serialized form browsers send: `scheme://host[:port]`.
fn check_origin(origin: &str) -> Result<(), String> {
    let url = Url::parse(origin).map_err(|e| format!("{:?} is not a valid origin: {}", origin, e))?;
    if url.host_str().is_none() {
        return Err(format!("{:?} has no host", origin));
    }
    let serialized = url.origin().ascii_serialization();
    if serialized != origin {
        return Err(format!(
            "{:?} must be written as {:?} (no path, trailing slash or default port)",
            origin, serialized
        ));
    }
    Ok(())
}
