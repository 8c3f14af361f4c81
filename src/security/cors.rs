//! Cross-origin request validation.

use std::collections::HashSet;

use crate::config::CorsConfig;

/// Returns `true` when a request with this `Origin` may proceed.
///
/// Requests without an `Origin` header are same-origin or non-browser and are
/// not subject to CORS policy. Otherwise the origin must be an exact member of
/// the allow-list.
pub fn validate(origin: Option<&str>, allow_list: &HashSet<String>) -> bool {
    match origin {
        None => true,
        Some(origin) => allow_list.contains(origin),
    }
}

/// Holds the configured allow-list.
#[derive(Debug, Clone, Default)]
pub struct OriginValidator {
    allowed: HashSet<String>,
}

impl OriginValidator {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: origins.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &CorsConfig) -> Self {
        Self::new(config.allowed_origins.iter().cloned())
    }

    pub fn validate(&self, origin: Option<&str>) -> bool {
        validate(origin, &self.allowed)
    }

    pub fn allow_list(&self) -> &HashSet<String> {
        &self.allowed
    }
}
