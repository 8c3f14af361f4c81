//! Endpoint classification.
//!
//! # Responsibilities
//! - Map a request path to the endpoint class whose quota applies
//!
//! # Design Decisions
//! - Classification is total: unmatched paths are `general-api`
//! - Classes are checked in a fixed order (auth, ai-inference, upload)
//! - A prefix matches on segment boundaries, so `/api/auth` does not claim `/api/authors`
//! - Paths are normalized first: empty and `.` segments are dropped and `..`
//!   pops a segment, so `//api/auth/./login` classifies like `/api/auth/login`

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::QuotaConfig;

/// Coarse category of protected routes sharing one quota policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointClass {
    GeneralApi,
    Auth,
    AiInference,
    Upload,
}

impl EndpointClass {
    /// All classes, in classification order with the fallback last.
    pub const ALL: [EndpointClass; 4] = [
        EndpointClass::Auth,
        EndpointClass::AiInference,
        EndpointClass::Upload,
        EndpointClass::GeneralApi,
    ];

    /// Stable label used in logs, metrics and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::GeneralApi => "general-api",
            EndpointClass::Auth => "auth",
            EndpointClass::AiInference => "ai-inference",
            EndpointClass::Upload => "upload",
        }
    }

    /// Table name of this class under `[quota]` in the config file.
    pub fn config_key(&self) -> &'static str {
        match self {
            EndpointClass::GeneralApi => "general",
            EndpointClass::Auth => "auth",
            EndpointClass::AiInference => "ai",
            EndpointClass::Upload => "upload",
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves paths to endpoint classes using the configured prefixes.
#[derive(Debug, Clone)]
pub struct EndpointClassifier {
    rules: Vec<(String, EndpointClass)>,
}

impl EndpointClassifier {
    /// Build the prefix table from quota configuration.
    pub fn from_config(config: &QuotaConfig) -> Self {
        let rules = EndpointClass::ALL
            .iter()
            .filter(|class| **class != EndpointClass::GeneralApi)
            .flat_map(|class| {
                config
                    .policy(*class)
                    .path_prefixes
                    .iter()
                    .map(move |prefix| (prefix.trim_end_matches('/').to_string(), *class))
            })
            .collect();
        Self { rules }
    }

    /// Classify a request path.
    pub fn classify(&self, path: &str) -> EndpointClass {
        let path = normalize_path(path);
        self.rules
            .iter()
            .find(|(prefix, _)| matches_prefix(&path, prefix))
            .map(|(_, class)| *class)
            .unwrap_or(EndpointClass::GeneralApi)
    }
}

impl Default for EndpointClassifier {
    fn default() -> Self {
        Self::from_config(&QuotaConfig::default())
    }
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
