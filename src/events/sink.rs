//! Security event sinks.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::config::{EventsConfig, SinkKind};
use crate::events::{SecurityEvent, Severity};

/// Error type for sink operations.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Sink closed")]
    Closed,
}

/// Durable destination for security events.
///
/// Called from the dispatcher task, never from the request path.
#[async_trait]
pub trait SecurityEventSink: Send + Sync {
    async fn record(&self, event: &SecurityEvent) -> Result<(), SinkError>;
}

/// Writes events as structured log records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl SecurityEventSink for TracingSink {
    async fn record(&self, event: &SecurityEvent) -> Result<(), SinkError> {
        let details = serde_json::to_string(&event.details)?;
        match event.severity {
            Severity::Critical | Severity::High => tracing::error!(
                target: "security_event",
                event_type = %event.event_type,
                severity = %event.severity,
                client = %event.client_identifier,
                endpoint = %event.endpoint,
                method = %event.method,
                details = %details,
                "Security event"
            ),
            Severity::Medium | Severity::Low => tracing::warn!(
                target: "security_event",
                event_type = %event.event_type,
                severity = %event.severity,
                client = %event.client_identifier,
                endpoint = %event.endpoint,
                method = %event.method,
                details = %details,
                "Security event"
            ),
        }
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    // Serializes appends so lines from concurrent writers never interleave.
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl JsonLinesSink {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        tracing::info!(path = ?path, "Security event log opened");
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SecurityEventSink for JsonLinesSink {
    async fn record(&self, event: &SecurityEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps events in memory. Useful for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecurityEventSink for MemorySink {
    async fn record(&self, event: &SecurityEvent) -> Result<(), SinkError> {
        let mut events = self.events.lock().map_err(|_| SinkError::Closed)?;
        events.push(event.clone());
        Ok(())
    }
}

/// Construct the sink selected in configuration.
pub async fn build_sink(config: &EventsConfig) -> Result<Arc<dyn SecurityEventSink>, SinkError> {
    match config.sink {
        SinkKind::Tracing => Ok(Arc::new(TracingSink)),
        SinkKind::Jsonl => {
            let path = config.path.as_deref().ok_or_else(|| {
                SinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "events.path is required for the jsonl sink",
                ))
            })?;
            Ok(Arc::new(JsonLinesSink::open(path).await?))
        }
    }
}
