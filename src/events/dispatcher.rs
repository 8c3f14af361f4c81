//! Non-blocking hand-off from the request path to the event sink.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::events::{SecurityEvent, SecurityEventSink};
use crate::observability::metrics;

/// Cloneable handle used by the pipeline to emit events.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    tx: mpsc::Sender<SecurityEvent>,
}

impl EventDispatcher {
    /// Start the background writer and return a handle to it.
    ///
    /// The writer runs until `shutdown` fires or every handle is dropped, then
    /// drains whatever is still buffered.
    pub fn spawn(
        sink: Arc<dyn SecurityEventSink>,
        capacity: usize,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let (dispatcher, rx) = Self::detached(capacity);
        let task = tokio::spawn(run_writer(sink, rx, shutdown));
        (dispatcher, task)
    }

    /// A dispatcher with no writer attached yet.
    ///
    /// Pair the receiver with [`run_writer`], or read it directly in tests.
    pub fn detached(capacity: usize) -> (Self, mpsc::Receiver<SecurityEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue an event. Never blocks and never fails the caller.
    ///
    /// Returns `false` when the event was dropped.
    pub fn emit(&self, event: SecurityEvent) -> bool {
        let event_type = event.event_type;
        match self.tx.try_send(event) {
            Ok(()) => {
                metrics::record_security_event(event_type.as_str());
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(event_type = %event_type, "Security event channel full, dropping event");
                metrics::record_security_event_dropped("full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(event_type = %event_type, "Security event writer stopped, dropping event");
                metrics::record_security_event_dropped("closed");
                false
            }
        }
    }
}

/// Drain `rx` into `sink` until shutdown, then flush what is still buffered.
pub async fn run_writer(
    sink: Arc<dyn SecurityEventSink>,
    mut rx: mpsc::Receiver<SecurityEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(event) => write(&*sink, &event).await,
                None => return,
            },
            _ = shutdown.recv() => {
                tracing::info!("Security event writer received shutdown signal, draining");
                break;
            }
        }
    }

    rx.close();
    while let Some(event) = rx.recv().await {
        write(&*sink, &event).await;
    }
}

async fn write(sink: &dyn SecurityEventSink, event: &SecurityEvent) {
    if let Err(e) = sink.record(event).await {
        tracing::error!(error = %e, event_type = %event.event_type, "Failed to record security event");
        metrics::record_security_event_dropped("sink_error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventType, MemorySink, Severity, SinkError};
    use async_trait::async_trait;
    use serde_json::json;

    fn event() -> SecurityEvent {
        SecurityEvent::new(
            EventType::RateLimitExceeded,
            Severity::Medium,
            "client",
            "/api",
            "GET",
            json!({}),
        )
    }

    struct FailingSink;

    #[async_trait]
    impl SecurityEventSink for FailingSink {
        async fn record(&self, _event: &SecurityEvent) -> Result<(), SinkError> {
            Err(SinkError::Closed)
        }
    }

    #[tokio::test]
    async fn test_events_reach_sink_and_drain_on_shutdown() {
        let sink = MemorySink::new();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (dispatcher, task) = EventDispatcher::spawn(Arc::new(sink.clone()), 16, shutdown_rx);

        for _ in 0..5 {
            assert!(dispatcher.emit(event()));
        }
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        assert_eq!(sink.len(), 5);
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (dispatcher, mut rx) = EventDispatcher::detached(2);
        assert!(dispatcher.emit(event()));
        assert!(dispatcher.emit(event()));
        assert!(!dispatcher.emit(event()));

        assert!(rx.recv().await.is_some());
        assert!(dispatcher.emit(event()));
    }

    #[tokio::test]
    async fn test_closed_channel_drops() {
        let (dispatcher, rx) = EventDispatcher::detached(2);
        drop(rx);
        assert!(!dispatcher.emit(event()));
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (dispatcher, task) = EventDispatcher::spawn(Arc::new(FailingSink), 4, shutdown_rx);

        assert!(dispatcher.emit(event()));
        assert!(dispatcher.emit(event()));
        shutdown_tx.send(()).unwrap();

        // The writer survives sink errors and exits cleanly.
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_stops_when_handles_dropped() {
        let sink = MemorySink::new();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (dispatcher, task) = EventDispatcher::spawn(Arc::new(sink.clone()), 4, shutdown_rx);

        dispatcher.emit(event());
        drop(dispatcher);
        task.await.unwrap();
        assert_eq!(sink.len(), 1);
    }
}
