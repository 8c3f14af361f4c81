//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_decisions_total` (counter): pipeline outcomes by decision
//! - `gateway_pipeline_duration_seconds` (histogram): time spent deciding
//! - `gateway_security_events_total` (counter): events handed to the sink, by type
//! - `gateway_security_events_dropped_total` (counter): events lost, by reason
//! - `gateway_quota_entries` (gauge): tracked quota entries after the last sweep
//! - `gateway_quota_evicted_total` (counter): entries removed by sweeps
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; with no exporter installed
//!   every call is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and describe all gateway metrics.
pub fn init_metrics(addr: SocketAddr) {
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        tracing::error!(error = %e, "Failed to install Prometheus exporter");
        return;
    }

    describe_counter!("gateway_decisions_total", "Gateway decisions by outcome");
    describe_histogram!(
        "gateway_pipeline_duration_seconds",
        "Time spent in the gateway pipeline"
    );
    describe_counter!(
        "gateway_security_events_total",
        "Security events handed to the sink"
    );
    describe_counter!(
        "gateway_security_events_dropped_total",
        "Security events lost before reaching the sink"
    );
    describe_gauge!("gateway_quota_entries", "Tracked quota entries");
    describe_counter!(
        "gateway_quota_evicted_total",
        "Quota entries removed by the sweeper"
    );

    tracing::info!(address = %addr, "Metrics exporter listening");
}

/// Record one pipeline outcome.
pub fn record_decision(decision: &'static str, start: Instant) {
    counter!("gateway_decisions_total", "decision" => decision).increment(1);
    histogram!("gateway_pipeline_duration_seconds", "decision" => decision)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_security_event(event_type: &'static str) {
    counter!("gateway_security_events_total", "type" => event_type).increment(1);
}

pub fn record_security_event_dropped(reason: &'static str) {
    counter!("gateway_security_events_dropped_total", "reason" => reason).increment(1);
}

pub fn record_quota_sweep(evicted: usize, remaining: usize) {
    counter!("gateway_quota_evicted_total").increment(evicted as u64);
    gauge!("gateway_quota_entries").set(remaining as f64);
}
