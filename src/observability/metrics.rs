//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count spans started and finished per probe kind
//! - Count contained advice failures
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `probe_spans_started_total` (counter): spans opened, by kind
//! - `probe_spans_finished_total` (counter): spans closed, by kind
//! - `probe_advice_failures_total` (counter): advice errors/panics, by method and phase
//! - `probe_attach_total` (counter): wrap attempts, by capability and outcome
//!
//! # Design Decisions
//! - Recording without an installed exporter is a cheap no-op
//! - started - finished per kind gives the spans still open

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_span_started(kind: &'static str) {
    metrics::counter!("probe_spans_started_total", "kind" => kind).increment(1);
}

pub fn record_span_finished(kind: &'static str) {
    metrics::counter!("probe_spans_finished_total", "kind" => kind).increment(1);
}

pub fn record_advice_failure(method: &str, phase: &'static str) {
    metrics::counter!(
        "probe_advice_failures_total",
        "method" => method.to_string(),
        "phase" => phase
    )
    .increment(1);
}

pub fn record_attach(capability: &str, outcome: &'static str) {
    metrics::counter!(
        "probe_attach_total",
        "capability" => capability.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
