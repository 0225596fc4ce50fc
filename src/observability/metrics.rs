//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): proxied requests by method, status, endpoint
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_endpoint_health` (gauge): 1=active, 0=anything else
//! - `gateway_circuit_transitions_total` (counter): breaker state changes
//! - `gateway_fallbacks_total` (counter): short-circuited requests by strategy
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   exporter every call is a no-op
//! - Prometheus exporter only when `observability.metrics_enabled`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::registry::EndpointStatus;

/// Install the Prometheus exporter with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, endpoint: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("endpoint", endpoint.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_endpoint_health(endpoint: &str, status: EndpointStatus) {
    let value = if status == EndpointStatus::Active { 1.0 } else { 0.0 };
    gauge!("gateway_endpoint_health", "endpoint" => endpoint.to_string()).set(value);
}

pub fn record_circuit_transition(endpoint: &str, from: &'static str, to: &'static str) {
    counter!(
        "gateway_circuit_transitions_total",
        "endpoint" => endpoint.to_string(),
        "from" => from,
        "to" => to
    )
    .increment(1);
}

pub fn record_fallback(endpoint: &str, strategy: &'static str) {
    counter!(
        "gateway_fallbacks_total",
        "endpoint" => endpoint.to_string(),
        "strategy" => strategy
    )
    .increment(1);
}
