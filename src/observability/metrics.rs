//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (in-flight, rejections, latency)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `edge_proxy_in_flight_requests` (gauge): ordinary requests in flight
//! - `edge_proxy_in_flight_pool_scope_requests` (gauge): pool-scope requests in flight
//! - `edge_proxy_rejected_requests_total` (counter): ordinary admission rejections
//! - `edge_proxy_rejected_pool_scope_requests_total` (counter): pool-scope admission rejections
//! - `edge_proxy_request_latency_seconds` (histogram): by client, verb, resource, stage
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations behind the `metrics` facade)
//! - Without an installed recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Label, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

const IN_FLIGHT: &str = "edge_proxy_in_flight_requests";
const IN_FLIGHT_POOL_SCOPE: &str = "edge_proxy_in_flight_pool_scope_requests";
const REJECTED: &str = "edge_proxy_rejected_requests_total";
const REJECTED_POOL_SCOPE: &str = "edge_proxy_rejected_pool_scope_requests_total";
const LATENCY: &str = "edge_proxy_request_latency_seconds";

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_gauge!(IN_FLIGHT, "Ordinary requests currently in flight");
            describe_gauge!(IN_FLIGHT_POOL_SCOPE, "Pool-scope metadata requests currently in flight");
            describe_counter!(REJECTED, "Ordinary requests rejected by admission control");
            describe_counter!(REJECTED_POOL_SCOPE, "Pool-scope metadata requests rejected by admission control");
            describe_histogram!(LATENCY, Unit::Seconds, "Request latency through the proxy");
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

/// Labels identifying one request family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLabels {
    pub verb: &'static str,
    pub resource: String,
    pub subresource: String,
    pub client: String,
}

impl RequestLabels {
    fn to_labels(&self) -> Vec<Label> {
        vec![
            Label::new("verb", self.verb),
            Label::new("resource", self.resource.clone()),
            Label::new("subresource", self.subresource.clone()),
            Label::new("client", self.client.clone()),
        ]
    }
}

fn in_flight_name(pool_scope: bool) -> &'static str {
    if pool_scope {
        IN_FLIGHT_POOL_SCOPE
    } else {
        IN_FLIGHT
    }
}

pub fn inc_in_flight(pool_scope: bool, labels: &RequestLabels) {
    gauge!(in_flight_name(pool_scope), labels.to_labels()).increment(1.0);
}

pub fn dec_in_flight(pool_scope: bool, labels: &RequestLabels) {
    gauge!(in_flight_name(pool_scope), labels.to_labels()).decrement(1.0);
}

/// Record a request rejected by admission control.
pub fn record_rejected(pool_scope: bool) {
    let name = if pool_scope {
        REJECTED_POOL_SCOPE
    } else {
        REJECTED
    };
    counter!(name).increment(1);
}

/// Record request latency for a trace stage (`upstream` or `full`).
pub fn record_latency(labels: &RequestLabels, stage: &'static str, duration: Duration) {
    histogram!(
        LATENCY,
        "client" => labels.client.clone(),
        "verb" => labels.verb,
        "resource" => labels.resource.clone(),
        "subresource" => labels.subresource.clone(),
        "stage" => stage
    )
    .record(duration.as_secs_f64());
}
