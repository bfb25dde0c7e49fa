//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tunnel_requests_total` (counter): requests by method, status
//! - `tunnel_request_duration_seconds` (histogram): handler latency
//! - `tunnel_sessions_active` (gauge): sessions in the store
//! - `tunnel_sessions_opened_total` (counter)
//! - `tunnel_sessions_closed_total` (counter): by reason (client, idle, shutdown)
//! - `tunnel_bytes_total` (counter): by direction (upstream, downstream)
//! - `tunnel_dial_failures_total` (counter)
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "tunnel_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("tunnel_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_session_opened(active: usize) {
    counter!("tunnel_sessions_opened_total").increment(1);
    gauge!("tunnel_sessions_active").set(active as f64);
}

pub fn record_session_closed(reason: &'static str, active: usize) {
    counter!("tunnel_sessions_closed_total", "reason" => reason).increment(1);
    gauge!("tunnel_sessions_active").set(active as f64);
}

pub fn record_bytes(direction: &'static str, bytes: usize) {
    counter!("tunnel_bytes_total", "direction" => direction).increment(bytes as u64);
}

pub fn record_dial_failure() {
    counter!("tunnel_dial_failures_total").increment(1);
}
