//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_connections_active` (gauge): sessions currently registered
//! - `relay_messages_sent_total` (counter): delivery attempts by route
//! - `relay_routing_failures_total` (counter): failed routing calls by operation
//! - `relay_host_reboots_total` (counter): listener reboots
//! - `relay_config_reloads_total` (counter): published configuration snapshots
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connections(active: usize) {
    metrics::gauge!("relay_connections_active").set(active as f64);
}

pub fn record_delivery(route: &'static str, attempts: usize) {
    metrics::counter!("relay_messages_sent_total", "route" => route).increment(attempts as u64);
}

pub fn record_routing_failure(operation: &'static str) {
    metrics::counter!("relay_routing_failures_total", "operation" => operation).increment(1);
}

pub fn record_reboot() {
    metrics::counter!("relay_host_reboots_total").increment(1);
}

pub fn record_config_reload() {
    metrics::counter!("relay_config_reloads_total").increment(1);
}
