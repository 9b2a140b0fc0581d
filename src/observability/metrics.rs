//! Metrics collection and exposition.
//!
//! # Metrics
//! - `registries_events_total` (counter): lifecycle notifications by kind
//! - `registries_applies_total` (counter): apply attempts by outcome
//! - `registries_service_reloads_total` (counter): reloads by outcome
//! - `registries_watch_restarts_total` (counter): watch resubscriptions
//! - `registries_resident_mirrors` (gauge): mirrors in the resident config
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - The exporter is optional; disabled unless an address is configured

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_event(kind: &'static str) {
    metrics::counter!("registries_events_total", "kind" => kind).increment(1);
}

pub fn record_apply(outcome: &'static str) {
    metrics::counter!("registries_applies_total", "outcome" => outcome).increment(1);
}

pub fn record_service_reload(outcome: &'static str) {
    metrics::counter!("registries_service_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_watch_restart() {
    metrics::counter!("registries_watch_restarts_total").increment(1);
}

pub fn record_resident_mirrors(count: usize) {
    metrics::gauge!("registries_resident_mirrors").set(count as f64);
}
