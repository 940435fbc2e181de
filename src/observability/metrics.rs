//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (connections, bytes, cache, backend dials)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_connections_accepted_total` (counter)
//! - `proxy_connections_closed_total` (counter): by close reason
//! - `proxy_active_connections` (gauge): current connection count
//! - `proxy_bytes_relayed_total` (counter): by direction
//! - `proxy_cache_lookups_total` (counter): hit or miss
//! - `proxy_backend_dials_total` (counter): success or failure
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Recorded through the `metrics` facade; without an installed exporter
//!   every call is a no-op

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("proxy_connections_accepted_total", "Client connections accepted");
    describe_counter!("proxy_connections_closed_total", "Connections closed, by reason");
    describe_gauge!("proxy_active_connections", "Connections currently open");
    describe_counter!("proxy_bytes_relayed_total", "Bytes relayed, by direction");
    describe_counter!("proxy_cache_lookups_total", "Response cache lookups, by result");
    describe_counter!("proxy_backend_dials_total", "Backend connection attempts, by result");
}

pub fn record_accept() {
    counter!("proxy_connections_accepted_total").increment(1);
    gauge!("proxy_active_connections").increment(1.0);
}

/// Record a closed connection and the bytes it moved.
pub fn record_close(reason: &'static str, bytes_to_backend: u64, bytes_to_client: u64) {
    counter!("proxy_connections_closed_total", "reason" => reason).increment(1);
    gauge!("proxy_active_connections").decrement(1.0);
    counter!("proxy_bytes_relayed_total", "direction" => "to_backend").increment(bytes_to_backend);
    counter!("proxy_bytes_relayed_total", "direction" => "to_client").increment(bytes_to_client);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("proxy_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_backend_dial(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("proxy_backend_dials_total", "result" => result).increment(1);
}
