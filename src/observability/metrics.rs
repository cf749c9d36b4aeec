//! Metrics collection and exposition.

use std::net::{IpAddr, SocketAddr};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Recording helpers below work regardless; without an installed exporter
/// they fall through to the no-op recorder.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(%addr, "metrics exporter listening"),
        Err(err) => tracing::error!(error = %err, "failed to install metrics exporter"),
    }
}

/// Record one pooled request outcome and its duration.
pub fn record_request(success: bool, duration_secs: f64) {
    let outcome = if success { "success" } else { "failure" };
    counter!("crawler_requests_total", "outcome" => outcome).increment(1);
    histogram!("crawler_request_duration_seconds").record(duration_secs);
}

/// Record the healthy-slot count after a pool maintenance pass.
pub fn record_pool_health(healthy: usize, total: usize) {
    gauge!("crawler_pool_healthy_connections").set(healthy as f64);
    gauge!("crawler_pool_size").set(total as f64);
}

/// Record a node's availability after a probe.
pub fn record_node_available(ip: IpAddr, available: bool) {
    gauge!("crawler_node_available", "ip" => ip.to_string())
        .set(if available { 1.0 } else { 0.0 });
}
