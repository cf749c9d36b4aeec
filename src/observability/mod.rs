//! Logging and metrics.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (binaries call this, the library only logs)
//! - Expose Prometheus metrics and provide low-overhead recording helpers
//!
//! # Metrics
//! - `crawler_requests_total` (counter): pooled requests by outcome
//! - `crawler_request_duration_seconds` (histogram): pooled request latency
//! - `crawler_pool_healthy_connections` (gauge): healthy slots after each
//!   maintenance pass
//! - `crawler_node_available` (gauge): 1=available, 0=not, per backend ip

pub mod logging;
pub mod metrics;
