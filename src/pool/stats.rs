//! Per-connection statistics.

use tokio::time::Instant;

/// EWMA decay factor for the smoothed response time.
const EWMA_ALPHA: f64 = 0.3;

/// Consecutive failures after which a connection is marked unhealthy.
pub const UNHEALTHY_AFTER: u32 = 3;

/// Sentinel ordering weight for connections that have not measured a latency
/// yet; sorts them behind every measured one.
pub const UNMEASURED_WEIGHT: f64 = 999.0;

/// Bookkeeping for a single pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub created_at: Instant,
    pub last_used: Instant,
    pub requests_count: u64,
    pub failures_count: u64,
    pub consecutive_failures: u32,
    /// Exponentially weighted moving average of response time, seconds.
    pub avg_response_time: f64,
    pub is_healthy: bool,
}

impl ConnectionStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            created_at: now,
            last_used: now,
            requests_count: 0,
            failures_count: 0,
            consecutive_failures: 0,
            avg_response_time: 0.0,
            is_healthy: true,
        }
    }

    /// Record a completed request.
    pub fn record_success(&mut self, response_time_secs: f64) {
        self.requests_count += 1;
        self.last_used = Instant::now();
        self.consecutive_failures = 0;

        self.avg_response_time =
            EWMA_ALPHA * response_time_secs + (1.0 - EWMA_ALPHA) * self.avg_response_time;

        self.is_healthy = true;
    }

    /// Record a failed request.
    pub fn record_failure(&mut self) {
        self.failures_count += 1;
        self.consecutive_failures += 1;
        self.last_used = Instant::now();

        if self.consecutive_failures >= UNHEALTHY_AFTER {
            self.is_healthy = false;
        }
    }

    /// Force the connection back into rotation after a pool-wide reset.
    pub fn force_healthy(&mut self) {
        self.is_healthy = true;
        self.consecutive_failures = 0;
    }

    /// Response time used for selection ordering; unmeasured sorts worst.
    pub fn effective_response_time(&self) -> f64 {
        if self.avg_response_time > 0.0 {
            self.avg_response_time
        } else {
            UNMEASURED_WEIGHT
        }
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ewma_smooths_response_times() {
        let mut stats = ConnectionStats::new();
        stats.record_success(1.0);
        assert!((stats.avg_response_time - 0.3).abs() < 1e-9);

        stats.record_success(1.0);
        assert!((stats.avg_response_time - 0.51).abs() < 1e-9);
    }

    #[tokio::test]
    async fn three_consecutive_failures_flip_health() {
        let mut stats = ConnectionStats::new();
        stats.record_failure();
        stats.record_failure();
        assert!(stats.is_healthy);

        stats.record_failure();
        assert!(!stats.is_healthy);
        assert_eq!(stats.failures_count, 3);
    }

    #[tokio::test]
    async fn success_resets_failures_and_restores_health() {
        let mut stats = ConnectionStats::new();
        for _ in 0..4 {
            stats.record_failure();
        }
        assert!(!stats.is_healthy);

        stats.record_success(0.2);
        assert!(stats.is_healthy);
        assert_eq!(stats.consecutive_failures, 0);
        // the historical failure count is preserved
        assert_eq!(stats.failures_count, 4);
    }

    #[tokio::test]
    async fn unmeasured_latency_sorts_worst() {
        let fresh = ConnectionStats::new();
        assert_eq!(fresh.effective_response_time(), UNMEASURED_WEIGHT);

        let mut used = ConnectionStats::new();
        used.record_success(0.2);
        assert!(used.effective_response_time() < UNMEASURED_WEIGHT);
    }
}
