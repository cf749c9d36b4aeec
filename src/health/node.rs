//! Per-node health state and scoring.
//!
//! All arithmetic here is pure; the prober feeds probe outcomes in and the
//! client reads snapshots out.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::Duration;

use tokio::time::Instant;

/// Latencies kept for the per-node rolling mean.
const LATENCY_WINDOW: usize = 10;

/// Consecutive probe failures before a node is declared dead and quarantined.
pub const QUARANTINE_AFTER: u32 = 3;

/// How long a dead node is excluded from selection.
pub const QUARANTINE_DURATION: Duration = Duration::from_secs(60);

/// Consecutive probe successes that lift an elapsed quarantine early.
pub const RELEASE_AFTER: u32 = 3;

/// Nodes scoring below this are unavailable regardless of liveness.
pub const MIN_AVAILABLE_SCORE: f64 = 30.0;

/// A single latency above this marks the node congested.
const CONGESTED_LATENCY_SECS: f64 = 10.0;

/// A rolling mean below this clears the congestion flag.
const CLEAR_CONGESTION_MEAN_SECS: f64 = 3.0;

const SUCCESS_REWARD: f64 = 5.0;
const FAILURE_PENALTY: f64 = 10.0;
const TIMEOUT_PENALTY: f64 = 20.0;

/// One concrete backend IP behind the target domain.
#[derive(Debug, Clone)]
pub struct ServerNode {
    pub ip: IpAddr,
    pub port: u16,

    /// Bounded reliability proxy, 0..=100.
    pub health_score: f64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,

    /// Mean of the bounded latency window, seconds.
    pub avg_response_time: f64,
    response_times: VecDeque<f64>,

    pub total_requests: u64,
    pub total_failures: u64,
    pub last_check: Option<Instant>,
    pub last_success: Option<Instant>,

    pub is_alive: bool,
    pub is_congested: bool,
    pub quarantine_until: Option<Instant>,
}

impl ServerNode {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            ip,
            port,
            health_score: 100.0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            avg_response_time: 0.0,
            response_times: VecDeque::with_capacity(LATENCY_WINDOW),
            total_requests: 0,
            total_failures: 0,
            last_check: None,
            last_success: None,
            is_alive: true,
            is_congested: false,
            quarantine_until: None,
        }
    }

    /// Fold a measured latency into the window and the congestion flag.
    fn update_response_time(&mut self, response_time_secs: f64) {
        self.response_times.push_back(response_time_secs);
        while self.response_times.len() > LATENCY_WINDOW {
            self.response_times.pop_front();
        }
        self.avg_response_time =
            self.response_times.iter().sum::<f64>() / self.response_times.len() as f64;

        if response_time_secs > CONGESTED_LATENCY_SECS {
            self.is_congested = true;
        } else if self.avg_response_time < CLEAR_CONGESTION_MEAN_SECS {
            self.is_congested = false;
        }
    }

    /// Record a successful probe.
    pub fn record_success(&mut self, response_time_secs: f64) {
        let now = Instant::now();
        self.total_requests += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
        self.last_check = Some(now);
        self.last_success = Some(now);

        self.update_response_time(response_time_secs);

        self.health_score = (self.health_score + SUCCESS_REWARD).min(100.0);
        self.is_alive = true;

        if self.consecutive_successes >= RELEASE_AFTER {
            self.quarantine_until = None;
        }
    }

    /// Record a failed probe; timeouts cost more and imply congestion.
    pub fn record_failure(&mut self, is_timeout: bool) {
        self.total_requests += 1;
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        self.last_check = Some(Instant::now());

        let penalty = if is_timeout {
            self.is_congested = true;
            TIMEOUT_PENALTY
        } else {
            FAILURE_PENALTY
        };
        self.health_score = (self.health_score - penalty).max(0.0);

        if self.consecutive_failures >= QUARANTINE_AFTER {
            self.is_alive = false;
            self.quarantine_until = Some(Instant::now() + QUARANTINE_DURATION);
        }
    }

    /// Whether the node may serve traffic right now.
    pub fn is_available(&self) -> bool {
        if let Some(until) = self.quarantine_until {
            if Instant::now() < until {
                return false;
            }
        }
        if self.health_score < MIN_AVAILABLE_SCORE {
            return false;
        }
        self.is_alive
    }

    /// Ranking score, higher is better: health minus latency, congestion,
    /// and failure-rate penalties.
    pub fn priority(&self) -> f64 {
        let mut score = self.health_score;

        if self.avg_response_time > 0.0 {
            score -= (self.avg_response_time * 5.0).min(50.0);
        }
        if self.is_congested {
            score -= 30.0;
        }
        if self.total_requests > 0 {
            let failure_rate = self.total_failures as f64 / self.total_requests as f64;
            score -= failure_rate * 50.0;
        }

        score.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> ServerNode {
        ServerNode::new("203.0.113.7".parse().unwrap(), 443)
    }

    #[tokio::test(start_paused = true)]
    async fn three_failures_quarantine_the_node() {
        let mut n = node();
        n.record_failure(false);
        n.record_failure(false);
        assert!(n.is_alive);
        assert!(n.is_available());

        n.record_failure(false);
        assert!(!n.is_alive);
        assert!(n.quarantine_until.is_some());
        assert!(!n.is_available());
        assert_eq!(n.health_score, 70.0);
    }

    #[tokio::test(start_paused = true)]
    async fn quarantine_expiry_alone_does_not_revive() {
        let mut n = node();
        for _ in 0..3 {
            n.record_failure(false);
        }

        tokio::time::advance(Duration::from_secs(61)).await;
        // quarantine elapsed, but the node is still flagged dead
        assert!(!n.is_available());

        n.record_success(0.5);
        assert!(n.is_alive);
        assert!(n.is_available());
        assert_eq!(n.health_score, 75.0);
    }

    #[tokio::test(start_paused = true)]
    async fn low_score_blocks_availability_even_when_alive() {
        let mut n = node();
        // alternate so consecutive failures never reach quarantine
        for _ in 0..20 {
            n.record_failure(true);
            n.record_failure(true);
            n.record_success(0.1);
        }
        // timeouts drain the score faster than successes restore it
        assert!(n.health_score < MIN_AVAILABLE_SCORE);
        assert!(n.is_alive);
        assert!(!n.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn three_successes_lift_quarantine_early() {
        let mut n = node();
        for _ in 0..3 {
            n.record_failure(false);
        }
        assert!(n.quarantine_until.is_some());

        n.record_success(0.1);
        n.record_success(0.1);
        assert!(n.quarantine_until.is_some());
        n.record_success(0.1);
        assert!(n.quarantine_until.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_penalty_is_heavier_and_marks_congestion() {
        let mut n = node();
        n.record_failure(true);
        assert_eq!(n.health_score, 80.0);
        assert!(n.is_congested);

        let mut m = node();
        m.record_failure(false);
        assert_eq!(m.health_score, 90.0);
        assert!(!m.is_congested);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_marks_congestion_and_fast_mean_clears_it() {
        let mut n = node();
        n.record_success(12.0);
        assert!(n.is_congested);

        // enough fast samples pull the rolling mean under the threshold
        for _ in 0..10 {
            n.record_success(0.2);
        }
        assert!(!n.is_congested);
        assert!(n.avg_response_time < 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_window_is_bounded() {
        let mut n = node();
        for _ in 0..5 {
            n.record_success(9.0);
        }
        for _ in 0..10 {
            n.record_success(1.0);
        }
        // only the last 10 samples count
        assert_eq!(n.avg_response_time, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn score_saturates_at_both_ends() {
        let mut n = node();
        n.record_success(0.1);
        assert_eq!(n.health_score, 100.0);

        for _ in 0..2 {
            n.record_failure(false);
        }
        for _ in 0..20 {
            n.record_success(0.1);
        }
        assert_eq!(n.health_score, 100.0);

        let mut m = node();
        for _ in 0..12 {
            m.record_failure(true);
        }
        assert_eq!(m.health_score, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn priority_subtracts_latency_congestion_and_failures() {
        let mut n = node();
        n.record_success(2.0); // avg 2.0 → latency penalty 10
        assert_eq!(n.priority(), 90.0);

        n.is_congested = true;
        assert_eq!(n.priority(), 60.0);

        n.total_requests = 10;
        n.total_failures = 5; // failure-rate penalty 25
        assert_eq!(n.priority(), 35.0);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_penalty_caps_at_fifty() {
        let mut n = node();
        n.avg_response_time = 30.0;
        assert_eq!(n.priority(), 50.0);
    }
}
