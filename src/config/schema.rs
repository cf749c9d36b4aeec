//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section is defaulted so a partial TOML file (or none at all) yields
//! a working client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the crawler client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Route requests through the warm connection pool.
    pub enable_connection_pool: bool,

    /// Discover and probe individual backend nodes behind the target domain.
    pub enable_health_probe: bool,

    /// Wrap each fetch in the adaptive retry policy.
    pub enable_smart_retry: bool,

    /// User-Agent sent when the caller did not provide one.
    pub user_agent: String,

    /// Retry policy settings.
    pub retry: RetryConfig,

    /// Connection pool settings.
    pub pool: PoolConfig,

    /// Node health probe settings.
    pub probe: ProbeConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            enable_connection_pool: true,
            enable_health_probe: true,
            enable_smart_retry: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                         AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            retry: RetryConfig::default(),
            pool: PoolConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per fetch.
    pub max_retries: u32,

    /// Base delay between attempts in seconds.
    pub base_delay_secs: f64,

    /// Upper bound for any computed delay in seconds.
    pub max_delay_secs: f64,

    /// Symmetric jitter factor applied to every delay (0..=1).
    pub jitter_factor: f64,

    /// Exponent base for the exponential backoff strategy.
    pub exponential_base: f64,

    /// Wall-clock budget across all attempts in seconds.
    pub overall_timeout_secs: f64,

    /// Probability of abandoning after a failed attempt.
    pub give_up_probability: f64,

    /// Consecutive failures tolerated before the give-up probability grows.
    pub patience_threshold: u32,

    /// Adjust delay and give-up probability from the observed success rate.
    pub adaptive: bool,

    /// Number of recent outcomes kept for the success-rate window.
    pub window_size: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay_secs: 1.0,
            max_delay_secs: 60.0,
            jitter_factor: 0.5,
            exponential_base: 2.0,
            overall_timeout_secs: 300.0,
            give_up_probability: 0.15,
            patience_threshold: 5,
            adaptive: true,
            window_size: 100,
        }
    }
}

impl RetryConfig {
    /// Overall wall-clock budget as a `Duration`.
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.overall_timeout_secs)
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of persistent connections kept warm.
    pub size: usize,

    /// Requests served by one connection before it is passed over.
    pub max_requests_per_connection: u64,

    /// Connection lifetime before it is closed and re-warmed in place.
    pub conn_ttl_secs: u64,

    /// Interval of the background maintenance pass.
    pub health_check_interval_secs: u64,

    /// Idle time after which a keep-alive probe is sent.
    pub keep_alive_timeout_secs: u64,

    /// Connection establishment timeout.
    pub connect_timeout_secs: u64,

    /// Total per-request timeout.
    pub request_timeout_secs: u64,

    /// Socket read timeout.
    pub read_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 5,
            max_requests_per_connection: 100,
            conn_ttl_secs: 300,
            health_check_interval_secs: 30,
            keep_alive_timeout_secs: 60,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            read_timeout_secs: 20,
        }
    }
}

impl PoolConfig {
    pub fn conn_ttl(&self) -> Duration {
        Duration::from_secs(self.conn_ttl_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout_secs)
    }
}

/// Node health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Interval between probe sweeps in seconds.
    pub interval_secs: u64,

    /// Maximum number of backend nodes tracked.
    pub max_nodes: usize,

    /// Port probed on every discovered node.
    pub port: u16,

    /// Per-probe connection timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Per-probe total timeout in seconds.
    pub probe_timeout_secs: u64,

    /// Probe over HTTPS. Disable for plain-HTTP staging targets.
    pub use_https: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_nodes: 10,
            port: 443,
            connect_timeout_secs: 5,
            probe_timeout_secs: 10,
            use_https: true,
        }
    }
}

impl ProbeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// URL scheme used for probe requests.
    pub fn scheme(&self) -> &'static str {
        if self.use_https {
            "https"
        } else {
            "http"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CrawlerConfig::default();
        assert!(config.enable_connection_pool);
        assert!(config.enable_health_probe);
        assert!(config.enable_smart_retry);
        assert_eq!(config.retry.max_retries, 10);
        assert_eq!(config.retry.base_delay_secs, 1.0);
        assert_eq!(config.retry.give_up_probability, 0.15);
        assert_eq!(config.pool.size, 5);
        assert_eq!(config.pool.max_requests_per_connection, 100);
        assert_eq!(config.probe.interval_secs, 30);
        assert_eq!(config.probe.port, 443);
    }

    #[test]
    fn user_agent_is_single_line() {
        let config = CrawlerConfig::default();
        assert!(!config.user_agent.contains('\n'));
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: CrawlerConfig = toml::from_str(
            r#"
            enable_health_probe = false

            [retry]
            max_retries = 3
            "#,
        )
        .unwrap();
        assert!(!config.enable_health_probe);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.max_delay_secs, 60.0);
        assert_eq!(config.pool.size, 5);
    }
}
