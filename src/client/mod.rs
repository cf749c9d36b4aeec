//! Client façade composing the retry policy, connection pool, and prober.
//!
//! # Data Flow
//! ```text
//! fetch(path)
//!     → absolute URL + request id
//!     → single-attempt closure:
//!         - default User-Agent if absent
//!         - advisory best-node lookup (log/metrics only)
//!         - pooled request, or an ephemeral client when pooling is off
//!     → closure handed to SmartRetry (lucky-user strategy by default)
//!     → body text, or the one terminal error
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Method;
use serde::Serialize;
use url::{Position, Url};
use uuid::Uuid;

use crate::config::CrawlerConfig;
use crate::error::{CrawlerError, CrawlerResult};
use crate::health::{ProberStats, ServerHealthProber};
use crate::pool::{PoolStats, SmartConnectionPool};
use crate::retry::{RetryStats, RetryStrategy, SmartRetry};

/// Timeout for the ephemeral fallback client used when pooling is disabled.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Extra request headers; a User-Agent here overrides the configured one.
    pub headers: HeaderMap,
    /// Query parameters appended to the URL.
    pub query: Vec<(String, String)>,
    /// Backoff strategy for this fetch.
    pub strategy: RetryStrategy,
}

/// Merged client statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlerStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries_count: u64,
    pub success_rate: f64,
    pub connection_pool: Option<PoolStats>,
    pub health_prober: Option<ProberStats>,
    pub retry_policy: Option<RetryStats>,
}

#[derive(Default)]
struct Counters {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    retries_count: AtomicU64,
}

/// Resilient client against one unreliable base URL.
pub struct Crawler {
    base_url: String,
    config: CrawlerConfig,
    user_agent: HeaderValue,
    pool: Option<SmartConnectionPool>,
    prober: Option<ServerHealthProber>,
    retry: Option<SmartRetry>,
    counters: Counters,
}

impl Crawler {
    /// Build a client for `base_url`. Engines are created here per the
    /// enable flags but do no I/O until [`Crawler::initialize`].
    pub fn new(base_url: &str, config: CrawlerConfig) -> CrawlerResult<Self> {
        let trimmed = base_url.trim_end_matches('/');
        let parsed = Url::parse(trimmed)?;
        let domain = parsed
            .host_str()
            .ok_or(CrawlerError::InvalidUrl(url::ParseError::EmptyHost))?
            .to_string();

        let user_agent = HeaderValue::from_str(&config.user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("smart-crawler/0.1"));

        let pool = config
            .enable_connection_pool
            .then(|| SmartConnectionPool::new(parsed.clone(), config.pool.clone()));
        let prober = config
            .enable_health_probe
            .then(|| ServerHealthProber::new(domain, config.probe.clone()));
        let retry = config
            .enable_smart_retry
            .then(|| SmartRetry::new(config.retry.clone()));

        Ok(Self {
            base_url: trimmed.to_string(),
            config,
            user_agent,
            pool,
            prober,
            retry,
            counters: Counters::default(),
        })
    }

    /// Start the enabled engines: warm the pool, then discover and probe the
    /// backend nodes. Idempotent.
    pub async fn initialize(&self) -> CrawlerResult<()> {
        tracing::info!(base_url = %self.base_url, "initializing crawler client");

        if let Some(pool) = &self.pool {
            pool.initialize().await?;
            tracing::info!("connection pool enabled");
        }
        if let Some(prober) = &self.prober {
            prober.start().await;
            tracing::info!("health probe enabled");
        }
        if self.retry.is_some() {
            tracing::info!("smart retry enabled");
        }

        Ok(())
    }

    /// Fetch `path` with GET and default options.
    pub async fn fetch(&self, path: &str) -> CrawlerResult<String> {
        self.fetch_with(Method::GET, path, FetchOptions::default()).await
    }

    /// Fetch `path`, retried under the policy when smart retry is enabled.
    /// Returns the response body, or the single terminal error.
    pub async fn fetch_with(
        &self,
        method: Method,
        path: &str,
        options: FetchOptions,
    ) -> CrawlerResult<String> {
        let request_id = Uuid::new_v4();
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))?;
        if !options.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(options.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        tracing::debug!(%request_id, %url, method = %method, "fetch started");

        let result = match &self.retry {
            Some(retry) => {
                retry
                    .execute_with_callback(
                        options.strategy,
                        || self.execute_once(&method, &url, &options),
                        |attempt, err| {
                            self.counters.retries_count.fetch_add(1, Ordering::SeqCst);
                            tracing::debug!(
                                %request_id,
                                attempt,
                                max_retries = self.config.retry.max_retries,
                                error = %err,
                                "fetch attempt failed"
                            );
                        },
                    )
                    .await
            }
            None => self.execute_once(&method, &url, &options).await,
        };

        match &result {
            Ok(body) => {
                tracing::debug!(%request_id, bytes = body.len(), "fetch succeeded")
            }
            Err(err) => tracing::warn!(%request_id, error = %err, "fetch failed"),
        }
        result
    }

    /// One attempt: headers, advisory node lookup, transport, counters.
    async fn execute_once(
        &self,
        method: &Method,
        url: &Url,
        options: &FetchOptions,
    ) -> CrawlerResult<String> {
        self.counters.total_requests.fetch_add(1, Ordering::SeqCst);

        let mut headers = options.headers.clone();
        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, self.user_agent.clone());
        }

        // Advisory only: the pooled socket is not pinned to this node.
        if let Some(prober) = &self.prober {
            if let Some(node) = prober.best_node() {
                tracing::debug!(
                    ip = %node.ip,
                    score = node.health_score,
                    "best backend node"
                );
            }
        }

        let attempt = async {
            let response = match &self.pool {
                Some(pool) => pool.request(method.clone(), url.clone(), headers).await?,
                None => {
                    let client = reqwest::Client::builder()
                        .no_proxy()
                        .timeout(FALLBACK_TIMEOUT)
                        .build()?;
                    client
                        .request(method.clone(), url.clone())
                        .headers(headers)
                        .send()
                        .await?
                }
            };
            let body = response.text().await.map_err(CrawlerError::from)?;
            Ok::<String, CrawlerError>(body)
        }
        .await;

        match attempt {
            Ok(body) => {
                self.counters.successful_requests.fetch_add(1, Ordering::SeqCst);
                Ok(body)
            }
            Err(err) => {
                self.counters.failed_requests.fetch_add(1, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Merged snapshot of client counters and every engine's stats.
    pub fn stats(&self) -> CrawlerStats {
        let total = self.counters.total_requests.load(Ordering::SeqCst);
        let successful = self.counters.successful_requests.load(Ordering::SeqCst);

        CrawlerStats {
            total_requests: total,
            successful_requests: successful,
            failed_requests: self.counters.failed_requests.load(Ordering::SeqCst),
            retries_count: self.counters.retries_count.load(Ordering::SeqCst),
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                0.0
            },
            connection_pool: self.pool.as_ref().map(|p| p.stats()),
            health_prober: self.prober.as_ref().map(|p| p.stats()),
            retry_policy: self.retry.as_ref().map(|r| r.stats()),
        }
    }

    /// Close the pool, stop the prober, and log the final statistics.
    /// In-flight fetches are not cancelled.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
        if let Some(prober) = &self.prober {
            prober.stop().await;
        }

        match serde_json::to_string(&self.stats()) {
            Ok(stats) => tracing::info!(stats = %stats, "crawler closed"),
            Err(_) => tracing::info!("crawler closed"),
        }
    }
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("base_url", &self.base_url)
            .field("pool", &self.pool.is_some())
            .field("prober", &self.prober.is_some())
            .field("retry", &self.retry.is_some())
            .finish()
    }
}

/// Fetch a single absolute URL through a short-lived client.
pub async fn fetch_once(url: &str, config: CrawlerConfig) -> CrawlerResult<String> {
    let parsed = Url::parse(url)?;
    let base = parsed[..Position::BeforePath].to_string();
    let mut path = parsed[Position::BeforePath..].to_string();
    if path.is_empty() {
        path = "/".to_string();
    }

    let crawler = Crawler::new(&base, config)?;
    crawler.initialize().await?;
    let result = crawler.fetch(&path).await;
    crawler.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> CrawlerConfig {
        CrawlerConfig {
            enable_connection_pool: false,
            enable_health_probe: false,
            ..CrawlerConfig::default()
        }
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let result = Crawler::new("not a url", offline_config());
        assert!(matches!(result, Err(CrawlerError::InvalidUrl(_))));
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let crawler = Crawler::new("http://example.com/", offline_config()).unwrap();
        assert_eq!(crawler.base_url, "http://example.com");
    }

    #[test]
    fn disabled_engines_leave_stats_holes() {
        let crawler = Crawler::new("http://example.com", offline_config()).unwrap();
        let stats = crawler.stats();
        assert!(stats.connection_pool.is_none());
        assert!(stats.health_prober.is_none());
        assert!(stats.retry_policy.is_some());
    }

    #[test]
    fn stats_are_idempotent_without_activity() {
        let crawler = Crawler::new("http://example.com", offline_config()).unwrap();
        assert_eq!(crawler.stats(), crawler.stats());
    }

    #[test]
    fn stats_serialize_as_one_document() {
        let crawler = Crawler::new("http://example.com", CrawlerConfig::default()).unwrap();
        let json = serde_json::to_value(crawler.stats()).unwrap();
        assert_eq!(json["total_requests"], 0);
        assert!(json["connection_pool"].is_object());
        assert!(json["health_prober"].is_object());
        assert!(json["retry_policy"].is_object());
    }

    #[test]
    fn invalid_user_agent_falls_back() {
        let mut config = offline_config();
        config.user_agent = "bad\nagent".to_string();
        let crawler = Crawler::new("http://example.com", config).unwrap();
        assert_eq!(crawler.user_agent, "smart-crawler/0.1");
    }
}
