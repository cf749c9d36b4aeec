//! Pool management and background maintenance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};
use reqwest::Method;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::config::PoolConfig;
use crate::error::{CrawlerError, CrawlerResult};
use crate::observability::metrics;
use crate::pool::stats::ConnectionStats;

/// Timeout for warming a freshly created connection.
const WARM_UP_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the idle keep-alive probe.
const KEEP_ALIVE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// One pool slot: a keep-alive client plus its bookkeeping.
struct PooledConnection {
    id: usize,
    client: Mutex<reqwest::Client>,
    stats: Mutex<ConnectionStats>,
}

impl PooledConnection {
    fn new(id: usize, client: reqwest::Client) -> Self {
        Self {
            id,
            client: Mutex::new(client),
            stats: Mutex::new(ConnectionStats::new()),
        }
    }

    fn client(&self) -> reqwest::Client {
        self.client.lock().unwrap().clone()
    }
}

/// Aggregated pool statistics, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub pool_size: usize,
    pub healthy_connections: usize,
    pub total_requests: u64,
    pub total_failures: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
}

/// Fixed-size pool of warm keep-alive connections against one base URL.
pub struct SmartConnectionPool {
    target_url: Url,
    config: PoolConfig,
    slots: Mutex<Vec<Arc<PooledConnection>>>,
    initialized: AtomicBool,
    shutdown: broadcast::Sender<()>,
    maintenance: AsyncMutex<Option<JoinHandle<()>>>,
}

impl SmartConnectionPool {
    pub fn new(target_url: Url, config: PoolConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            target_url,
            config,
            slots: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
            shutdown,
            maintenance: AsyncMutex::new(None),
        }
    }

    /// Create and warm every slot, then start the maintenance loop.
    /// Idempotent; warm-up failures are recorded, not fatal.
    pub async fn initialize(&self) -> CrawlerResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!(size = self.config.size, target = %self.target_url, "initializing connection pool");

        let mut slots = Vec::with_capacity(self.config.size);
        for id in 0..self.config.size {
            let client = build_client(&self.config)?;
            slots.push(Arc::new(PooledConnection::new(id, client)));
        }

        for slot in &slots {
            warm_slot(slot, &self.target_url).await;
        }

        *self.slots.lock().unwrap() = slots.clone();
        self.initialized.store(true, Ordering::SeqCst);

        let target = self.target_url.clone();
        let config = self.config.clone();
        let shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            maintenance_loop(slots, target, config, shutdown_rx).await;
        });
        *self.maintenance.lock().await = Some(handle);

        tracing::info!("connection pool ready");
        Ok(())
    }

    /// Execute one request through the best eligible connection.
    /// The outcome is recorded into that connection's stats either way.
    pub async fn request(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
    ) -> CrawlerResult<reqwest::Response> {
        let slot = self.select_connection()?;
        let client = slot.client();

        let started = Instant::now();
        let result = client.request(method, url).headers(headers).send().await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(response) => {
                slot.stats.lock().unwrap().record_success(elapsed);
                metrics::record_request(true, elapsed);
                Ok(response)
            }
            Err(err) => {
                slot.stats.lock().unwrap().record_failure();
                metrics::record_request(false, elapsed);
                tracing::debug!(slot = slot.id, error = %err, "pooled request failed");
                Err(err.into())
            }
        }
    }

    /// Pick the healthiest eligible slot: healthy, under the request cap,
    /// ordered by smoothed latency (unmeasured sorts worst) then usage.
    ///
    /// When nothing qualifies, one reset pass revives slots with fewer than
    /// 10 consecutive failures and retries ignoring the request cap.
    fn select_connection(&self) -> CrawlerResult<Arc<PooledConnection>> {
        let slots = self.slots.lock().unwrap();

        let mut candidates = eligible(&slots, Some(self.config.max_requests_per_connection));

        if candidates.is_empty() {
            tracing::warn!("no healthy connection available, resetting lightly-failed slots");
            for slot in slots.iter() {
                let mut stats = slot.stats.lock().unwrap();
                if stats.consecutive_failures < 10 {
                    stats.force_healthy();
                }
            }
            candidates = eligible(&slots, None);
        }

        if candidates.is_empty() {
            return Err(CrawlerError::PoolExhausted);
        }

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let (_, _, slot) = candidates.swap_remove(0);
        Ok(slot)
    }

    /// Stop the maintenance loop and drop every connection.
    pub async fn close(&self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.maintenance.lock().await.take() {
            let _ = handle.await;
        }
        self.slots.lock().unwrap().clear();
        self.initialized.store(false, Ordering::SeqCst);
        tracing::info!("connection pool closed");
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.slots.lock().unwrap();

        let mut healthy = 0;
        let mut total_requests = 0;
        let mut total_failures = 0;
        let mut measured = Vec::new();
        for slot in slots.iter() {
            let stats = slot.stats.lock().unwrap();
            if stats.is_healthy {
                healthy += 1;
            }
            total_requests += stats.requests_count;
            total_failures += stats.failures_count;
            if stats.avg_response_time > 0.0 {
                measured.push(stats.avg_response_time);
            }
        }

        let success_rate = if total_requests > 0 {
            (total_requests - total_failures.min(total_requests)) as f64 / total_requests as f64
        } else {
            0.0
        };
        let avg_response_time = if measured.is_empty() {
            0.0
        } else {
            measured.iter().sum::<f64>() / measured.len() as f64
        };

        PoolStats {
            pool_size: slots.len(),
            healthy_connections: healthy,
            total_requests,
            total_failures,
            success_rate,
            avg_response_time,
        }
    }
}

impl std::fmt::Debug for SmartConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartConnectionPool")
            .field("target_url", &self.target_url.as_str())
            .field("size", &self.config.size)
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .finish()
    }
}

/// Collect `(latency, usage, slot)` triples for every eligible slot.
fn eligible(
    slots: &[Arc<PooledConnection>],
    request_cap: Option<u64>,
) -> Vec<(f64, u64, Arc<PooledConnection>)> {
    slots
        .iter()
        .filter_map(|slot| {
            let stats = slot.stats.lock().unwrap();
            let under_cap = request_cap.map_or(true, |cap| stats.requests_count < cap);
            if stats.is_healthy && under_cap {
                Some((
                    stats.effective_response_time(),
                    stats.requests_count,
                    slot.clone(),
                ))
            } else {
                None
            }
        })
        .collect()
}

/// Build one keep-alive client for a pool slot.
fn build_client(config: &PoolConfig) -> CrawlerResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    if let Ok(value) =
        HeaderValue::from_str(&format!("timeout={}", config.keep_alive_timeout_secs))
    {
        headers.insert(HeaderName::from_static("keep-alive"), value);
    }

    // connections are managed here; an env-configured proxy would defeat that
    let client = reqwest::Client::builder()
        .default_headers(headers)
        .no_proxy()
        .pool_max_idle_per_host(1)
        .pool_idle_timeout(config.keep_alive_timeout())
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .read_timeout(Duration::from_secs(config.read_timeout_secs))
        .build()?;
    Ok(client)
}

/// Establish the slot's first connection so later requests skip the handshake.
async fn warm_slot(slot: &PooledConnection, target: &Url) {
    let client = slot.client();
    let started = Instant::now();
    let result = client
        .get(target.clone())
        .timeout(WARM_UP_TIMEOUT)
        .send()
        .await;

    match result {
        Ok(response) => {
            let _ = response.text().await;
            let elapsed = started.elapsed().as_secs_f64();
            slot.stats.lock().unwrap().record_success(elapsed);
            tracing::debug!(slot = slot.id, elapsed_secs = elapsed, "slot warmed");
        }
        Err(err) => {
            slot.stats.lock().unwrap().record_failure();
            tracing::warn!(slot = slot.id, error = %err, "slot warm-up failed");
        }
    }
}

async fn maintenance_loop(
    slots: Vec<Arc<PooledConnection>>,
    target: Url,
    config: PoolConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(config.health_check_interval());
    // the immediate first tick is a no-op pass over freshly warmed slots
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                maintenance_pass(&slots, &target, &config).await;
            }
            _ = shutdown.recv() => {
                tracing::debug!("pool maintenance loop received shutdown signal, exiting");
                break;
            }
        }
    }
}

/// One maintenance sweep: re-warm slots past their TTL, probe idle ones.
async fn maintenance_pass(slots: &[Arc<PooledConnection>], target: &Url, config: &PoolConfig) {
    let now = Instant::now();

    for slot in slots {
        let (age, idle) = {
            let stats = slot.stats.lock().unwrap();
            (
                now.duration_since(stats.created_at),
                now.duration_since(stats.last_used),
            )
        };

        if age > config.conn_ttl() {
            tracing::info!(slot = slot.id, age_secs = age.as_secs(), "connection exceeded ttl, recreating in place");
            match build_client(config) {
                Ok(client) => {
                    *slot.client.lock().unwrap() = client;
                    *slot.stats.lock().unwrap() = ConnectionStats::new();
                    warm_slot(slot, target).await;
                }
                Err(err) => {
                    tracing::error!(slot = slot.id, error = %err, "failed to rebuild connection");
                }
            }
            continue;
        }

        if idle > config.keep_alive_timeout() {
            let client = slot.client();
            let started = Instant::now();
            let result = client
                .head(target.clone())
                .timeout(KEEP_ALIVE_PROBE_TIMEOUT)
                .send()
                .await;
            let elapsed = started.elapsed().as_secs_f64();
            match result {
                Ok(_) => slot.stats.lock().unwrap().record_success(elapsed),
                Err(_) => slot.stats.lock().unwrap().record_failure(),
            }
            tracing::debug!(slot = slot.id, "idle keep-alive probe sent");
        }
    }

    let healthy = slots
        .iter()
        .filter(|slot| slot.stats.lock().unwrap().is_healthy)
        .count();
    metrics::record_pool_health(healthy, slots.len());
    tracing::debug!(healthy, total = slots.len(), "pool maintenance pass complete");
}
