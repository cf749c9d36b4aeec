//! Node discovery and the probe loop.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ProbeConfig;
use crate::health::node::ServerNode;
use crate::observability::metrics;

/// Default score floor for [`ServerHealthProber::healthy_nodes`].
pub const DEFAULT_HEALTHY_SCORE: f64 = 50.0;

type SharedNode = Arc<Mutex<ServerNode>>;

/// Aggregated prober statistics, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProberStats {
    pub total_nodes: usize,
    pub available_nodes: usize,
    pub congested_nodes: usize,
    pub avg_health_score: f64,
    pub total_requests: u64,
    pub total_failures: u64,
    pub success_rate: f64,
}

/// Discovers the backend IPs behind a domain and tracks each one's health
/// through periodic direct-IP probes.
pub struct ServerHealthProber {
    domain: String,
    config: ProbeConfig,
    nodes: Arc<Mutex<Vec<SharedNode>>>,
    running: AtomicBool,
    shutdown: broadcast::Sender<()>,
    probe_task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl ServerHealthProber {
    pub fn new(domain: impl Into<String>, config: ProbeConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            domain: domain.into(),
            config,
            nodes: Arc::new(Mutex::new(Vec::new())),
            running: AtomicBool::new(false),
            shutdown,
            probe_task: AsyncMutex::new(None),
        }
    }

    /// Resolve the domain, create the node set, and start the probe loop.
    /// Idempotent.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(domain = %self.domain, "starting server health prober");

        self.discover().await;

        let nodes = self.nodes.clone();
        let domain = self.domain.clone();
        let config = self.config.clone();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot: Vec<SharedNode> = nodes.lock().unwrap().clone();
                        probe_all(snapshot, &domain, &config).await;
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("probe loop received shutdown signal, exiting");
                        break;
                    }
                }
            }
        });
        *self.probe_task.lock().await = Some(handle);
    }

    /// Cancel the probe loop and await its termination.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(domain = %self.domain, "stopping server health prober");
        let _ = self.shutdown.send(());
        if let Some(handle) = self.probe_task.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Resolve the domain to IPv4 addresses and track any new ones,
    /// up to the configured node cap.
    pub async fn discover(&self) -> usize {
        let lookup = tokio::net::lookup_host((self.domain.as_str(), self.config.port)).await;
        let addrs = match lookup {
            Ok(addrs) => addrs,
            Err(err) => {
                tracing::error!(domain = %self.domain, error = %err, "node discovery failed");
                return self.nodes.lock().unwrap().len();
            }
        };

        let ips: HashSet<IpAddr> = addrs
            .filter(|addr| addr.is_ipv4())
            .map(|addr| addr.ip())
            .collect();

        let mut nodes = self.nodes.lock().unwrap();
        for ip in ips {
            let known = nodes.iter().any(|n| n.lock().unwrap().ip == ip);
            if known {
                continue;
            }
            if nodes.len() >= self.config.max_nodes {
                tracing::warn!(%ip, max_nodes = self.config.max_nodes, "node cap reached, ignoring address");
                continue;
            }
            nodes.push(Arc::new(Mutex::new(ServerNode::new(ip, self.config.port))));
        }

        tracing::info!(domain = %self.domain, nodes = nodes.len(), "node discovery complete");
        nodes.len()
    }

    /// Run one concurrent probe sweep over every known node.
    pub async fn probe_once(&self) {
        let snapshot: Vec<SharedNode> = self.nodes.lock().unwrap().clone();
        probe_all(snapshot, &self.domain, &self.config).await;
    }

    /// Best node by priority among the available ones; when none are
    /// available, the highest-scored node regardless (degraded mode).
    pub fn best_node(&self) -> Option<ServerNode> {
        let snapshots: Vec<ServerNode> = self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.lock().unwrap().clone())
            .collect();

        let best_available = snapshots
            .iter()
            .filter(|n| n.is_available())
            .max_by(|a, b| a.priority().total_cmp(&b.priority()))
            .cloned();

        best_available.or_else(|| {
            snapshots
                .into_iter()
                .max_by(|a, b| a.health_score.total_cmp(&b.health_score))
        })
    }

    /// Available nodes scoring at least `min_score`.
    pub fn healthy_nodes(&self, min_score: f64) -> Vec<ServerNode> {
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.lock().unwrap().clone())
            .filter(|n| n.is_available() && n.health_score >= min_score)
            .collect()
    }

    pub fn stats(&self) -> ProberStats {
        let snapshots: Vec<ServerNode> = self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.lock().unwrap().clone())
            .collect();

        let total_nodes = snapshots.len();
        let available_nodes = snapshots.iter().filter(|n| n.is_available()).count();
        let congested_nodes = snapshots.iter().filter(|n| n.is_congested).count();
        let avg_health_score = if total_nodes > 0 {
            snapshots.iter().map(|n| n.health_score).sum::<f64>() / total_nodes as f64
        } else {
            0.0
        };
        let total_requests: u64 = snapshots.iter().map(|n| n.total_requests).sum();
        let total_failures: u64 = snapshots.iter().map(|n| n.total_failures).sum();
        let success_rate = if total_requests > 0 {
            (total_requests - total_failures) as f64 / total_requests as f64
        } else {
            0.0
        };

        ProberStats {
            total_nodes,
            available_nodes,
            congested_nodes,
            avg_health_score,
            total_requests,
            total_failures,
            success_rate,
        }
    }
}

impl std::fmt::Debug for ServerHealthProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHealthProber")
            .field("domain", &self.domain)
            .field("nodes", &self.nodes.lock().unwrap().len())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

/// Probe every node concurrently; a slow or dead node cannot delay the rest.
async fn probe_all(nodes: Vec<SharedNode>, domain: &str, config: &ProbeConfig) {
    if nodes.is_empty() {
        return;
    }
    tracing::debug!(nodes = nodes.len(), "probing backend nodes");

    join_all(
        nodes
            .iter()
            .map(|node| probe_node(node.clone(), domain, config)),
    )
    .await;

    let available = nodes
        .iter()
        .filter(|n| n.lock().unwrap().is_available())
        .count();
    tracing::info!(available, total = nodes.len(), "probe sweep complete");
}

/// Probe a single node: the request is pinned to its IP so the DNS/load-
/// balancer boundary cannot re-route it.
async fn probe_node(node: SharedNode, domain: &str, config: &ProbeConfig) {
    let (ip, port) = {
        let n = node.lock().unwrap();
        (n.ip, n.port)
    };

    // a proxy would defeat the per-node pinning
    let client = reqwest::Client::builder()
        .resolve(domain, SocketAddr::new(ip, port))
        .no_proxy()
        .connect_timeout(config.connect_timeout())
        .timeout(config.probe_timeout())
        .danger_accept_invalid_certs(true)
        .build();

    let client = match client {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(%ip, error = %err, "failed to build probe client");
            node.lock().unwrap().record_failure(false);
            return;
        }
    };

    let url = format!("{}://{}:{}/", config.scheme(), domain, port);
    let started = Instant::now();
    let outcome = async {
        let response = client.get(&url).send().await?;
        response.text().await?;
        Ok::<(), reqwest::Error>(())
    }
    .await;
    let elapsed = started.elapsed().as_secs_f64();

    match outcome {
        Ok(()) => {
            let mut n = node.lock().unwrap();
            n.record_success(elapsed);
            tracing::debug!(%ip, elapsed_secs = elapsed, score = n.health_score, "node healthy");
        }
        Err(err) if err.is_timeout() => {
            node.lock().unwrap().record_failure(true);
            tracing::debug!(%ip, "node probe timed out");
        }
        Err(err) => {
            node.lock().unwrap().record_failure(false);
            tracing::debug!(%ip, error = %err, "node probe failed");
        }
    }

    let available = node.lock().unwrap().is_available();
    metrics::record_node_available(ip, available);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prober_with_nodes(ips: &[&str]) -> ServerHealthProber {
        let prober = ServerHealthProber::new("example.invalid", ProbeConfig::default());
        {
            let mut nodes = prober.nodes.lock().unwrap();
            for ip in ips {
                nodes.push(Arc::new(Mutex::new(ServerNode::new(
                    ip.parse().unwrap(),
                    443,
                ))));
            }
        }
        prober
    }

    #[tokio::test]
    async fn best_node_ranks_by_priority() {
        let prober = prober_with_nodes(&["203.0.113.1", "203.0.113.2"]);
        {
            let nodes = prober.nodes.lock().unwrap();
            nodes[0].lock().unwrap().record_success(5.0); // latency penalty 25
            nodes[1].lock().unwrap().record_success(0.2);
        }

        let best = prober.best_node().unwrap();
        assert_eq!(best.ip, "203.0.113.2".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn best_node_degrades_to_highest_score_when_none_available() {
        let prober = prober_with_nodes(&["203.0.113.1", "203.0.113.2"]);
        {
            let nodes = prober.nodes.lock().unwrap();
            for _ in 0..3 {
                nodes[0].lock().unwrap().record_failure(false);
            }
            for _ in 0..3 {
                nodes[1].lock().unwrap().record_failure(true);
            }
        }

        // both quarantined; the plain-failure node kept the higher score
        let best = prober.best_node().unwrap();
        assert_eq!(best.ip, "203.0.113.1".parse::<IpAddr>().unwrap());
        assert!(!best.is_available());
    }

    #[tokio::test]
    async fn best_node_empty_without_discovery() {
        let prober = ServerHealthProber::new("example.invalid", ProbeConfig::default());
        assert!(prober.best_node().is_none());
    }

    #[tokio::test]
    async fn healthy_nodes_filters_on_score_floor() {
        let prober = prober_with_nodes(&["203.0.113.1", "203.0.113.2"]);
        {
            let nodes = prober.nodes.lock().unwrap();
            // drag one node's score to 60 without quarantining it
            let mut n = nodes[0].lock().unwrap();
            n.record_failure(true);
            n.record_failure(true);
            n.record_success(0.1);
            assert_eq!(n.health_score, 65.0);
        }

        assert_eq!(prober.healthy_nodes(DEFAULT_HEALTHY_SCORE).len(), 2);
        assert_eq!(prober.healthy_nodes(90.0).len(), 1);
    }

    #[tokio::test]
    async fn stats_aggregate_over_nodes() {
        let prober = prober_with_nodes(&["203.0.113.1", "203.0.113.2"]);
        {
            let nodes = prober.nodes.lock().unwrap();
            nodes[0].lock().unwrap().record_success(0.2);
            nodes[1].lock().unwrap().record_failure(false);
        }

        let stats = prober.stats();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.available_nodes, 2);
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_failures, 1);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
        assert!((stats.avg_health_score - 95.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn discovery_caps_tracked_nodes() {
        let mut config = ProbeConfig::default();
        config.max_nodes = 1;
        config.port = 80;
        let prober = ServerHealthProber::new("localhost", config);

        let count = prober.discover().await;
        assert!(count <= 1);
    }
}
