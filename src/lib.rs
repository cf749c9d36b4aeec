//! Resilient outbound HTTP client for unreliable, load-balanced upstreams.
//!
//! Extracts the maximum success rate from a server that randomly rejects,
//! stalls, or slow-walks requests, without looking like a bot (no synchronized
//! retry storms, no fixed backoff, no round-robin hammering).
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──▶ client::Crawler::fetch(path)
//!                   │
//!                   │  single-attempt closure
//!                   ▼
//!          ┌─────────────────┐   delay / give-up / deadline
//!          │ retry::SmartRetry│◀──────────────────────────────┐
//!          └────────┬────────┘                                │
//!                   │ attempt                                 │ outcome
//!                   ▼                                         │
//!          ┌─────────────────────┐    best slot by latency    │
//!          │ pool::SmartConnection│───────────────────────────┘
//!          │ Pool (N keep-alive)  │──────▶ upstream
//!          └─────────────────────┘
//!
//!          ┌──────────────────────┐   direct-IP probes, advisory only
//!          │ health::ServerHealth  │──────▶ every backend node
//!          │ Prober (DNS discovery)│
//!          └──────────────────────┘
//! ```
//!
//! The prober tracks per-node health independently of the pool; the client
//! consults it for logging/metrics, not for socket routing.

// Core engines
pub mod client;
pub mod health;
pub mod pool;
pub mod retry;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod observability;

pub use client::{fetch_once, Crawler, CrawlerStats, FetchOptions};
pub use config::CrawlerConfig;
pub use error::{CrawlerError, CrawlerResult};
pub use retry::{RetryStrategy, SmartRetry};
