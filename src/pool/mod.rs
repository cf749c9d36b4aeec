//! Warm connection pool.
//!
//! # Data Flow
//! ```text
//! request(method, url)
//!     → select best slot (healthy, under request cap, fastest EWMA)
//!     → execute through that slot's keep-alive client
//!     → record outcome into the slot's ConnectionStats
//!
//! maintenance loop (background)
//!     → TTL exceeded: close and re-warm the slot in place
//!     → idle too long: lightweight keep-alive probe, recorded normally
//! ```
//!
//! # Design Decisions
//! - One keep-alive client per slot; slots are never removed, only re-warmed
//! - A slot goes unhealthy after 3 consecutive failures; any success restores it
//! - When every slot is ineligible, one reset pass revives lightly-failed
//!   slots before the pool reports exhaustion

pub mod pool;
pub mod stats;

pub use pool::{PoolStats, SmartConnectionPool};
pub use stats::ConnectionStats;
