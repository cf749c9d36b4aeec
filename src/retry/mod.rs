//! Adaptive retry subsystem.
//!
//! # Data Flow
//! ```text
//! execute(operation)
//!     → attempt loop (policy.rs)
//!         → outcome recorded into rolling window
//!         → give-up roll against failure-scaled probability
//!         → delay per strategy (delay.rs) + symmetric jitter
//!         → sleep, next attempt
//! ```
//!
//! # Design Decisions
//! - Delay math is pure; all randomness flows through one injectable source
//! - The give-up roll models a human abandoning retries, not a budget
//! - Adaptive tuning reacts to the recent success rate, never to single calls

pub mod delay;
pub mod policy;
pub mod rng;

pub use delay::RetryStrategy;
pub use policy::{RetryStats, SmartRetry};
pub use rng::{RandomSource, SeededRandom, ThreadRandom};
