//! Backoff delay calculation.
//!
//! Pure functions over the retry configuration; every random draw goes
//! through the injected [`RandomSource`].

use serde::{Deserialize, Serialize};

use crate::config::RetryConfig;
use crate::retry::rng::RandomSource;

/// Backoff strategy for the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// `base * exponential_base^(attempt-1)`, capped.
    ExponentialBackoff,
    /// `base * fib(attempt)`, capped.
    Fibonacci,
    /// `base * attempt`, capped.
    LinearJitter,
    /// Slow linear growth plus random hesitation and an occasional long
    /// pause, the way a person retries a busy page.
    #[default]
    LuckyUser,
}

/// Delay in seconds for the given attempt (counted from 1), before jitter.
pub fn base_delay(
    strategy: RetryStrategy,
    attempt: u32,
    current_base: f64,
    config: &RetryConfig,
    rng: &mut dyn RandomSource,
) -> f64 {
    let delay = match strategy {
        RetryStrategy::ExponentialBackoff => {
            current_base * config.exponential_base.powi(attempt as i32 - 1)
        }
        RetryStrategy::Fibonacci => current_base * fibonacci(attempt) as f64,
        RetryStrategy::LinearJitter => current_base * f64::from(attempt),
        RetryStrategy::LuckyUser => {
            let base = current_base * (1.0 + f64::from(attempt - 1) * 0.3);
            let hesitation = rng.range(0.5, 3.0);
            // 10% of the time the "user" waits much longer before trying again
            let patience_bonus = if rng.roll() < 0.1 {
                rng.range(5.0, 15.0)
            } else {
                0.0
            };
            base + hesitation + patience_bonus
        }
    };

    delay.min(config.max_delay_secs)
}

/// Apply symmetric jitter and the 0.1s floor.
pub fn apply_jitter(delay: f64, jitter_factor: f64, rng: &mut dyn RandomSource) -> f64 {
    let jitter = delay * jitter_factor * (rng.roll() - 0.5);
    (delay + jitter).max(0.1)
}

/// Iterative fibonacci with `fib(0) = 0`, `fib(1) = 1`.
pub fn fibonacci(n: u32) -> u64 {
    if n <= 1 {
        return u64::from(n);
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n - 1 {
        let next = a + b;
        a = b;
        b = next;
    }
    b
}
