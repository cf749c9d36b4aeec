//! Retry executor with probabilistic give-up and adaptive tuning.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::RetryConfig;
use crate::error::{CrawlerError, CrawlerResult};
use crate::retry::delay::{self, RetryStrategy};
use crate::retry::rng::{RandomSource, ThreadRandom};

/// Adaptive retry policy.
///
/// Runs a retry-safe operation until it succeeds, the attempt budget or the
/// overall wall-clock deadline is spent, or a probabilistic give-up fires.
/// Terminal failures always carry the last underlying error.
pub struct SmartRetry {
    config: RetryConfig,
    state: Mutex<AdaptiveState>,
    rng: Mutex<Box<dyn RandomSource>>,
}

/// Mutable tuning state, adjusted after every recorded outcome.
struct AdaptiveState {
    current_base_delay: f64,
    current_give_up_probability: f64,
    window: VecDeque<bool>,
    total_attempts: u64,
    total_successes: u64,
}

impl AdaptiveState {
    fn new(config: &RetryConfig) -> Self {
        Self {
            current_base_delay: config.base_delay_secs,
            current_give_up_probability: config.give_up_probability,
            window: VecDeque::with_capacity(config.window_size),
            total_attempts: 0,
            total_successes: 0,
        }
    }

    fn record(&mut self, ok: bool, config: &RetryConfig) {
        self.total_attempts += 1;
        if ok {
            self.total_successes += 1;
        }
        self.window.push_back(ok);
        while self.window.len() > config.window_size {
            self.window.pop_front();
        }
        if config.adaptive {
            self.adjust(config);
        }
    }

    /// Tune delay and give-up probability from the recent success rate.
    /// Needs at least 20 samples; the 0.3..0.7 band leaves both untouched.
    fn adjust(&mut self, config: &RetryConfig) {
        if self.window.len() < 20 {
            return;
        }
        let success_rate = self.success_rate();

        if success_rate < 0.3 {
            self.current_base_delay =
                (self.current_base_delay * 1.2).min(config.max_delay_secs / 2.0);
            self.current_give_up_probability =
                (self.current_give_up_probability * 0.8).max(0.05);
        } else if success_rate > 0.7 {
            self.current_base_delay =
                (self.current_base_delay * 0.9).max(config.base_delay_secs);
            self.current_give_up_probability =
                (self.current_give_up_probability * 1.1).min(0.3);
        }
    }

    fn success_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let hits = self.window.iter().filter(|ok| **ok).count();
        hits as f64 / self.window.len() as f64
    }
}

/// Point-in-time snapshot of the retry policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryStats {
    pub total_attempts: u64,
    pub total_successes: u64,
    pub overall_success_rate: f64,
    pub recent_success_rate: f64,
    pub current_base_delay: f64,
    pub current_give_up_probability: f64,
}

impl SmartRetry {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_random(config, Box::new(ThreadRandom))
    }

    /// Build with an explicit random source (seeded or scripted).
    pub fn with_random(config: RetryConfig, rng: Box<dyn RandomSource>) -> Self {
        let state = AdaptiveState::new(&config);
        Self {
            config,
            state: Mutex::new(state),
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` under the policy with the given strategy.
    pub async fn execute<T, F, Fut>(
        &self,
        strategy: RetryStrategy,
        operation: F,
    ) -> CrawlerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CrawlerResult<T>>,
    {
        self.execute_with_callback(strategy, operation, |_, _| {}).await
    }

    /// Run `operation` under the policy, invoking `on_retry(attempt, error)`
    /// after every failed attempt.
    pub async fn execute_with_callback<T, F, Fut, C>(
        &self,
        strategy: RetryStrategy,
        mut operation: F,
        mut on_retry: C,
    ) -> CrawlerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CrawlerResult<T>>,
        C: FnMut(u32, &CrawlerError),
    {
        let started = Instant::now();
        let overall = self.config.overall_timeout();
        let mut last_error: Option<CrawlerError> = None;
        let mut consecutive_failures: u32 = 0;

        for attempt in 1..=self.config.max_retries {
            let elapsed: Duration = started.elapsed();
            if elapsed > overall {
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    budget_secs = self.config.overall_timeout_secs,
                    "overall deadline spent, abandoning retries"
                );
                return Err(CrawlerError::DeadlineExceeded {
                    elapsed,
                    source: last_error.map(Box::new),
                });
            }

            match operation().await {
                Ok(value) => {
                    self.record_outcome(true);
                    return Ok(value);
                }
                Err(err) => {
                    consecutive_failures += 1;
                    self.record_outcome(false);
                    on_retry(attempt, &err);

                    if attempt >= self.config.max_retries {
                        tracing::error!(
                            attempts = attempt,
                            error = %err,
                            "still failing after final attempt"
                        );
                        return Err(CrawlerError::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }

                    if self.should_give_up(consecutive_failures) {
                        tracing::info!(
                            consecutive_failures,
                            "abandoning retries on a give-up roll"
                        );
                        return Err(CrawlerError::GaveUp {
                            failures: consecutive_failures,
                            source: Box::new(err),
                        });
                    }

                    let delay = self.next_delay(attempt, strategy);
                    tracing::debug!(
                        attempt,
                        consecutive_failures,
                        delay_secs = delay,
                        error = %err,
                        "attempt failed, backing off"
                    );
                    last_error = Some(err);
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                }
            }
        }

        // max_retries == 0 is rejected by config validation; treat it as an
        // immediately spent budget.
        Err(CrawlerError::DeadlineExceeded {
            elapsed: started.elapsed(),
            source: last_error.map(Box::new),
        })
    }

    /// Record an attempt outcome into the rolling window.
    fn record_outcome(&self, ok: bool) {
        let mut state = self.state.lock().unwrap();
        state.record(ok, &self.config);
    }

    /// Give-up probability for the given consecutive-failure count:
    /// the (possibly tuned) base, plus 5% per failure beyond the patience
    /// threshold, capped at 80%.
    pub fn give_up_probability_for(&self, consecutive_failures: u32) -> f64 {
        let base = self.state.lock().unwrap().current_give_up_probability;
        if consecutive_failures > self.config.patience_threshold {
            let extra =
                0.05 * f64::from(consecutive_failures - self.config.patience_threshold);
            (base + extra).min(0.8)
        } else {
            base
        }
    }

    fn should_give_up(&self, consecutive_failures: u32) -> bool {
        let total = self.give_up_probability_for(consecutive_failures);
        if total <= 0.0 {
            return false;
        }
        let roll = self.rng.lock().unwrap().roll();
        roll < total
    }

    fn next_delay(&self, attempt: u32, strategy: RetryStrategy) -> f64 {
        let current_base = self.state.lock().unwrap().current_base_delay;
        let mut rng = self.rng.lock().unwrap();
        let raw = delay::base_delay(strategy, attempt, current_base, &self.config, rng.as_mut());
        delay::apply_jitter(raw, self.config.jitter_factor, rng.as_mut())
    }

    /// Success rate over the rolling window.
    pub fn recent_success_rate(&self) -> f64 {
        self.state.lock().unwrap().success_rate()
    }

    pub fn stats(&self) -> RetryStats {
        let state = self.state.lock().unwrap();
        let overall = if state.total_attempts > 0 {
            state.total_successes as f64 / state.total_attempts as f64
        } else {
            0.0
        };
        RetryStats {
            total_attempts: state.total_attempts,
            total_successes: state.total_successes,
            overall_success_rate: overall,
            recent_success_rate: state.success_rate(),
            current_base_delay: state.current_base_delay,
            current_give_up_probability: state.current_give_up_probability,
        }
    }
}

impl std::fmt::Debug for SmartRetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartRetry")
            .field("max_retries", &self.config.max_retries)
            .field("base_delay_secs", &self.config.base_delay_secs)
            .field("adaptive", &self.config.adaptive)
            .finish()
    }
}
