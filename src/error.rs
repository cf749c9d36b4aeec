//! Crate-wide error type.
//!
//! Sub-component failures (one probe, one pooled request) are folded into
//! state updates locally; only the retry layer's terminal failure reaches the
//! caller. `fetch` either returns body text or exactly one of these.

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate.
pub type CrawlerResult<T> = Result<T, CrawlerError>;

/// Errors surfaced by the client and its engines.
#[derive(Debug, Error)]
pub enum CrawlerError {
    /// Transient transport failure: connect refused/reset, DNS failure,
    /// read timeout. Always retryable.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// No eligible pooled connection, even after the one-shot health reset.
    #[error("connection pool has no usable connection")]
    PoolExhausted,

    /// All retry attempts were used up. Carries the last underlying error.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<CrawlerError>,
    },

    /// The probabilistic give-up fired before the attempt budget ran out.
    #[error("gave up after {failures} consecutive failures")]
    GaveUp {
        failures: u32,
        #[source]
        source: Box<CrawlerError>,
    },

    /// The overall wall-clock budget across all attempts was spent.
    #[error("overall deadline exceeded after {elapsed:?}")]
    DeadlineExceeded {
        elapsed: Duration,
        #[source]
        source: Option<Box<CrawlerError>>,
    },

    /// The base URL (or a joined path) did not parse.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl CrawlerError {
    /// The underlying attempt error behind a terminal retry failure, if any.
    pub fn last_attempt_error(&self) -> Option<&CrawlerError> {
        match self {
            CrawlerError::RetriesExhausted { source, .. } => Some(source),
            CrawlerError::GaveUp { source, .. } => Some(source),
            CrawlerError::DeadlineExceeded { source, .. } => source.as_deref(),
            _ => None,
        }
    }
}
