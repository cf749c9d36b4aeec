//! Configuration subsystem.
//!
//! # Responsibilities
//! - Define the full configuration schema (serde, defaulted per section)
//! - Load configuration from TOML files
//! - Validate loaded configuration before any engine is built

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{CrawlerConfig, PoolConfig, ProbeConfig, RetryConfig};
pub use validation::{validate_config, ValidationError};
