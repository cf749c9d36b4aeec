//! Configuration validation.
//!
//! Runs before any engine is built and reports every violation at once.

use thiserror::Error;

use crate::config::schema::CrawlerConfig;

/// A single configuration violation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("pool.size must be at least 1")]
    PoolSizeZero,

    #[error("retry.max_retries must be at least 1")]
    MaxRetriesZero,

    #[error("retry.jitter_factor {0} is outside 0..=1")]
    JitterOutOfRange(f64),

    #[error("retry.give_up_probability {0} is outside 0..=1")]
    GiveUpOutOfRange(f64),

    #[error("retry.exponential_base {0} must be at least 1")]
    ExponentialBaseTooSmall(f64),

    #[error("retry.max_delay_secs {max} is below retry.base_delay_secs {base}")]
    DelayBoundsInverted { base: f64, max: f64 },

    #[error("retry.{field} must be positive")]
    NonPositiveRetryDuration { field: &'static str },

    #[error("probe.max_nodes must be at least 1")]
    MaxNodesZero,

    #[error("{section}.{field} must be positive")]
    ZeroTimeout {
        section: &'static str,
        field: &'static str,
    },
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &CrawlerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.pool.size == 0 {
        errors.push(ValidationError::PoolSizeZero);
    }
    if config.retry.max_retries == 0 {
        errors.push(ValidationError::MaxRetriesZero);
    }
    if !(0.0..=1.0).contains(&config.retry.jitter_factor) {
        errors.push(ValidationError::JitterOutOfRange(config.retry.jitter_factor));
    }
    if !(0.0..=1.0).contains(&config.retry.give_up_probability) {
        errors.push(ValidationError::GiveUpOutOfRange(
            config.retry.give_up_probability,
        ));
    }
    if config.retry.exponential_base < 1.0 {
        errors.push(ValidationError::ExponentialBaseTooSmall(
            config.retry.exponential_base,
        ));
    }
    if config.retry.max_delay_secs < config.retry.base_delay_secs {
        errors.push(ValidationError::DelayBoundsInverted {
            base: config.retry.base_delay_secs,
            max: config.retry.max_delay_secs,
        });
    }
    if config.retry.base_delay_secs <= 0.0 {
        errors.push(ValidationError::NonPositiveRetryDuration {
            field: "base_delay_secs",
        });
    }
    if config.retry.overall_timeout_secs <= 0.0 {
        errors.push(ValidationError::NonPositiveRetryDuration {
            field: "overall_timeout_secs",
        });
    }
    if config.probe.max_nodes == 0 {
        errors.push(ValidationError::MaxNodesZero);
    }

    for (section, field, value) in [
        ("pool", "connect_timeout_secs", config.pool.connect_timeout_secs),
        ("pool", "request_timeout_secs", config.pool.request_timeout_secs),
        (
            "pool",
            "health_check_interval_secs",
            config.pool.health_check_interval_secs,
        ),
        ("probe", "interval_secs", config.probe.interval_secs),
        ("probe", "connect_timeout_secs", config.probe.connect_timeout_secs),
        ("probe", "probe_timeout_secs", config.probe.probe_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout { section, field });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&CrawlerConfig::default()).is_ok());
    }

    #[test]
    fn collects_multiple_violations() {
        let mut config = CrawlerConfig::default();
        config.pool.size = 0;
        config.retry.jitter_factor = 1.5;
        config.retry.give_up_probability = -0.1;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::PoolSizeZero));
        assert!(errors.contains(&ValidationError::JitterOutOfRange(1.5)));
    }

    #[test]
    fn inverted_delay_bounds_rejected() {
        let mut config = CrawlerConfig::default();
        config.retry.base_delay_secs = 10.0;
        config.retry.max_delay_secs = 5.0;

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::DelayBoundsInverted { .. }
        ));
    }
}
