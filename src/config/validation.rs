//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and URLs parse
//! - Validate value ranges (timeouts > 0, quotas > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::Semaphore;
use url::Url;

use crate::config::schema::RouterConfig;

/// Longest accepted cache lifetime or sweep period: one day.
pub const MAX_CACHE_SECS: u64 = 24 * 60 * 60;

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }

    if let Err(e) = Url::parse(&config.exchange.base_url) {
        errors.push(ValidationError::new("exchange.base_url", e.to_string()));
    }
    if !(1..=5000).contains(&config.exchange.depth_limit) {
        errors.push(ValidationError::new("exchange.depth_limit", "must be in 1..=5000"));
    }

    let pipeline = &config.pipeline;
    if pipeline.timeout_ms == 0 {
        errors.push(ValidationError::new("pipeline.timeout_ms", "must be > 0"));
    }
    match pipeline.max_concurrent {
        Some(0) => errors.push(ValidationError::new(
            "pipeline.max_concurrent",
            "must be > 0 when set",
        )),
        Some(max) if max > Semaphore::MAX_PERMITS => errors.push(ValidationError::new(
            "pipeline.max_concurrent",
            format!("must be <= {}", Semaphore::MAX_PERMITS),
        )),
        _ => {}
    }
    if pipeline.retry.max_delay_ms < pipeline.retry.base_delay_ms {
        errors.push(ValidationError::new(
            "pipeline.retry.max_delay_ms",
            "must not be below base_delay_ms",
        ));
    }
    for (key, quota) in &pipeline.rate_limit.quotas {
        if quota.limit == 0 {
            errors.push(ValidationError::new(
                format!("pipeline.rate_limit.quotas.{key}.limit"),
                "must be > 0",
            ));
        }
        if quota.interval_ms == 0 {
            errors.push(ValidationError::new(
                format!("pipeline.rate_limit.quotas.{key}.interval_ms"),
                "must be > 0",
            ));
        }
    }
    if pipeline.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "pipeline.circuit_breaker.failure_threshold",
            "must be > 0",
        ));
    }

    if !(1..=MAX_CACHE_SECS).contains(&config.cache.ttl_secs) {
        errors.push(ValidationError::new(
            "cache.ttl_secs",
            format!("must be in 1..={MAX_CACHE_SECS}"),
        ));
    }
    if !(1..=MAX_CACHE_SECS).contains(&config.cache.sweep_interval_secs) {
        errors.push(ValidationError::new(
            "cache.sweep_interval_secs",
            format!("must be in 1..={MAX_CACHE_SECS}"),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
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
    use crate::resilience::{QuotaConfig, QuotaKind};
    use std::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = RouterConfig::default();
        config.server.bind_address = "not-an-address".into();
        config.exchange.base_url = "::".into();
        config.exchange.depth_limit = 0;
        config.pipeline.max_concurrent = Some(0);
        config.pipeline.circuit_breaker.failure_threshold = 0;
        config.pipeline.rate_limit.quotas.insert(
            "broken".into(),
            QuotaConfig::new(0, Duration::ZERO, QuotaKind::Orders),
        );

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "server.bind_address",
                "exchange.base_url",
                "exchange.depth_limit",
                "pipeline.max_concurrent",
                "pipeline.rate_limit.quotas.broken.limit",
                "pipeline.rate_limit.quotas.broken.interval_ms",
                "pipeline.circuit_breaker.failure_threshold",
            ]
        );
    }

    #[test]
    fn test_max_concurrent_bounded_by_semaphore() {
        let mut config = RouterConfig::default();
        config.pipeline.max_concurrent = Some(Semaphore::MAX_PERMITS);
        assert!(validate_config(&config).is_ok());

        config.pipeline.max_concurrent = Some(Semaphore::MAX_PERMITS + 1);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "pipeline.max_concurrent");
    }

    #[test]
    fn test_cache_lifetimes_are_bounded() {
        let mut config = RouterConfig::default();
        config.cache.ttl_secs = MAX_CACHE_SECS;
        config.cache.sweep_interval_secs = MAX_CACHE_SECS;
        assert!(validate_config(&config).is_ok());

        config.cache.ttl_secs = i64::MAX as u64;
        config.cache.sweep_interval_secs = u64::MAX;
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["cache.ttl_secs", "cache.sweep_interval_secs"]);
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = RouterConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
