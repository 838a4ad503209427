//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Both backends present, bind and metrics addresses parse, timeouts > 0
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Backend URLs are only required to be non-empty; malformed ones fail at
//!   first use with a 502, like an unreachable backend
//! - Runs after CLI overrides are merged into the file config

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} backend URL is required")]
    MissingBackend(&'static str),

    #[error("invalid listener bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Check a merged configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.newer.trim().is_empty() {
        errors.push(ValidationError::MissingBackend("newer"));
    }
    if config.backends.current.trim().is_empty() {
        errors.push(ValidationError::MissingBackend("current"));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidMetricsAddress(addr.clone()));
        }
    }

    if config.backends.timeout_secs == Some(0) {
        errors.push(ValidationError::ZeroTimeout("backends.timeout_secs"));
    }
    if config.plugin.start_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("plugin.start_timeout_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
