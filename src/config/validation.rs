//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and the remote server URL
//! - Check pool-scope resources and filter names
//! - Bound the admission limit and request timeout to what the runtime accepts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::Semaphore;
use url::Url;

use crate::config::schema::ProxyConfig;
use crate::filter::BUILTIN_FILTERS;

/// Longest accepted `timeouts.request_secs`: one year.
pub const MAX_REQUEST_SECS: u64 = 365 * 24 * 60 * 60;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("remote.server_url: {0}")]
    InvalidServerUrl(String),

    #[error("pool_scope.resources[{0}]: version and resource must be set")]
    IncompletePoolScopeResource(usize),

    #[error("filters.disabled: unknown filter {0:?}")]
    UnknownFilter(String),

    #[error("admission.max_in_flight: {0} exceeds {max}", max = Semaphore::MAX_PERMITS)]
    MaxInFlightTooLarge(i64),

    #[error("timeouts.request_secs: {0} exceeds {max}", max = MAX_REQUEST_SECS)]
    RequestTimeoutTooLarge(u64),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    match Url::parse(&config.remote.server_url) {
        Ok(url) if url.scheme() == "http" && url.host().is_some() => {}
        Ok(url) => errors.push(ValidationError::InvalidServerUrl(format!(
            "unsupported url {}",
            url
        ))),
        Err(e) => errors.push(ValidationError::InvalidServerUrl(e.to_string())),
    }

    for (i, gvr) in config.pool_scope.resources.iter().enumerate() {
        if gvr.version.is_empty() || gvr.resource.is_empty() {
            errors.push(ValidationError::IncompletePoolScopeResource(i));
        }
    }

    let max_in_flight = config.admission.max_in_flight;
    if usize::try_from(max_in_flight).is_ok_and(|limit| limit > Semaphore::MAX_PERMITS) {
        errors.push(ValidationError::MaxInFlightTooLarge(max_in_flight));
    }

    if config.timeouts.request_secs > MAX_REQUEST_SECS {
        errors.push(ValidationError::RequestTimeoutTooLarge(config.timeouts.request_secs));
    }

    for name in &config.filters.disabled {
        if !BUILTIN_FILTERS.contains(&name.as_str()) {
            errors.push(ValidationError::UnknownFilter(name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
