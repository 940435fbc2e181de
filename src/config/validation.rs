//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (workers ≥ 1, timeouts > 0, ports valid)
//! - Check backend addresses before they reach the router
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::routing::MAX_BACKENDS;

/// Smallest accepted request buffer.
pub const MIN_BUFFER_SIZE: usize = 512;

/// Longest accepted cache TTL (one year).
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("listener.backlog must be greater than zero")]
    Backlog,

    #[error("listener.tls paths must not be empty")]
    TlsPaths,

    #[error("workers.count must be at least 1")]
    WorkerCount,

    #[error("workers.max_events must be greater than zero")]
    MaxEvents,

    #[error("connection.buffer_size must be at least {min} bytes", min = MIN_BUFFER_SIZE)]
    BufferSize,

    #[error("connection.timeout_secs must be greater than zero")]
    Timeout,

    #[error("connection.relay_chunk_size must be greater than zero")]
    RelayChunk,

    #[error("backend {name:?}: {ip:?} is not an IPv4 literal")]
    BackendIp { name: String, ip: String },

    #[error("backend {0:?}: port must be non-zero")]
    BackendPort(String),

    #[error("{0} backends configured, at most {max} allowed", max = MAX_BACKENDS)]
    TooManyBackends(usize),

    #[error("cache.max_entries must be greater than zero when the cache is enabled")]
    CacheCapacity,

    #[error("cache.default_ttl_secs must be between 1 and {max}", max = MAX_CACHE_TTL_SECS)]
    CacheTtl,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Check every semantic constraint, collecting all violations.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.backlog == 0 {
        errors.push(ValidationError::Backlog);
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::TlsPaths);
        }
    }

    if config.workers.count == 0 {
        errors.push(ValidationError::WorkerCount);
    }
    if config.workers.max_events == 0 {
        errors.push(ValidationError::MaxEvents);
    }

    if config.connection.buffer_size < MIN_BUFFER_SIZE {
        errors.push(ValidationError::BufferSize);
    }
    if config.connection.timeout_secs == 0 {
        errors.push(ValidationError::Timeout);
    }
    if config.connection.relay_chunk_size == 0 {
        errors.push(ValidationError::RelayChunk);
    }

    for backend in &config.backends {
        if backend.ip.parse::<Ipv4Addr>().is_err() {
            errors.push(ValidationError::BackendIp {
                name: backend.name.clone(),
                ip: backend.ip.clone(),
            });
        }
        if backend.port == 0 {
            errors.push(ValidationError::BackendPort(backend.name.clone()));
        }
    }
    if config.backends.len() > MAX_BACKENDS {
        errors.push(ValidationError::TooManyBackends(config.backends.len()));
    }

    if config.cache.enabled && config.cache.max_entries == 0 {
        errors.push(ValidationError::CacheCapacity);
    }
    if config.cache.enabled
        && !(1..=MAX_CACHE_TTL_SECS).contains(&config.cache.default_ttl_secs)
    {
        errors.push(ValidationError::CacheTtl);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
