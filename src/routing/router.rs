//! Backend lookup by request path.
//!
//! # Responsibilities
//! - Register backends with an optional path prefix
//! - Resolve backend addresses once, at registration
//! - Select the backend for a request path
//!
//! # Design Decisions
//! - Append-only at startup, read-only while serving; each worker holds its
//!   own clone
//! - O(n) scan in registration order; first prefix match wins
//! - Falls back to the first prefix-less entry, then to an explicit error

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use thiserror::Error;

use crate::config::BackendConfig;
use crate::routing::matcher::{Matcher, PathPrefixMatcher};

/// Maximum number of registered backends.
pub const MAX_BACKENDS: usize = 10;

/// Errors raised by backend registration and selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("invalid backend address {0:?}")]
    InvalidAddress(String),

    #[error("backend table is full ({0} entries)")]
    TooManyBackends(usize),

    #[error("no backend available for path {0:?}")]
    NoBackendAvailable(String),
}

/// A registered backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    addr: SocketAddrV4,
    matcher: Option<PathPrefixMatcher>,
}

impl BackendDescriptor {
    pub fn ip(&self) -> Ipv4Addr {
        *self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Pre-resolved dial address.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::V4(self.addr)
    }

    /// `None` marks the default (catch-all) backend.
    pub fn path_prefix(&self) -> Option<&str> {
        self.matcher.as_ref().map(PathPrefixMatcher::prefix)
    }

    pub fn is_default(&self) -> bool {
        self.matcher.is_none()
    }
}

impl fmt::Display for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// Path-prefix backend table.
#[derive(Debug, Clone)]
pub struct BackendRouter {
    backends: Vec<BackendDescriptor>,
    max_backends: usize,
}

impl BackendRouter {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BACKENDS)
    }

    pub fn with_capacity(max_backends: usize) -> Self {
        Self {
            backends: Vec::with_capacity(max_backends),
            max_backends,
        }
    }

    /// Build a router from configured backends, in file order.
    pub fn from_config(backends: &[BackendConfig]) -> Result<Self, RouterError> {
        let mut router = Self::new();
        for backend in backends {
            router.add_backend(&backend.ip, backend.port, backend.path_prefix.as_deref())?;
            tracing::info!(
                name = %backend.name,
                address = %format!("{}:{}", backend.ip, backend.port),
                path_prefix = backend.path_prefix.as_deref().unwrap_or("<default>"),
                "Backend registered"
            );
        }
        Ok(router)
    }

    /// Register a backend. `ip` must be an IPv4 literal; an empty prefix is
    /// treated as no prefix.
    pub fn add_backend(&mut self, ip: &str, port: u16, path_prefix: Option<&str>) -> Result<(), RouterError> {
        if self.backends.len() >= self.max_backends {
            tracing::error!(max = self.max_backends, "Maximum number of backends reached");
            return Err(RouterError::TooManyBackends(self.max_backends));
        }

        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| RouterError::InvalidAddress(ip.to_string()))?;
        if port == 0 {
            return Err(RouterError::InvalidAddress(format!("{ip}:0")));
        }

        let matcher = path_prefix
            .filter(|p| !p.is_empty())
            .map(PathPrefixMatcher::new);

        self.backends.push(BackendDescriptor {
            addr: SocketAddrV4::new(ip, port),
            matcher,
        });
        Ok(())
    }

    /// Select the backend for `path`.
    pub fn select(&self, path: &str) -> Result<&BackendDescriptor, RouterError> {
        self.backends
            .iter()
            .find(|b| b.matcher.as_ref().is_some_and(|m| m.matches(path)))
            .or_else(|| self.backends.iter().find(|b| b.is_default()))
            .ok_or_else(|| RouterError::NoBackendAvailable(path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backends(&self) -> &[BackendDescriptor] {
        &self.backends
    }
}

impl Default for BackendRouter {
    fn default() -> Self {
        Self::new()
    }
}
