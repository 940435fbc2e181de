//! Per-worker shared state handed to every connection step.

use std::time::Duration;

use crate::cache::ResponseCache;
use crate::config::ProxyConfig;
use crate::http::RequestLimits;
use crate::routing::BackendRouter;

/// Everything a connection consults while serving a request. Owned by one
/// worker; nothing here is shared across threads.
#[derive(Debug)]
pub struct ProxyContext {
    pub router: BackendRouter,
    /// `None` when caching is disabled.
    pub cache: Option<ResponseCache>,
    pub limits: RequestLimits,
    /// Largest backend response captured for the cache.
    pub max_object_bytes: usize,
    /// Bytes read from a backend per relay step.
    pub relay_chunk_size: usize,
}

impl ProxyContext {
    pub fn new(router: BackendRouter, config: &ProxyConfig) -> Self {
        let cache = config.cache.enabled.then(|| {
            ResponseCache::new(
                config.cache.max_entries,
                config.cache.max_memory,
                Duration::from_secs(config.cache.default_ttl_secs),
            )
        });

        Self {
            router,
            cache,
            limits: RequestLimits::with_capacity(config.connection.buffer_size),
            max_object_bytes: config.cache.max_object_bytes,
            relay_chunk_size: config.connection.relay_chunk_size,
        }
    }
}
