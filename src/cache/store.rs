//! Bounded TTL response store.
//!
//! # Responsibilities
//! - Map a cache key (request path) to an opaque response payload
//! - Expire entries after their TTL
//! - Enforce entry-count and memory bounds
//!
//! # Design Decisions
//! - Linear scan over a small `Vec`; the store is sized in tens to hundreds
//!   of entries and owned by a single worker, so no locking
//! - Capacity pressure is reported to the caller (`CacheFull`); unexpired
//!   entries are never evicted implicitly
//! - Removal swaps the last entry into the freed slot; entry order carries no
//!   meaning

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::cache::clock::{Clock, SystemClock};

/// Errors returned by [`ResponseCache::put`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache is full ({entries} entries, {bytes} bytes)")]
    CacheFull { entries: usize, bytes: usize },

    #[error("invalid cache argument: {0}")]
    InvalidArgument(&'static str),
}

/// One cached payload.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: String,
    payload: Vec<u8>,
    created_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// An entry is dead from the instant its expiry is reached.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Single-owner key/value store with per-entry TTL.
#[derive(Debug)]
pub struct ResponseCache<C: Clock = SystemClock> {
    entries: Vec<CacheEntry>,
    max_entries: usize,
    /// Upper bound on total payload bytes; zero disables the bound.
    max_memory: usize,
    default_ttl: Duration,
    memory_used: usize,
    clock: C,
}

impl ResponseCache<SystemClock> {
    /// Create a cache driven by the wall clock.
    pub fn new(max_entries: usize, max_memory: usize, default_ttl: Duration) -> Self {
        Self::with_clock(max_entries, max_memory, default_ttl, SystemClock)
    }
}

impl<C: Clock> ResponseCache<C> {
    /// Create a cache driven by an explicit clock.
    pub fn with_clock(max_entries: usize, max_memory: usize, default_ttl: Duration, clock: C) -> Self {
        tracing::info!(
            max_entries,
            max_memory,
            default_ttl_secs = default_ttl.as_secs(),
            "Response cache initialized"
        );
        Self {
            entries: Vec::with_capacity(max_entries),
            max_entries,
            max_memory,
            default_ttl,
            memory_used: 0,
            clock,
        }
    }

    /// Insert or refresh `key` using the default TTL.
    pub fn put(&mut self, key: &str, payload: &[u8]) -> Result<(), CacheError> {
        self.put_with_ttl(key, payload, self.default_ttl)
    }

    /// Insert or refresh `key` with an explicit TTL.
    ///
    /// Refreshing an existing key replaces its payload and restarts its TTL.
    /// A new key first reclaims every expired entry, then fails with
    /// `CacheFull` if the entry or memory bound would still be exceeded.
    pub fn put_with_ttl(&mut self, key: &str, payload: &[u8], ttl: Duration) -> Result<(), CacheError> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("empty key"));
        }
        if self.max_memory > 0 && payload.len() > self.max_memory {
            return Err(CacheError::InvalidArgument("payload exceeds cache memory bound"));
        }

        let now = self.clock.now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or(CacheError::InvalidArgument("ttl overflows clock"))?;

        if let Some(idx) = self.position(key) {
            let old_size = self.entries[idx].size();
            let projected = self.memory_used - old_size + payload.len();
            if self.exceeds_memory(projected) {
                return Err(self.full());
            }
            let entry = &mut self.entries[idx];
            entry.payload = payload.to_vec();
            entry.created_at = now;
            entry.expires_at = expires_at;
            self.memory_used = projected;
            tracing::debug!(key, size = payload.len(), "Updated cache entry");
            return Ok(());
        }

        self.reclaim_expired(now);

        if self.entries.len() >= self.max_entries
            || self.exceeds_memory(self.memory_used + payload.len())
        {
            tracing::warn!(key, entries = self.entries.len(), "Cache is full");
            return Err(self.full());
        }

        self.entries.push(CacheEntry {
            key: key.to_string(),
            payload: payload.to_vec(),
            created_at: now,
            expires_at,
        });
        self.memory_used += payload.len();
        tracing::debug!(key, size = payload.len(), "Added cache entry");
        Ok(())
    }

    /// Look up `key`. An expired entry is a miss and is dropped on the spot.
    pub fn get(&mut self, key: &str) -> Option<&[u8]> {
        let now = self.clock.now();
        let Some(idx) = self.position(key) else {
            tracing::debug!(key, "Cache miss");
            return None;
        };

        if self.entries[idx].is_expired(now) {
            tracing::debug!(key, "Cache entry expired");
            self.remove_at(idx);
            return None;
        }

        tracing::debug!(key, "Cache hit");
        Some(self.entries[idx].payload())
    }

    /// Drop `key` if present.
    pub fn remove(&mut self, key: &str) {
        if let Some(idx) = self.position(key) {
            self.remove_at(idx);
            tracing::debug!(key, "Removed cache entry");
        }
    }

    /// Number of stored entries, expired ones included until reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload bytes currently held.
    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }

    fn remove_at(&mut self, idx: usize) {
        let entry = self.entries.swap_remove(idx);
        self.memory_used -= entry.size();
    }

    fn reclaim_expired(&mut self, now: Instant) {
        let mut idx = 0;
        while idx < self.entries.len() {
            if self.entries[idx].is_expired(now) {
                self.remove_at(idx);
                tracing::debug!("Removed expired cache entry");
            } else {
                idx += 1;
            }
        }
    }

    fn exceeds_memory(&self, bytes: usize) -> bool {
        self.max_memory > 0 && bytes > self.max_memory
    }

    fn full(&self) -> CacheError {
        CacheError::CacheFull {
            entries: self.entries.len(),
            bytes: self.memory_used,
        }
    }
}
