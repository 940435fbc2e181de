//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, backlog, TLS).
    pub listener: ListenerConfig,

    /// Worker event loop settings.
    pub workers: WorkerConfig,

    /// Per-connection buffer and timeout settings.
    pub connection: ConnectionConfig,

    /// Backend table, registered in file order.
    pub backends: Vec<BackendConfig>,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Pending-connection queue length passed to `listen`.
    pub backlog: u32,

    /// Optional TLS configuration. Plaintext when absent.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            backlog: 1024,
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Worker event loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of independent event loops sharing the listener.
    pub count: usize,

    /// Readiness events fetched per poll.
    pub max_events: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 4,
            max_events: 1024,
        }
    }
}

/// Per-connection limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Request accumulation buffer capacity in bytes.
    pub buffer_size: usize,

    /// Maximum connection age in seconds, regardless of state.
    pub timeout_secs: u64,

    /// Bytes read from the backend per relay step.
    pub relay_chunk_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            timeout_secs: 30,
            relay_chunk_size: 8192,
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Backend identifier for logging.
    #[serde(default)]
    pub name: String,

    /// IPv4 literal (e.g., "127.0.0.1").
    pub ip: String,

    /// TCP port.
    pub port: u16,

    /// Path prefix routed to this backend. Absent means default backend.
    #[serde(default)]
    pub path_prefix: Option<String>,
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Consult the cache before dialing a backend.
    pub enabled: bool,

    /// Maximum number of entries per worker.
    pub max_entries: usize,

    /// Maximum total payload bytes per worker (0 = unbounded).
    pub max_memory: usize,

    /// Entry time-to-live in seconds.
    pub default_ttl_secs: u64,

    /// Largest response that will be captured for caching.
    pub max_object_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 256,
            max_memory: 16 * 1024 * 1024, // 16MB
            default_ttl_secs: 60,
            max_object_bytes: 64 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
