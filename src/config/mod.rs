//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → cloned into the supervisor and each worker
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the backend table is fixed at startup
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BackendConfig, CacheConfig, ConnectionConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    ProxyConfig, TlsConfig, WorkerConfig,
};
pub use validation::{validate_config, ValidationError};
