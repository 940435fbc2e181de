//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed request path
//!     → router.rs (scan backends in registration order)
//!     → matcher.rs (byte-wise prefix check)
//!     → Return: BackendDescriptor or NoBackendAvailable
//!
//! Backend registration (at startup):
//!     BackendConfig[]
//!     → validate IPv4 literal, resolve SocketAddr
//!     → append to table (bounded)
//! ```
//!
//! # Design Decisions
//! - No DNS at request time
//! - Deterministic: same path always selects the same backend
//! - First match wins; the first prefix-less entry is the default

pub mod matcher;
pub mod router;

pub use matcher::{Matcher, PathPrefixMatcher};
pub use router::{BackendDescriptor, BackendRouter, RouterError, MAX_BACKENDS};
