//! TLS-terminating reverse proxy library.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                 worker (× N threads)                 │
//!   Client ──TLS/TCP──┼─▶ net::listener ─▶ net::transport ─▶ net::connection │
//!                     │                                        │   │         │
//!                     │                       http::parser ◀───┘   │         │
//!                     │                       cache (per worker) ◀─┤         │
//!                     │                       routing::router ◀────┘         │
//!                     │                                        │             │
//!   Client ◀──────────┼──────────── relay ◀────────────────────┴──── Backend │
//!                     └──────────────────────────────────────────────────────┘
//!   lifecycle::Supervisor spawns workers; ShutdownToken stops them.
//! ```

// Core subsystems
pub mod cache;
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod worker;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use lifecycle::{ShutdownToken, StartupError, Supervisor};
