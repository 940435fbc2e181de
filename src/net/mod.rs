//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (shared socket, one handle per worker)
//!     → transport.rs (plain or TLS, non-blocking handshake)
//!     → connection.rs (state machine, backend dial, relay)
//!
//! Connection States:
//!     Handshaking → ReadingRequest → ConnectingBackend → Relaying → Closed
//! ```
//!
//! # Design Decisions
//! - Readiness-driven, no blocking I/O anywhere on a worker thread
//! - TLS is optional and handled transparently by the transport
//! - Certificates are loaded once at startup; failures are fatal

pub mod connection;
pub mod listener;
pub mod tls;
pub mod transport;

pub use connection::{Connection, ConnectionError, ConnectionId, ConnectionState, Progress, Side};
pub use listener::{ListenerError, SharedListener};
pub use tls::{load_tls_config, TlsError};
pub use transport::ClientTransport;
