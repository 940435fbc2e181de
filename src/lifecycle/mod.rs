//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (supervisor.rs):
//!     Validated config → TLS context → Backend table → Bind listener
//!     → Spawn N workers
//!
//! Shutdown (shutdown.rs):
//!     Token triggered → Wake every worker → Force-close connections → Join
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: TLS and backends first, listener last
//! - StartupError aborts the process; per-connection errors never reach here
//! - Workers are plain threads; the async runtime only waits for signals

pub mod shutdown;
pub mod signals;
pub mod supervisor;

pub use shutdown::ShutdownToken;
pub use signals::{shutdown_on_signal, wait_for_signal};
pub use supervisor::{StartupError, Supervisor};
