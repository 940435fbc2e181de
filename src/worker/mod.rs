//! Worker subsystem.
//!
//! # Data Flow
//! ```text
//! Shared listener (one handle per worker)
//!     → event_loop.rs (poll, accept, dispatch by token)
//!     → net::Connection::step (one bounded step per ready connection)
//!     → context.rs (router + cache owned by this worker)
//!
//! Shutdown:
//!     ShutdownToken → Waker → loop exits → all connections force-closed
//! ```
//!
//! # Design Decisions
//! - N independent loops, no state shared between them
//! - Each worker owns its connections exclusively; no locks on the hot path
//! - The cache is per worker, so a hit depends on which worker accepted

pub mod context;
pub mod event_loop;

pub use context::ProxyContext;
pub use event_loop::{Worker, WorkerSettings};
