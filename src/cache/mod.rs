//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed GET request (path)
//!     → store.rs lookup
//!         hit  → payload written to client, no backend dial
//!         miss → relay runs, response captured
//!     → store.rs put (if the response was a 200 and fit the object limit)
//! ```
//!
//! # Design Decisions
//! - One cache per worker; never shared across event loops
//! - Time is injected through `Clock` so expiry is testable without sleeping

pub mod clock;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{CacheEntry, CacheError, ResponseCache};
