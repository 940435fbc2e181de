//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Decrypted client bytes
//!     → accumulation buffer (net::connection)
//!     → parser.rs (Complete / Incomplete / Malformed)
//!     → request.rs (HttpRequest: method, path, headers, body)
//!     → routing layer selects a backend by path
//! ```
//!
//! # Design Decisions
//! - HTTP/1.1 subset: fixed-length bodies only, no chunked encoding
//! - The received request bytes are forwarded verbatim; the parsed view is
//!   used for routing and caching decisions only

pub mod parser;
pub mod request;

pub use parser::{parse_request, ParseError, ParseOutcome};
pub use request::{Header, HttpRequest, RequestLimits};
