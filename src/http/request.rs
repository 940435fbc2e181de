//! Parsed HTTP/1.1 request view.
//!
//! # Responsibilities
//! - Hold the request line (method, path, version)
//! - Preserve header order as received on the wire
//! - Case-insensitive header lookup
//! - Carry the fixed-length body declared by `Content-Length`

/// Maximum method length in bytes.
pub const MAX_METHOD_LEN: usize = 15;

/// Maximum request path length in bytes.
pub const MAX_PATH_LEN: usize = 2047;

/// Maximum protocol version length in bytes.
pub const MAX_VERSION_LEN: usize = 15;

/// Maximum number of header lines in one request.
pub const MAX_HEADERS: usize = 100;

/// A single `Name: Value` header pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Bounds applied while parsing untrusted request bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_method_len: usize,
    pub max_path_len: usize,
    pub max_version_len: usize,
    pub max_headers: usize,
    /// Capacity of the accumulation buffer; a request whose header block plus
    /// declared body cannot fit is rejected up front.
    pub buffer_capacity: usize,
}

impl RequestLimits {
    /// Default limits for an accumulation buffer of `buffer_capacity` bytes.
    pub fn with_capacity(buffer_capacity: usize) -> Self {
        Self {
            buffer_capacity,
            ..Self::default()
        }
    }
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_method_len: MAX_METHOD_LEN,
            max_path_len: MAX_PATH_LEN,
            max_version_len: MAX_VERSION_LEN,
            max_headers: MAX_HEADERS,
            buffer_capacity: 8192,
        }
    }
}

/// A fully buffered HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    /// Request target; the routing and cache key.
    pub path: String,
    pub version: String,
    /// Headers in wire order.
    pub headers: Vec<Header>,
    /// Present only when a `Content-Length` header was sent.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// First header value whose name matches `name` case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Declared body length, if any.
    pub fn content_length(&self) -> Option<usize> {
        self.body.as_ref().map(Vec::len)
    }

    pub fn has_body(&self) -> bool {
        self.content_length().is_some_and(|len| len > 0)
    }

    /// Only bodyless `GET` requests are eligible for the response cache.
    pub fn is_cacheable(&self) -> bool {
        self.method == "GET" && !self.has_body()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_headers(headers: Vec<Header>) -> HttpRequest {
        HttpRequest {
            method: "GET".into(),
            path: "/".into(),
            version: "HTTP/1.1".into(),
            headers,
            body: None,
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = request_with_headers(vec![
            Header::new("Host", "example.com"),
            Header::new("X-Trace", "abc"),
        ]);
        assert_eq!(req.header("host"), Some("example.com"));
        assert_eq!(req.header("x-trace"), Some("abc"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn test_first_duplicate_header_wins() {
        let req = request_with_headers(vec![
            Header::new("Accept", "text/html"),
            Header::new("accept", "application/json"),
        ]);
        assert_eq!(req.header("ACCEPT"), Some("text/html"));
    }

    #[test]
    fn test_cacheable_only_for_bodyless_get() {
        let mut req = request_with_headers(Vec::new());
        assert!(req.is_cacheable());

        req.body = Some(Vec::new());
        assert!(req.is_cacheable());

        req.body = Some(b"x".to_vec());
        assert!(!req.is_cacheable());

        req.body = None;
        req.method = "POST".into();
        assert!(!req.is_cacheable());
    }
}
