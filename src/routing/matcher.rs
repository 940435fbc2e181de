//! Route matching logic.
//!
//! # Responsibilities
//! - Match the request path against a configured prefix
//!
//! # Design Decisions
//! - Byte-wise prefix comparison, not segment-aware: `/api` matches `/apix`
//! - Case-sensitive
//! - An empty prefix never matches; the catch-all is expressed by having no
//!   matcher at all

/// Trait for matching a request path against a condition.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the path satisfies this condition.
    fn matches(&self, path: &str) -> bool;
}

/// Matches the request path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, path: &str) -> bool {
        !self.prefix.is_empty() && path.as_bytes().starts_with(self.prefix.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/api");
        assert!(matcher.matches("/api"));
        assert!(matcher.matches("/api/v1"));
        assert!(matcher.matches("/apiary"));
        assert!(!matcher.matches("/images"));
        assert!(!matcher.matches("/ap"));
        assert!(!matcher.matches("/API/v1"));
    }

    #[test]
    fn test_empty_prefix_never_matches() {
        let matcher = PathPrefixMatcher::new("");
        assert!(!matcher.matches("/"));
        assert!(!matcher.matches(""));
    }
}
