//! # URI Patterns
//!
//! Bus URIs are `/`-separated paths. Query and subscribe accept patterns:
//!
//! - `+` matches exactly one segment
//! - `*` matches zero or more trailing segments and must be last
//!
//! Publish targets must be concrete: non-empty, no wildcards.

use crate::connection::BusError;

const ONE_SEGMENT: &str = "+";
const ANY_SEGMENTS: &str = "*";

fn invalid(uri: &str, reason: &str) -> BusError {
    BusError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

/// Check a query/subscribe pattern.
pub fn validate_pattern(pattern: &str) -> Result<(), BusError> {
    let segments: Vec<&str> = pattern.split('/').collect();
    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        if *segment == ANY_SEGMENTS && i != last {
            return Err(invalid(pattern, "'*' must be the last segment"));
        }
        if segment.len() > 1 && (segment.contains('+') || segment.contains('*')) {
            return Err(invalid(pattern, "wildcards must occupy a whole segment"));
        }
    }
    Ok(())
}

/// Check a publish target.
pub fn validate_topic(topic: &str) -> Result<(), BusError> {
    if topic.is_empty() {
        return Err(invalid(topic, "empty uri"));
    }
    if topic.contains('+') || topic.contains('*') {
        return Err(invalid(topic, "wildcards are not allowed when publishing"));
    }
    Ok(())
}

/// Does concrete `topic` fall under `pattern`?
#[must_use]
pub fn uri_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern = pattern.split('/');
    let mut topic = topic.split('/');

    loop {
        match (pattern.next(), topic.next()) {
            (Some(ANY_SEGMENTS), _) => return true,
            (Some(p), Some(t)) if p == ONE_SEGMENT || p == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(uri_matches("a/b/c", "a/b/c"));
        assert!(!uri_matches("a/b/c", "a/b"));
        assert!(!uri_matches("a/b", "a/b/c"));
    }

    #[test]
    fn test_single_segment_wildcard() {
        assert!(uri_matches("a/+/c", "a/b/c"));
        assert!(!uri_matches("a/+/c", "a/b/x/c"));
        assert!(!uri_matches("a/+", "a"));
    }

    #[test]
    fn test_trailing_wildcard() {
        assert!(uri_matches("a/*", "a/b/c"));
        assert!(uri_matches("a/*", "a"));
        assert!(uri_matches("*", "anything/at/all"));
    }

    #[test]
    fn test_empty_pattern_matches_nothing_publishable() {
        assert!(!uri_matches("", "a"));
        assert!(validate_pattern("").is_ok());
        assert!(validate_topic("").is_err());
    }

    #[test]
    fn test_pattern_validation() {
        assert!(validate_pattern("a/+/c/*").is_ok());
        assert!(validate_pattern("a/*/c").is_err());
        assert!(validate_pattern("a/b+/c").is_err());
    }

    #[test]
    fn test_topic_validation() {
        assert!(validate_topic("a/b").is_ok());
        assert!(validate_topic("a/+").is_err());
        assert!(validate_topic("a/*").is_err());
    }
}
