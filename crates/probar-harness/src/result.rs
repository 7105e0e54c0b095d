//! Result and error types for harness queries.

use thiserror::Error;

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur while locating elements and harnesses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// A required query matched nothing
    #[error("{message}")]
    NotFound {
        /// Multi-line description of every attempted query
        message: String,
    },

    /// No element matched the selector a loader was requested for
    #[error("Expected to find element matching selector: \"{selector}\", but none was found")]
    LoaderNotFound {
        /// Selector that matched nothing
        selector: String,
    },

    /// A positional lookup ran past the end of the matches
    #[error("Expected to find {description} at index {index}, but only {count} matched")]
    IndexOutOfRange {
        /// Description of the query
        description: String,
        /// Requested index
        index: usize,
        /// Number of matches found
        count: usize,
    },

    /// A query resolved to a different kind of result than the caller asked for
    #[error("Expected {expected} but the query resolved to {found}")]
    UnexpectedResult {
        /// What the caller asked for
        expected: String,
        /// What was actually located
        found: String,
    },

    /// A user-supplied predicate failed
    #[error("Predicate failed: {message}")]
    Predicate {
        /// Error message
        message: String,
    },

    /// Interacting with a test element failed
    #[error("Element interaction failed: {message}")]
    Element {
        /// Error message
        message: String,
    },

    /// A selector could not be parsed by the environment
    #[error("Unsupported selector: {selector}")]
    InvalidSelector {
        /// The offending selector
        selector: String,
    },
}

impl HarnessError {
    /// Create a predicate failure
    #[must_use]
    pub fn predicate(message: impl Into<String>) -> Self {
        Self::Predicate {
            message: message.into(),
        }
    }

    /// Create an element interaction failure
    #[must_use]
    pub fn element(message: impl Into<String>) -> Self {
        Self::Element {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_not_found_message() {
        let err = HarnessError::LoaderNotFound {
            selector: ".missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Expected to find element matching selector: \".missing\", but none was found"
        );
    }

    #[test]
    fn test_not_found_is_passed_through_verbatim() {
        let err = HarnessError::NotFound {
            message: "line one\nline two".to_string(),
        };
        assert_eq!(err.to_string(), "line one\nline two");
    }

    #[test]
    fn test_helper_constructors() {
        assert_eq!(
            HarnessError::predicate("boom").to_string(),
            "Predicate failed: boom"
        );
        assert_eq!(
            HarnessError::element("detached").to_string(),
            "Element interaction failed: detached"
        );
    }
}
