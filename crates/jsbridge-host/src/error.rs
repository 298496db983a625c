//! Host exception type
//!
//! Every fallible host operation reports failure as a [`HostError`]. The bridge
//! translates it into a script exception whenever the engine is the caller.

use thiserror::Error;

/// Result type alias for host operations
pub type HostResult<T> = Result<T, HostError>;

/// Exception raised by host code, carrying a message string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
}

impl HostError {
    /// Create an exception with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Exception raised when a by-name call finds no method
    pub fn no_such_method(name: &str) -> Self {
        Self::new(format!("No such method: {name}"))
    }

    /// Exception raised when a property cannot be written
    pub fn read_only(class: &str, name: &str) -> Self {
        Self::new(format!("Cannot write property {class}::{name}"))
    }

    /// The exception message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HostError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HostError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_message() {
        let err = HostError::new("boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn test_no_such_method() {
        let err = HostError::no_such_method("frobnicate");
        assert_eq!(err.message(), "No such method: frobnicate");
    }
}
