//! Error types for the bridge
//!
//! Script exceptions keep their type, message, location and stack so the host
//! can report them. Host exceptions travel through [`BridgeError::Host`] and
//! come back out as [`HostError`] when the host is the caller.

use jsbridge_host::HostError;
use rquickjs::{Coerced, Ctx, Object, Value};
use thiserror::Error;

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Message reported for a run aborted by its deadline
pub const TIMEOUT_MESSAGE: &str = "Execution timed out";

/// Errors surfaced by the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Failed to create the engine runtime or context
    #[error("Context creation failed: {message}")]
    ContextCreation { message: String },

    /// Script failed to compile
    #[error("Syntax error{}: {message}", format_location(file, line, column))]
    SyntaxError {
        message: String,
        file: Option<String>,
        line: Option<u32>,
        column: Option<u32>,
    },

    /// Uncaught script exception
    #[error("{error_type}: {message}")]
    ScriptError {
        error_type: String,
        message: String,
        file: Option<String>,
        line: Option<u32>,
        column: Option<u32>,
        stack: Option<String>,
    },

    /// Execution was terminated by its deadline
    #[error("{}", TIMEOUT_MESSAGE)]
    Timeout,

    /// Host exception raised during a bridge call
    #[error(transparent)]
    Host(#[from] HostError),

    /// Engine failure not tied to a thrown value
    #[error("Engine error: {0}")]
    Engine(#[from] rquickjs::Error),

    /// Internal/unexpected error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_location(file: &Option<String>, line: &Option<u32>, column: &Option<u32>) -> String {
    match (file, line, column) {
        (Some(f), Some(l), Some(c)) => format!(" at {}:{}:{}", f, l, c),
        (Some(f), Some(l), None) => format!(" at {}:{}", f, l),
        (None, Some(l), Some(c)) => format!(" at line {}:{}", l, c),
        (None, Some(l), None) => format!(" at line {}", l),
        _ => String::new(),
    }
}

impl BridgeError {
    /// Create a script error from error type and message
    pub fn script_error(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScriptError {
            error_type: error_type.into(),
            message: message.into(),
            file: None,
            line: None,
            column: None,
            stack: None,
        }
    }

    /// Create a syntax error
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::SyntaxError {
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a user-facing script error
    pub fn is_script_error(&self) -> bool {
        matches!(self, Self::ScriptError { .. } | Self::SyntaxError { .. })
    }

    /// Check if the run was aborted by its deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Get the stack trace if available
    pub fn stack_trace(&self) -> Option<&str> {
        match self {
            Self::ScriptError { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }

    /// Get source location if available
    pub fn location(&self) -> Option<(Option<&str>, Option<u32>, Option<u32>)> {
        match self {
            Self::ScriptError {
                file, line, column, ..
            }
            | Self::SyntaxError {
                file, line, column, ..
            } => Some((file.as_deref(), *line, *column)),
            _ => None,
        }
    }

    /// Get the error type name (e.g., "TypeError", "ReferenceError")
    pub fn error_type(&self) -> &str {
        match self {
            Self::ScriptError { error_type, .. } => error_type,
            Self::SyntaxError { .. } => "SyntaxError",
            Self::Timeout => "TimeoutError",
            Self::ContextCreation { .. } => "ContextError",
            Self::Host(_) => "HostError",
            Self::Engine(_) | Self::Internal(_) => "InternalError",
        }
    }

    /// Turn a script error into a syntax error, keeping its location
    pub(crate) fn into_syntax_error(self) -> Self {
        match self {
            Self::ScriptError {
                message,
                file,
                line,
                column,
                ..
            } => Self::SyntaxError {
                message,
                file,
                line,
                column,
            },
            other => other,
        }
    }
}

impl From<BridgeError> for HostError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Host(err) => err,
            other => HostError::new(other.to_string()),
        }
    }
}

/// Convert an engine error into a bridge error, taking the pending exception if any
pub(crate) fn capture(ctx: &Ctx<'_>, err: rquickjs::Error) -> BridgeError {
    match err {
        rquickjs::Error::Exception => extract_exception(&ctx.catch()),
        other => BridgeError::Engine(other),
    }
}

/// Extract type, message, location and stack from a thrown value
pub(crate) fn extract_exception(thrown: &Value<'_>) -> BridgeError {
    match thrown.as_object() {
        Some(object) => extract_error_object(object),
        None => {
            // Primitive exception (throw "string" or throw 42)
            let message = thrown
                .get::<Coerced<String>>()
                .map(|s| s.0)
                .unwrap_or_else(|_| "Unknown error".to_string());
            BridgeError::script_error("Error", message)
        }
    }
}

fn extract_error_object(object: &Object<'_>) -> BridgeError {
    let error_type = string_property(object, "name").unwrap_or_else(|| "Error".to_string());
    let message = string_property(object, "message").unwrap_or_else(|| {
        object
            .as_value()
            .get::<Coerced<String>>()
            .map(|s| s.0)
            .unwrap_or_else(|_| "Unknown error".to_string())
    });
    let stack = string_property(object, "stack").filter(|stack| !stack.is_empty());
    let file = string_property(object, "fileName");
    let line = number_property(object, "lineNumber").map(|n| n as u32);
    let column = number_property(object, "columnNumber").map(|n| n as u32);

    BridgeError::ScriptError {
        error_type,
        message,
        file,
        line,
        column,
        stack,
    }
}

fn string_property(object: &Object<'_>, name: &str) -> Option<String> {
    object
        .get::<_, Option<Coerced<String>>>(name)
        .ok()
        .flatten()
        .map(|s| s.0)
}

fn number_property(object: &Object<'_>, name: &str) -> Option<f64> {
    object
        .get::<_, Value>(name)
        .ok()
        .and_then(|value| value.as_number())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_is_exact() {
        assert_eq!(BridgeError::Timeout.to_string(), "Execution timed out");
        assert!(BridgeError::Timeout.is_timeout());
    }

    #[test]
    fn test_script_error_display() {
        let err = BridgeError::script_error("TypeError", "undefined is not a function");
        assert_eq!(err.to_string(), "TypeError: undefined is not a function");
        assert!(err.is_script_error());
        assert_eq!(err.error_type(), "TypeError");
    }

    #[test]
    fn test_syntax_error_location() {
        let err = BridgeError::SyntaxError {
            message: "unexpected token".into(),
            file: Some("script.js".into()),
            line: Some(1),
            column: Some(10),
        };
        assert!(err.to_string().contains("script.js:1:10"));
        let (file, line, column) = err.location().unwrap();
        assert_eq!(file, Some("script.js"));
        assert_eq!(line, Some(1));
        assert_eq!(column, Some(10));
    }

    #[test]
    fn test_into_syntax_error_keeps_location() {
        let err = BridgeError::ScriptError {
            error_type: "SyntaxError".into(),
            message: "expecting ';'".into(),
            file: Some("a.js".into()),
            line: Some(3),
            column: None,
            stack: None,
        }
        .into_syntax_error();
        assert!(matches!(err, BridgeError::SyntaxError { line: Some(3), .. }));
    }

    #[test]
    fn test_host_error_translation() {
        let host: HostError = BridgeError::Host(HostError::new("boom")).into();
        assert_eq!(host.message(), "boom");

        let host: HostError = BridgeError::script_error("RangeError", "too far").into();
        assert_eq!(host.message(), "RangeError: too far");
    }

    #[test]
    fn test_location_none() {
        let err = BridgeError::internal("test");
        assert!(err.location().is_none());
        assert!(err.stack_trace().is_none());
    }
}
