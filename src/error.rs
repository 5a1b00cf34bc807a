//! Error types for AttoClaw
//!
//! This module defines all error types used throughout the AttoClaw engine.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use thiserror::Error;

/// The primary error type for AttoClaw operations.
#[derive(Error, Debug)]
pub enum AttoError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider errors (API failures, malformed responses, timeouts, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Channel errors (publish failures, routing issues, etc.)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Tool execution errors (invalid parameters, execution failures, etc.)
    #[error("Tool error: {0}")]
    Tool(String),

    /// Session management errors (invalid state, persistence failures, etc.)
    #[error("Session error: {0}")]
    Session(String),

    /// Memory subsystem errors (consolidation failures, file errors, etc.)
    #[error("Memory error: {0}")]
    Memory(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message bus queue closed unexpectedly
    #[error("Bus error: queue closed")]
    BusClosed,

    /// Resource not found (sessions, tools, providers, etc.)
    #[error("Not found: {0}")]
    NotFound(String),
}

/// A specialized `Result` type for AttoClaw operations.
pub type Result<T> = std::result::Result<T, AttoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AttoError::Config("missing workspace".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing workspace");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let atto_err: AttoError = io_err.into();
        assert!(matches!(atto_err, AttoError::Io(_)));
    }

    #[test]
    fn test_bus_closed_display() {
        assert_eq!(AttoError::BusClosed.to_string(), "Bus error: queue closed");
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }

    #[test]
    fn test_error_variants() {
        // Ensure all variants can be created
        let _ = AttoError::Config("test".into());
        let _ = AttoError::Provider("test".into());
        let _ = AttoError::Channel("test".into());
        let _ = AttoError::Tool("test".into());
        let _ = AttoError::Session("test".into());
        let _ = AttoError::Memory("test".into());
        let _ = AttoError::BusClosed;
        let _ = AttoError::NotFound("test".into());
    }
}
