//! Error types shared across the crate

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors surfaced by configuration, storage and lookups.
///
/// The memory store and compressor log persistence and LLM failures instead
/// of returning them; lookups report `NotFound` and offloaded work that
/// cannot complete reports `Internal`.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ContextError {
    fn from(err: config::ConfigError) -> Self {
        ContextError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ContextError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_lookup_and_internal_display() {
        assert_eq!(ContextError::NotFound("s1".to_string()).to_string(), "Session not found: s1");
        assert_eq!(
            ContextError::Internal("task panicked".to_string()).to_string(),
            "Internal error: task panicked"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ContextError = io.into();
        assert!(matches!(err, ContextError::Io(_)));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: ContextError = config::ConfigError::Message("bad value".to_string()).into();
        assert!(matches!(err, ContextError::Configuration(_)));
    }
}
