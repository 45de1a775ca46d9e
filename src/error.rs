//! Error types for vibe-state.

use thiserror::Error;

/// Main error type for vibe-state operations.
#[derive(Error, Debug)]
pub enum VibeStateError {
    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// A snapshot payload failed structural validation.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// A snapshot was produced by an incompatible format version.
    #[error("unsupported snapshot version: {0}")]
    UnsupportedSnapshotVersion(u32),

    /// Session identifier could not be parsed.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for vibe-state operations.
pub type Result<T> = std::result::Result<T, VibeStateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_snapshot_display() {
        let err = VibeStateError::InvalidSnapshot("duplicate session id".into());
        assert!(err.to_string().contains("invalid snapshot"));
        assert!(err.to_string().contains("duplicate session id"));
    }

    #[test]
    fn test_unsupported_version_display() {
        let err = VibeStateError::UnsupportedSnapshotVersion(7);
        assert_eq!(err.to_string(), "unsupported snapshot version: 7");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VibeStateError = io_err.into();
        assert!(matches!(err, VibeStateError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err: VibeStateError = json_err.into();
        assert!(matches!(err, VibeStateError::Json(_)));
    }
}
