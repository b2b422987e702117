//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Backend could not be reached (connection, auth, pool timeout, I/O)
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Empty or malformed thread / checkpoint identifier
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// State blob could not be encoded or decoded for a known checkpoint
    #[error("Serialization failure (thread_id={thread_id}, checkpoint_id={checkpoint_id}): {message}")]
    Serialization {
        thread_id: String,
        checkpoint_id: String,
        message: String,
    },

    /// Raw codec error, before the owning checkpoint is known
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Query parameters out of range
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Any other backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    /// Attach the owning thread and checkpoint to a codec failure
    pub fn serialization(
        thread_id: impl Into<String>,
        checkpoint_id: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        CheckpointError::Serialization {
            thread_id: thread_id.into(),
            checkpoint_id: checkpoint_id.into(),
            message: err.to_string(),
        }
    }

    /// Whether a retry with backoff may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckpointError::BackendUnavailable(_))
    }

    /// Whether this is a codec failure of either flavour
    pub fn is_serialization(&self) -> bool {
        matches!(
            self,
            CheckpointError::Serialization { .. } | CheckpointError::Codec(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_backend_unavailable_is_retryable() {
        assert!(CheckpointError::BackendUnavailable("down".into()).is_retryable());
        assert!(!CheckpointError::InvalidReference("".into()).is_retryable());
        assert!(!CheckpointError::Storage("constraint".into()).is_retryable());
        assert!(!CheckpointError::serialization("t", "c", "bad").is_retryable());
    }

    #[test]
    fn test_serialization_error_carries_ids() {
        let err = CheckpointError::serialization("alice_1", "cp-9", "unexpected eof");
        let msg = err.to_string();
        assert!(msg.contains("alice_1"));
        assert!(msg.contains("cp-9"));
        assert!(msg.contains("unexpected eof"));
        assert!(err.is_serialization());
    }
}
