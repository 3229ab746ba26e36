//! SDK Error Types
//!
//! Defines the error taxonomy surfaced by the memory engine.

use thiserror::Error;

/// SDK Result type alias
pub type SDKResult<T> = Result<T, SDKError>;

/// SDK errors
#[derive(Debug, Error)]
pub enum SDKError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// A backing store could not be reached
    #[error("{store} store unavailable: {message}")]
    Connection { store: String, message: String },

    /// A store call exceeded its deadline
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Invalid input
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Entry not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Concurrent modification detected
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Embedding provider failure
    #[error("embedding error: {message}")]
    Embedding { message: String },

    /// Storage error from mnemon-core
    #[error("storage error: {0}")]
    Core(mnemon_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SDKError {
    /// Create a connection error
    pub fn connection(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this error is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if the store could not be reached (connection or timeout)
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

impl From<mnemon_core::Error> for SDKError {
    fn from(err: mnemon_core::Error) -> Self {
        if err.is_connection() {
            return Self::connection("structured", err.to_string());
        }
        match err {
            mnemon_core::Error::NotFound { entity, id } => Self::not_found(entity, id),
            mnemon_core::Error::Validation(message) => Self::Validation { message },
            mnemon_core::Error::Conflict(message) => Self::Conflict { message },
            other => Self::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SDKError::validation("content must not be empty");
        assert!(err.is_validation());
        assert!(err.to_string().contains("content must not be empty"));

        let err = SDKError::not_found("Memory", "123");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Memory"));
        assert!(err.to_string().contains("123"));

        let err = SDKError::timeout("vector search", 500);
        assert!(err.is_timeout());
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_core_error_mapping() {
        let err: SDKError = mnemon_core::Error::not_found("Memory", "abc").into();
        assert!(err.is_not_found());

        let err: SDKError = mnemon_core::Error::Conflict("stale".into()).into();
        assert!(err.is_conflict());

        let err: SDKError = mnemon_core::Error::LockPoisoned.into();
        assert!(matches!(err, SDKError::Connection { ref store, .. } if store == "structured"));

        let err: SDKError = mnemon_core::Error::Other("boom".into()).into();
        assert!(matches!(err, SDKError::Core(_)));
    }
}
