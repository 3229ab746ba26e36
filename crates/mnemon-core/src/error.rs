//! Error types for mnemon-core.

use thiserror::Error;

/// Result type alias using mnemon-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for storage operations
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Data errors
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a not-found error
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the underlying database could not be reached or used at all
    /// (cannot open, busy, locked, I/O failure).
    pub fn is_connection(&self) -> bool {
        use rusqlite::ErrorCode;
        match self {
            Self::LockPoisoned | Self::Io(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::CannotOpen
                    | ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::NotADatabase
            ),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_classification() {
        assert!(Error::LockPoisoned.is_connection());
        assert!(!Error::validation("bad").is_connection());
        assert!(!Error::not_found("Memory", "x").is_connection());

        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(Error::Database(busy).is_connection());
        assert!(!Error::Database(rusqlite::Error::QueryReturnedNoRows).is_connection());
    }

    #[test]
    fn test_display() {
        let err = Error::not_found("Memory", "abc");
        assert_eq!(err.to_string(), "Memory not found: abc");
    }
}
