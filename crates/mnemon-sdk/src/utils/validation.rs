//! Validation Utilities

use thiserror::Error;

use crate::SDKError;

/// Validation error types
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    #[error("Field required: {0}")]
    Required(String),

    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

impl From<ValidationError> for SDKError {
    fn from(err: ValidationError) -> Self {
        SDKError::validation(err.to_string())
    }
}

const MAX_SCOPE_LEN: usize = 128;

/// Validate a memory or snapshot id (UUID)
pub fn validate_memory_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::Required("id".into()));
    }
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidId(id.to_string()))
}

/// Validate memory content: must contain something besides whitespace
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::Required("content".into()));
    }
    Ok(())
}

/// Validate a search query string
pub fn validate_query(query: &str) -> Result<(), ValidationError> {
    if query.trim().is_empty() {
        return Err(ValidationError::Required("query".into()));
    }
    Ok(())
}

/// Validate a snapshot scope: 1-128 characters, not blank
pub fn validate_scope(scope: &str) -> Result<(), ValidationError> {
    if scope.trim().is_empty() {
        return Err(ValidationError::Required("scope".into()));
    }
    if scope.len() > MAX_SCOPE_LEN {
        return Err(ValidationError::OutOfRange(format!(
            "scope must be {} characters or less",
            MAX_SCOPE_LEN
        )));
    }
    Ok(())
}
