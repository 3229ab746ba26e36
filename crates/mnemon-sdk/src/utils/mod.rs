//! SDK Utilities
//!
//! Common utilities for the SDK.

mod hashing;
mod time;
mod validation;

pub use hashing::content_hash;
pub use time::{hours_between, now_utc, to_chrono};
pub use validation::{validate_content, validate_memory_id, validate_query, validate_scope, ValidationError};
