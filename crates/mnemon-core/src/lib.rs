//! mnemon-core - Core types and persistence for the mnemon memory engine
//!
//! This crate owns the data model and the structured (SQLite) side of storage:
//!
//! - **types**: memories, tiers, contexts, access events, snapshot records
//! - **metadata**: typed metadata container with reserved, validated keys
//! - **db**: transactional SQLite access for memories, access events and snapshots
//!
//! Higher-level behavior (dual writes, ranking, consolidation, tier migration)
//! lives in `mnemon-sdk`.

pub mod db;
pub mod error;
pub mod metadata;
pub mod types;

// Re-export commonly used types
pub use db::Database;
pub use error::{Error, Result};
pub use metadata::Metadata;
pub use types::*;
