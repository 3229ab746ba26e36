//! mnemon SDK - Cognitive Memory Engine
//!
//! This crate provides the memory engine behind mnemon. Memories are written
//! to a SQLite structured store (the source of truth) and projected into a
//! vector store for semantic search.
//!
//! # Modules
//!
//! - **memory** - Dual-write storage, tier classification and migration,
//!   hybrid retrieval, recall ranking, consolidation, access analytics
//! - **state** - Compressed snapshots of a scope's hot working set
//! - **utils** - Hashing, time and validation helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use mnemon_sdk::{HybridSearchOptions, MemoryEngine, SDKConfig, StoreRequest};
//! use mnemon_core::MemoryContext;
//!
//! async fn example() -> mnemon_sdk::SDKResult<()> {
//!     let engine = MemoryEngine::new(SDKConfig::new("memory.db", "snapshots.db"))?;
//!     engine.initialize().await?;
//!
//!     // Store a memory; it starts in the working tier
//!     engine
//!         .store_memory(StoreRequest::new(
//!             "Integration tests need DATABASE_URL set",
//!             MemoryContext::ProjectKnowledge,
//!         ))
//!         .await?;
//!
//!     // Blend exact and semantic matches
//!     let hits = engine
//!         .search_hybrid("DATABASE_URL", HybridSearchOptions::default())
//!         .await?;
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Re-export core types from mnemon-core
// ─────────────────────────────────────────────────────────────────────────────

/// Core types (Memory, MemoryTier, AccessEvent, etc.)
pub use mnemon_core::types;

/// Memory metadata with reserved keys
pub use mnemon_core::metadata;

/// Error types from core
pub use mnemon_core::error as core_error;

pub use mnemon_core::{Memory, MemoryContext, MemoryTier, Metadata};

// ─────────────────────────────────────────────────────────────────────────────
// SDK modules
// ─────────────────────────────────────────────────────────────────────────────

pub mod config;
pub mod memory;
pub mod state;
pub mod utils;

mod engine;
mod error;

pub use config::SDKConfig;
pub use engine::{HealthReport, HealthStatus, MemoryEngine, MemoryEngineBuilder};
pub use error::{SDKError, SDKResult};

pub use memory::{
    AccessPattern, ConsolidationReport, EmbeddingProvider, ExactSearchOptions,
    HybridSearchOptions, ImportanceAssessor, MigrationCandidate, MigrationReport, PruneReport,
    RecallResult, ReconcileReport, SearchResult, StoreOutcome, StoreRequest, TierRecommendation,
    VectorStore,
};
pub use state::{CaptureOptions, ContextProvider, RestoreReport, StateDiff, StateSnapshot};
