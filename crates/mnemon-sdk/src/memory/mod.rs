//! Tiered Memory System
//!
//! Memories live in two stores:
//! - Structured store (SQLite): the source of truth for every field
//! - Vector store: embeddings only, fed asynchronously and allowed to lag
//!
//! # Lifecycle
//!
//! 1. New memories are assessed, embedded, and written to the working tier
//! 2. The migration scheduler moves them to session and long-term as they age
//! 3. Consolidation folds near-duplicates within a context into the oldest
//!
//! Retrieval blends exact matches with semantic neighbours, and recall ranks
//! by semantic similarity, recency, importance and access frequency.

mod access;
mod consolidation;
mod coordinator;
mod importance;
mod queue;
mod retrieval;
mod scheduler;
mod store;
mod tiers;
mod types;
mod vector;
pub mod embeddings;

#[cfg(test)]
pub(crate) mod testing;

pub use access::{AccessAnalytics, AccessRecorder};
pub use consolidation::{merge_contents, split_sentences, ConsolidationEngine};
pub use coordinator::DualWriteCoordinator;
pub use importance::{FixedAssessor, HeuristicAssessor, ImportanceAssessor};
pub use queue::{QueueStats, VectorOp, VectorWriteQueue};
pub use retrieval::RetrievalEngine;
pub use scheduler::MigrationScheduler;
pub use store::StructuredStore;
pub use tiers::TierClassifier;
pub use types::{
    AccessPattern, ConsolidationReport, ExactSearchOptions, HybridSearchOptions,
    MigrationCandidate, MigrationReport, PruneReport, RecallResult, ReconcileReport,
    SearchResult, StoreOutcome, StoreRequest, TierRecommendation,
};
pub use vector::{InMemoryVectorStore, VectorMatch, VectorStore};

pub use embeddings::{EmbeddingProvider, HashingEmbedder};
#[cfg(feature = "fastembed")]
pub use embeddings::FastEmbedProvider;
