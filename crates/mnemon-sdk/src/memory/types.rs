//! Request and result types for memory operations.

use chrono::{DateTime, Utc};
use mnemon_core::{Memory, MemoryContext, MemoryTier, Metadata, ScoreComponents};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

/// Input to `store_memory`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRequest {
    pub content: String,
    pub context: MemoryContext,
    #[serde(default)]
    pub metadata: Metadata,
    /// Memory this one was derived from
    #[serde(default)]
    pub parent_memory_id: Option<String>,
}

impl StoreRequest {
    pub fn new(content: impl Into<String>, context: MemoryContext) -> Self {
        Self {
            content: content.into(),
            context,
            metadata: Metadata::default(),
            parent_memory_id: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_parent(mut self, parent_memory_id: impl Into<String>) -> Self {
        self.parent_memory_id = Some(parent_memory_id.into());
        self
    }
}

/// Result of `store_memory`. Below-threshold content is a normal outcome
/// (`stored == false`), not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOutcome {
    pub stored: bool,
    pub id: Option<String>,
    pub tier: Option<MemoryTier>,
    pub importance: Option<f64>,
    pub reason: Option<String>,
    /// Identical content already existed in this context; nothing was written
    #[serde(default)]
    pub deduplicated: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Retrieval
// ─────────────────────────────────────────────────────────────────────────────

/// A recall hit with its ranking signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResult {
    pub memory: Memory,
    pub score: f64,
    pub components: ScoreComponents,
}

/// A search hit with its exact and semantic components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub memory: Memory,
    pub score: f64,
    pub exact_score: f64,
    pub semantic_score: f64,
}

/// Options for exact search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSearchOptions {
    /// Metadata key to match instead of content
    pub field: Option<String>,
    pub context: Option<MemoryContext>,
    pub tier: Option<MemoryTier>,
    pub limit: Option<usize>,
}

/// Options for hybrid search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridSearchOptions {
    pub context: Option<MemoryContext>,
    pub tier: Option<MemoryTier>,
    /// Weight of the exact component; defaults to configuration
    pub exact_weight: Option<f64>,
    pub limit: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tiers
// ─────────────────────────────────────────────────────────────────────────────

/// Transient migration plan for one memory; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationCandidate {
    pub memory: Memory,
    pub current_tier: MemoryTier,
    pub target_tier: MemoryTier,
    /// Aged past its window but below the importance bar for `target_tier`
    pub prune_eligible: bool,
}

/// Outcome of one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub candidates: usize,
    pub migrated: usize,
    /// Rows whose tier changed underneath the tick
    pub skipped: usize,
    pub prune_eligible: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Outcome of `prune_memories`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub deleted: usize,
    pub ids: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Consolidation
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one consolidation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationReport {
    pub seeds_examined: usize,
    /// Records absorbed (and deleted)
    pub merged: usize,
    /// Seeds that absorbed at least one record
    pub survivors: usize,
    pub conflicts: usize,
    pub failures: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl ConsolidationReport {
    pub fn has_changes(&self) -> bool {
        self.merged > 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Analytics
// ─────────────────────────────────────────────────────────────────────────────

/// Advisory tier change suggested by access patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierRecommendation {
    /// Frequently used; worth promoting before its age says so
    PromoteEarly,
    /// Not used for a long time
    DemoteCandidate,
}

/// Access summary for one memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPattern {
    pub memory_id: String,
    pub tier: MemoryTier,
    pub recent_accesses: u64,
    pub total_accesses: u64,
    pub last_access: DateTime<Utc>,
    pub staleness_hours: f64,
    pub recommendation: Option<TierRecommendation>,
}

/// Outcome of `reconcile_vectors`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub upserted: usize,
    pub removed: usize,
    pub failed: usize,
}
