//! Shared data model for memories, access events and state snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::metadata::Metadata;

// ─────────────────────────────────────────────────────────────────────────────
// Memory Tiers
// ─────────────────────────────────────────────────────────────────────────────

/// Retention tier, derived from a memory's age.
///
/// Tiers are ordered: `Working < Session < LongTerm`. Migration only ever
/// moves a memory towards `LongTerm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    /// Recent memories (younger than the working window)
    Working,
    /// Memories between the working and session windows
    Session,
    /// Everything older than the session window
    LongTerm,
}

impl MemoryTier {
    pub const ALL: [MemoryTier; 3] = [MemoryTier::Working, MemoryTier::Session, MemoryTier::LongTerm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Session => "session",
            Self::LongTerm => "longterm",
        }
    }

    /// Tier a memory moves into when promoted, if any.
    pub fn next(&self) -> Option<MemoryTier> {
        match self {
            Self::Working => Some(Self::Session),
            Self::Session => Some(Self::LongTerm),
            Self::LongTerm => None,
        }
    }

    /// Tier a memory came from when it was promoted into this one.
    pub fn previous(&self) -> Option<MemoryTier> {
        match self {
            Self::Working => None,
            Self::Session => Some(Self::Working),
            Self::LongTerm => Some(Self::Session),
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "working" => Ok(Self::Working),
            "session" => Ok(Self::Session),
            "longterm" | "long_term" => Ok(Self::LongTerm),
            _ => Err(format!("Unknown memory tier: {}", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Contexts
// ─────────────────────────────────────────────────────────────────────────────

/// Closed set of categories a memory belongs to.
///
/// Consolidation never merges across contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryContext {
    General,
    UserPreference,
    TaskCritical,
    CodeSymbol,
    ProjectKnowledge,
    Conversation,
    Decision,
    ErrorPattern,
}

impl MemoryContext {
    pub const ALL: [MemoryContext; 8] = [
        MemoryContext::General,
        MemoryContext::UserPreference,
        MemoryContext::TaskCritical,
        MemoryContext::CodeSymbol,
        MemoryContext::ProjectKnowledge,
        MemoryContext::Conversation,
        MemoryContext::Decision,
        MemoryContext::ErrorPattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::UserPreference => "user_preference",
            Self::TaskCritical => "task_critical",
            Self::CodeSymbol => "code_symbol",
            Self::ProjectKnowledge => "project_knowledge",
            Self::Conversation => "conversation",
            Self::Decision => "decision",
            Self::ErrorPattern => "error_pattern",
        }
    }
}

impl fmt::Display for MemoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryContext {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown memory context: {}", s))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Records
// ─────────────────────────────────────────────────────────────────────────────

/// A stored memory. The structured store holds the only copy of `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub content: String,
    /// SHA-256 hex of `content`
    pub content_hash: String,
    pub context: MemoryContext,
    /// Always within [0, 1]
    pub importance: f64,
    /// Empty when loaded without embeddings
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub tier: MemoryTier,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub access_count: u64,
    pub tier_migrated_at: Option<DateTime<Utc>>,
    pub parent_memory_id: Option<String>,
    /// Ids of every record merged into this one; only grows
    #[serde(default)]
    pub consolidated_from: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Memory {
    /// Age of the memory at `now`, measured from creation.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }
}

/// Ordering used when listing memories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MemoryOrder {
    /// `created_at ASC, id ASC` (consolidation and migration order)
    #[default]
    CreatedAsc,
    /// `accessed_at DESC, id ASC` (hot set first)
    AccessedDesc,
}

/// Filter for listing memories.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub context: Option<MemoryContext>,
    /// Empty means any tier
    pub tiers: Vec<MemoryTier>,
    pub limit: Option<usize>,
    pub include_embeddings: bool,
    pub order: MemoryOrder,
}

/// Substring query against content or a metadata field.
#[derive(Debug, Clone, Default)]
pub struct ExactQuery {
    pub pattern: String,
    /// Metadata key to match instead of content
    pub field: Option<String>,
    pub context: Option<MemoryContext>,
    /// Empty means any tier
    pub tiers: Vec<MemoryTier>,
    pub limit: usize,
}

/// Survivor update plus absorbed deletions, committed atomically.
#[derive(Debug, Clone)]
pub struct MergeWrite {
    pub survivor_id: String,
    /// Survivor's `modified_at` as observed when the merge was planned
    pub expected_modified_at: DateTime<Utc>,
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
    pub importance: f64,
    pub consolidated_from: Vec<String>,
    pub modified_at: DateTime<Utc>,
    pub absorbed_ids: Vec<String>,
}

/// Aggregate per-tier statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    pub tier: MemoryTier,
    pub count: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub avg_importance: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Access Events
// ─────────────────────────────────────────────────────────────────────────────

/// Operation that touched a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessOperation {
    Recall,
    Migrate,
    Consolidate,
    Restore,
}

impl AccessOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recall => "recall",
            Self::Migrate => "migrate",
            Self::Consolidate => "consolidate",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for AccessOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessOperation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "recall" => Ok(Self::Recall),
            "migrate" => Ok(Self::Migrate),
            "consolidate" => Ok(Self::Consolidate),
            "restore" => Ok(Self::Restore),
            _ => Err(format!("Unknown access operation: {}", s)),
        }
    }
}

/// Individual ranking signals and their weighted total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreComponents {
    pub semantic: f64,
    pub recency: f64,
    pub importance: f64,
    pub frequency: f64,
    pub total: f64,
}

/// Append-only record of an operation touching a memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEvent {
    /// Assigned by the database on insert
    #[serde(default)]
    pub id: Option<i64>,
    pub memory_id: String,
    pub timestamp: DateTime<Utc>,
    pub operation: AccessOperation,
    pub components: Option<ScoreComponents>,
    pub latency_ms: Option<u64>,
}

impl AccessEvent {
    pub fn new(memory_id: impl Into<String>, operation: AccessOperation, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            memory_id: memory_id.into(),
            timestamp,
            operation,
            components: None,
            latency_ms: None,
        }
    }

    pub fn with_components(mut self, components: ScoreComponents) -> Self {
        self.components = Some(components);
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Access counts for one memory over a window.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessCount {
    pub memory_id: String,
    pub count: u64,
    pub last_access: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// State Snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// Persisted snapshot row. `payload` is JSON, zstd-compressed when `compressed`.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub id: String,
    pub scope: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub importance: f64,
    pub compressed: bool,
    pub size_bytes: u64,
    pub payload: Vec<u8>,
}

/// Snapshot row without its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub id: String,
    pub scope: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub importance: f64,
    pub compressed: bool,
    pub size_bytes: u64,
}

impl SnapshotSummary {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl From<&SnapshotRecord> for SnapshotSummary {
    fn from(record: &SnapshotRecord) -> Self {
        Self {
            id: record.id.clone(),
            scope: record.scope.clone(),
            name: record.name.clone(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            importance: record.importance,
            compressed: record.compressed,
            size_bytes: record.size_bytes,
        }
    }
}
