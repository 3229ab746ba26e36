//! SDK Configuration
//!
//! Defines configuration options for the memory engine. Every section has
//! defaults, so a TOML file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::SDKResult;

/// Database path that opens a private in-memory database
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Longest accepted time window of any kind (100 years)
pub const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 3600;

/// SDK configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SDKConfig {
    /// Path to the memory database (memories + access events)
    pub database_path: PathBuf,

    /// Path to the snapshot database
    pub snapshot_database_path: PathBuf,

    /// Storage configuration
    pub memory: MemoryConfig,

    /// Retrieval and ranking configuration
    pub retrieval: RetrievalConfig,

    /// Tier classification and migration configuration
    pub tiers: TierConfig,

    /// Consolidation configuration
    pub consolidation: ConsolidationConfig,

    /// Vector write queue configuration
    pub vector_queue: VectorQueueConfig,

    /// State snapshot configuration
    pub snapshots: SnapshotConfig,

    /// Access analytics configuration
    pub analytics: AnalyticsConfig,
}

impl Default for SDKConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("memory.db"),
            snapshot_database_path: PathBuf::from("snapshots.db"),
            memory: MemoryConfig::default(),
            retrieval: RetrievalConfig::default(),
            tiers: TierConfig::default(),
            consolidation: ConsolidationConfig::default(),
            vector_queue: VectorQueueConfig::default(),
            snapshots: SnapshotConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Memories assessed below this importance are not stored (default: 0.3)
    pub importance_threshold: f64,

    /// Expected embedding dimensionality (default: 384)
    pub embedding_dimensions: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            importance_threshold: 0.3,
            embedding_dimensions: 384,
        }
    }
}

/// Weights of the four recall signals. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallWeights {
    pub semantic: f64,
    pub recency: f64,
    pub importance: f64,
    pub frequency: f64,
}

impl Default for RecallWeights {
    fn default() -> Self {
        Self {
            semantic: 0.4,
            recency: 0.3,
            importance: 0.2,
            frequency: 0.1,
        }
    }
}

impl RecallWeights {
    pub fn sum(&self) -> f64 {
        self.semantic + self.recency + self.importance + self.frequency
    }
}

/// Retrieval and ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Weight of the exact component in hybrid search (default: 0.4)
    pub exact_weight: f64,

    /// Recall ranking weights
    pub weights: RecallWeights,

    /// Recency decay per hour since last access (default: 0.01)
    pub decay_rate: f64,

    /// Semantic candidates fetched per requested result (default: 3)
    pub candidate_multiplier: usize,

    /// Result limit when callers don't give one (default: 10)
    pub default_limit: usize,

    /// Vector store call deadline in milliseconds (default: 500)
    pub vector_timeout_ms: u64,

    /// Structured store call deadline in milliseconds (default: 5000)
    pub store_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            exact_weight: 0.4,
            weights: RecallWeights::default(),
            decay_rate: 0.01,
            candidate_multiplier: 3,
            default_limit: 10,
            vector_timeout_ms: 500,
            store_timeout_ms: 5000,
        }
    }
}

impl RetrievalConfig {
    pub fn vector_timeout(&self) -> Duration {
        Duration::from_millis(self.vector_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// What to do with a memory that ages past a window but misses the
/// importance bar for the next tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrunePolicy {
    /// Leave it in its tier and report it as pruning-eligible
    #[default]
    KeepInTier,
    /// Ignore the bar and migrate anyway
    PromoteAnyway,
}

/// Tier classification and migration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Run the migration scheduler in the background (default: true)
    pub enabled: bool,

    /// Working window in seconds (default: 172800 = 48 hours)
    pub working_window_secs: u64,

    /// Session window in seconds (default: 1209600 = 14 days)
    pub session_window_secs: u64,

    /// Overlap during which a memory matches both tiers (default: 7200 = 2 hours)
    pub overlap_secs: u64,

    /// Scheduler interval in seconds (default: 3600 = 1 hour)
    pub interval_secs: u64,

    /// Records migrated per batch (default: 100)
    pub batch_size: usize,

    /// Minimum importance to enter the session tier
    pub session_min_importance: Option<f64>,

    /// Minimum importance to enter the long-term tier
    pub longterm_min_importance: Option<f64>,

    /// Handling of memories below a promotion bar
    pub prune_policy: PrunePolicy,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            working_window_secs: 48 * 3600,       // 48 hours
            session_window_secs: 14 * 24 * 3600,  // 14 days
            overlap_secs: 2 * 3600,               // 2 hours
            interval_secs: 3600,                  // 1 hour
            batch_size: 100,
            session_min_importance: None,
            longterm_min_importance: None,
            prune_policy: PrunePolicy::KeepInTier,
        }
    }
}

/// Consolidation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Run consolidation in the background (default: false)
    pub enabled: bool,

    /// Cosine similarity at or above which memories merge (default: 0.85)
    pub similarity_threshold: f64,

    /// Background interval in seconds (default: 21600 = 6 hours)
    pub interval_secs: u64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            similarity_threshold: 0.85,
            interval_secs: 6 * 3600, // 6 hours
        }
    }
}

/// Vector write queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorQueueConfig {
    /// Pending operations kept before the oldest is dropped (default: 1024)
    pub capacity: usize,

    /// Attempts per operation before giving up (default: 5)
    pub max_retries: u32,

    /// Initial backoff in milliseconds, doubled per attempt (default: 50)
    pub retry_base_ms: u64,
}

impl Default for VectorQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_retries: 5,
            retry_base_ms: 50,
        }
    }
}

/// State snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Snapshots retained per scope (default: 20)
    pub max_per_scope: usize,

    /// Hot memory ids captured per tier (default: 50)
    pub hot_limit: usize,

    /// Compress payloads with zstd (default: true)
    pub compress: bool,

    /// zstd level (default: 3)
    pub compression_level: i32,

    /// Unexpired snapshots at or above this importance are never pruned (default: 0.8)
    pub protect_importance: f64,

    /// Default time-to-live in seconds; none means no expiry
    pub default_ttl_secs: Option<u64>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_per_scope: 20,
            hot_limit: 50,
            compress: true,
            compression_level: 3,
            protect_importance: 0.8,
            default_ttl_secs: None,
        }
    }
}

/// Access analytics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Accesses within the window that suggest early promotion (default: 5)
    pub early_promotion_accesses: u64,

    /// Hours without access after which a memory is flagged stale (default: 336 = 14 days)
    pub stale_after_hours: u64,

    /// Access events older than this are pruned (default: 30)
    pub event_retention_days: u64,

    /// Default analysis window in hours (default: 24)
    pub window_hours: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            early_promotion_accesses: 5,
            stale_after_hours: 14 * 24, // 14 days
            event_retention_days: 30,
            window_hours: 24,
        }
    }
}

impl SDKConfig {
    /// Create a new SDK config with the given database paths
    pub fn new(database_path: impl Into<PathBuf>, snapshot_database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            snapshot_database_path: snapshot_database_path.into(),
            ..Default::default()
        }
    }

    /// Config backed by in-memory databases
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH, IN_MEMORY_PATH)
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigValidationError> {
        toml::from_str(text).map_err(|e| ConfigValidationError::Parse {
            message: e.to_string(),
        })
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> SDKResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set storage configuration
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    /// Set retrieval configuration
    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    /// Set tier configuration
    pub fn with_tiers(mut self, tiers: TierConfig) -> Self {
        self.tiers = tiers;
        self
    }

    /// Set consolidation configuration
    pub fn with_consolidation(mut self, consolidation: ConsolidationConfig) -> Self {
        self.consolidation = consolidation;
        self
    }

    /// Set vector queue configuration
    pub fn with_vector_queue(mut self, vector_queue: VectorQueueConfig) -> Self {
        self.vector_queue = vector_queue;
        self
    }

    /// Set snapshot configuration
    pub fn with_snapshots(mut self, snapshots: SnapshotConfig) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// Set analytics configuration
    pub fn with_analytics(mut self, analytics: AnalyticsConfig) -> Self {
        self.analytics = analytics;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        unit_interval("memory.importance_threshold", self.memory.importance_threshold)?;
        positive("memory.embedding_dimensions", self.memory.embedding_dimensions as u64)?;

        let retrieval = &self.retrieval;
        unit_interval("retrieval.exact_weight", retrieval.exact_weight)?;
        for (field, weight) in [
            ("retrieval.weights.semantic", retrieval.weights.semantic),
            ("retrieval.weights.recency", retrieval.weights.recency),
            ("retrieval.weights.importance", retrieval.weights.importance),
            ("retrieval.weights.frequency", retrieval.weights.frequency),
        ] {
            unit_interval(field, weight)?;
        }
        if (retrieval.weights.sum() - 1.0).abs() > 1e-6 {
            return Err(invalid("retrieval.weights", "must sum to 1"));
        }
        if !retrieval.decay_rate.is_finite() || retrieval.decay_rate < 0.0 {
            return Err(invalid("retrieval.decay_rate", "must be a non-negative number"));
        }
        positive("retrieval.candidate_multiplier", retrieval.candidate_multiplier as u64)?;
        positive("retrieval.default_limit", retrieval.default_limit as u64)?;
        positive("retrieval.vector_timeout_ms", retrieval.vector_timeout_ms)?;
        positive("retrieval.store_timeout_ms", retrieval.store_timeout_ms)?;

        let tiers = &self.tiers;
        positive("tiers.working_window_secs", tiers.working_window_secs)?;
        bounded_secs("tiers.working_window_secs", tiers.working_window_secs)?;
        bounded_secs("tiers.session_window_secs", tiers.session_window_secs)?;
        bounded_secs("tiers.overlap_secs", tiers.overlap_secs)?;
        if tiers.session_window_secs <= tiers.working_window_secs {
            return Err(invalid(
                "tiers.session_window_secs",
                "must be greater than tiers.working_window_secs",
            ));
        }
        positive("tiers.interval_secs", tiers.interval_secs)?;
        positive("tiers.batch_size", tiers.batch_size as u64)?;
        if let Some(bar) = tiers.session_min_importance {
            unit_interval("tiers.session_min_importance", bar)?;
        }
        if let Some(bar) = tiers.longterm_min_importance {
            unit_interval("tiers.longterm_min_importance", bar)?;
        }

        let threshold = self.consolidation.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(invalid(
                "consolidation.similarity_threshold",
                "must be in (0, 1]",
            ));
        }
        positive("consolidation.interval_secs", self.consolidation.interval_secs)?;

        positive("vector_queue.capacity", self.vector_queue.capacity as u64)?;
        positive("vector_queue.max_retries", self.vector_queue.max_retries as u64)?;

        positive("snapshots.max_per_scope", self.snapshots.max_per_scope as u64)?;
        if let Some(ttl) = self.snapshots.default_ttl_secs {
            positive("snapshots.default_ttl_secs", ttl)?;
            bounded_secs("snapshots.default_ttl_secs", ttl)?;
        }
        unit_interval("snapshots.protect_importance", self.snapshots.protect_importance)?;
        if !(1..=22).contains(&self.snapshots.compression_level) {
            return Err(invalid("snapshots.compression_level", "must be between 1 and 22"));
        }

        let analytics = &self.analytics;
        positive("analytics.window_hours", analytics.window_hours)?;
        bounded_secs(
            "analytics.window_hours",
            analytics.window_hours.saturating_mul(3600),
        )?;
        bounded_secs(
            "analytics.event_retention_days",
            analytics.event_retention_days.saturating_mul(86_400),
        )?;

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigValidationError {
    ConfigValidationError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

fn unit_interval(field: &str, value: f64) -> Result<(), ConfigValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must be between 0 and 1"))
    }
}

fn positive(field: &str, value: u64) -> Result<(), ConfigValidationError> {
    if value == 0 {
        Err(invalid(field, "must be greater than 0"))
    } else {
        Ok(())
    }
}

fn bounded_secs(field: &str, secs: u64) -> Result<(), ConfigValidationError> {
    if secs > MAX_WINDOW_SECS {
        Err(invalid(field, "must not exceed 100 years"))
    } else {
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("failed to parse configuration: {message}")]
    Parse { message: String },
}
