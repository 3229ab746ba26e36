//! Main Engine Entry Point
//!
//! Provides the [`MemoryEngine`] that ties together storage, tiering,
//! retrieval, consolidation, analytics and snapshots.

use chrono::{DateTime, Utc};
use mnemon_core::{AccessEvent, Database, Memory, MemoryContext, SnapshotSummary, TierStats};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ConfigValidationError, IN_MEMORY_PATH};
use crate::memory::{
    AccessAnalytics, AccessPattern, AccessRecorder, ConsolidationEngine, ConsolidationReport,
    DualWriteCoordinator, EmbeddingProvider, ExactSearchOptions, HashingEmbedder,
    HeuristicAssessor, HybridSearchOptions, ImportanceAssessor, InMemoryVectorStore,
    MigrationCandidate, MigrationReport, MigrationScheduler, PruneReport, QueueStats,
    RecallResult, ReconcileReport, RetrievalEngine, SearchResult, StoreOutcome, StoreRequest,
    StructuredStore, TierClassifier, VectorStore, VectorWriteQueue,
};
use crate::state::{
    CaptureOptions, ContextProvider, NoopContextProvider, RestoreReport, SnapshotManager,
    StateDiff, StateSnapshot,
};
use crate::utils::{now_utc, to_chrono, validate_memory_id};
use crate::{SDKConfig, SDKError, SDKResult};

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    /// Vector store unreachable; retrieval is exact-only
    Degraded,
    /// Structured store unreachable
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub structured_store: bool,
    pub vector_store: bool,
    pub memories: Option<u64>,
    pub vectors: Option<usize>,
    pub vector_queue: QueueStats,
    pub last_migration: Option<DateTime<Utc>>,
    pub embedder: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`MemoryEngine`]. Collaborators left unset get defaults:
/// feature-hashing embeddings, heuristic importance, an in-process vector
/// store, and a context provider that captures nothing.
pub struct MemoryEngineBuilder {
    config: SDKConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    assessor: Option<Arc<dyn ImportanceAssessor>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    context_provider: Option<Arc<dyn ContextProvider>>,
}

impl MemoryEngineBuilder {
    pub fn new(config: SDKConfig) -> Self {
        Self {
            config,
            embedder: None,
            assessor: None,
            vector_store: None,
            context_provider: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_assessor(mut self, assessor: Arc<dyn ImportanceAssessor>) -> Self {
        self.assessor = Some(assessor);
        self
    }

    pub fn with_vector_store(mut self, vector_store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(vector_store);
        self
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    /// Open both databases, run migrations, and start the vector queue and
    /// access recorder workers. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The embedder's dimensionality differs from the configured one
    /// - Either database cannot be opened or migrated
    pub fn build(self) -> SDKResult<MemoryEngine> {
        let config = self.config;
        config.validate()?;

        let embedder = self
            .embedder
            .unwrap_or_else(|| Arc::new(HashingEmbedder::new(config.memory.embedding_dimensions)));
        if embedder.dimensions() != config.memory.embedding_dimensions {
            return Err(ConfigValidationError::InvalidValue {
                field: "memory.embedding_dimensions".into(),
                message: format!(
                    "embedder '{}' produces {} dimensions, configured {}",
                    embedder.name(),
                    embedder.dimensions(),
                    config.memory.embedding_dimensions
                ),
            }
            .into());
        }
        let assessor = self
            .assessor
            .unwrap_or_else(|| Arc::new(HeuristicAssessor));
        let vectors = self
            .vector_store
            .unwrap_or_else(|| Arc::new(InMemoryVectorStore::new()));
        let provider = self
            .context_provider
            .unwrap_or_else(|| Arc::new(NoopContextProvider));

        let memory_db = open_database(&config.database_path)?;
        memory_db.migrate_memory_schema()?;
        let snapshot_db = open_database(&config.snapshot_database_path)?;
        snapshot_db.migrate_snapshot_schema()?;

        let store_timeout = config.retrieval.store_timeout();
        let store = StructuredStore::new(Arc::new(memory_db), store_timeout);
        let snapshot_store = StructuredStore::new(Arc::new(snapshot_db), store_timeout);

        let (queue, queue_worker) = VectorWriteQueue::start(
            Arc::clone(&vectors),
            config.vector_queue.clone(),
            config.retrieval.vector_timeout(),
        );
        let (recorder, recorder_worker) = AccessRecorder::start(store.clone());

        let coordinator = DualWriteCoordinator::new(
            store.clone(),
            queue,
            Arc::clone(&embedder),
            assessor,
            config.memory.clone(),
        );
        let classifier = TierClassifier::new(&config.tiers);
        let analytics = AccessAnalytics::new(store.clone(), config.analytics.clone());
        let retrieval = RetrievalEngine::new(
            coordinator.clone(),
            Arc::clone(&vectors),
            classifier.clone(),
            recorder.clone(),
            config.retrieval.clone(),
        );
        let scheduler = MigrationScheduler::new(
            coordinator.clone(),
            recorder.clone(),
            analytics.clone(),
            config.tiers.clone(),
        );
        let consolidation = ConsolidationEngine::new(
            coordinator.clone(),
            recorder.clone(),
            config.consolidation.clone(),
        );
        let snapshots = SnapshotManager::new(
            snapshot_store,
            store,
            classifier,
            recorder.clone(),
            provider,
            config.snapshots.clone(),
        );

        let (shutdown_tx, _) = watch::channel(false);

        Ok(MemoryEngine {
            embedder_name: embedder.name().to_string(),
            config,
            coordinator,
            vectors,
            retrieval,
            scheduler,
            consolidation,
            analytics,
            recorder,
            snapshots,
            shutdown_tx,
            background: Mutex::new(Vec::new()),
            workers: Mutex::new(vec![queue_worker, recorder_worker]),
            initialized: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }
}

fn open_database(path: &Path) -> SDKResult<Database> {
    if path.as_os_str() == IN_MEMORY_PATH {
        Ok(Database::open_in_memory()?)
    } else {
        Ok(Database::open_path(path)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// mnemon memory engine - main entry point
///
/// # Example
///
/// ```rust,no_run
/// use mnemon_sdk::{MemoryEngine, SDKConfig, StoreRequest};
/// use mnemon_core::MemoryContext;
///
/// async fn example() -> mnemon_sdk::SDKResult<()> {
///     let engine = MemoryEngine::new(SDKConfig::new("memory.db", "snapshots.db"))?;
///     engine.initialize().await?;
///
///     engine
///         .store_memory(StoreRequest::new("User prefers tabs", MemoryContext::UserPreference))
///         .await?;
///     let hits = engine.recall_memories("indentation", None, Some(5)).await?;
///
///     engine.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct MemoryEngine {
    config: SDKConfig,
    coordinator: DualWriteCoordinator,
    vectors: Arc<dyn VectorStore>,
    retrieval: RetrievalEngine,
    scheduler: MigrationScheduler,
    consolidation: ConsolidationEngine,
    analytics: AccessAnalytics,
    recorder: AccessRecorder,
    snapshots: SnapshotManager,
    embedder_name: String,

    /// Flipped to true on shutdown; background loops watch it
    shutdown_tx: watch::Sender<bool>,
    /// Migration and consolidation loops
    background: Mutex<Vec<JoinHandle<()>>>,
    /// Vector queue worker and access recorder writer
    workers: Mutex<Vec<JoinHandle<()>>>,
    initialized: AtomicBool,
    shut_down: AtomicBool,
}

impl MemoryEngine {
    /// Create an engine with default collaborators
    pub fn new(config: SDKConfig) -> SDKResult<Self> {
        MemoryEngineBuilder::new(config).build()
    }

    pub fn builder(config: SDKConfig) -> MemoryEngineBuilder {
        MemoryEngineBuilder::new(config)
    }

    /// Start background migration (and consolidation, when enabled).
    /// Calling it again is a no-op.
    pub async fn initialize(&self) -> SDKResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut background = self.background.lock().await;
        if self.config.tiers.enabled {
            background.push(self.scheduler.spawn(self.shutdown_tx.subscribe()));
        }
        if self.config.consolidation.enabled {
            background.push(self.consolidation.spawn(self.shutdown_tx.subscribe()));
        }
        info!(
            migration = self.config.tiers.enabled,
            consolidation = self.config.consolidation.enabled,
            embedder = %self.embedder_name,
            "memory engine initialized"
        );
        Ok(())
    }

    /// Stop background loops (each finishes its current record), drain the
    /// vector queue and the access recorder, and stop their workers.
    pub async fn shutdown(&self) -> SDKResult<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown_tx.send_replace(true);

        for handle in self.background.lock().await.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }

        let queue = self.coordinator.queue();
        queue.flush().await;
        queue.close();
        self.recorder.flush().await;
        self.recorder.close();

        for handle in self.workers.lock().await.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker ended abnormally");
            }
        }
        info!("memory engine shut down");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SDKConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Storage
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn store_memory(&self, request: StoreRequest) -> SDKResult<StoreOutcome> {
        self.coordinator.store_memory(request).await
    }

    pub async fn get_memory(&self, id: &str) -> SDKResult<Memory> {
        validate_memory_id(id)?;
        self.coordinator
            .store()
            .get(id)
            .await?
            .ok_or_else(|| SDKError::not_found("Memory", id))
    }

    pub async fn delete_memory(&self, id: &str) -> SDKResult<()> {
        self.coordinator.delete_memory(id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Retrieval
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn recall_memories(
        &self,
        query: &str,
        context: Option<MemoryContext>,
        limit: Option<usize>,
    ) -> SDKResult<Vec<RecallResult>> {
        self.retrieval.recall(query, context, limit, now_utc()).await
    }

    pub async fn search_exact(&self, query: &str, options: ExactSearchOptions) -> SDKResult<Vec<Memory>> {
        self.retrieval.search_exact(query, options, now_utc()).await
    }

    pub async fn search_hybrid(
        &self,
        query: &str,
        options: HybridSearchOptions,
    ) -> SDKResult<Vec<SearchResult>> {
        self.retrieval.search_hybrid(query, options, now_utc()).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tiers
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_tier_stats(&self) -> SDKResult<Vec<TierStats>> {
        self.analytics.tier_stats().await
    }

    pub async fn get_memories_for_migration(&self) -> SDKResult<Vec<MigrationCandidate>> {
        self.scheduler.candidates(now_utc()).await
    }

    /// Run one migration pass now, independent of the background schedule
    pub async fn run_migration(&self) -> SDKResult<MigrationReport> {
        let shutdown = self.shutdown_tx.subscribe();
        self.scheduler.run_once(now_utc(), &shutdown).await
    }

    pub async fn prune_memories(&self) -> SDKResult<PruneReport> {
        self.scheduler.prune(now_utc()).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Consolidation
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn consolidate_memories(&self, threshold: Option<f64>) -> SDKResult<ConsolidationReport> {
        let shutdown = self.shutdown_tx.subscribe();
        self.consolidation.consolidate(threshold, Some(&shutdown)).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Snapshots
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn capture_state(
        &self,
        scope: &str,
        name: Option<&str>,
        options: CaptureOptions,
    ) -> SDKResult<SnapshotSummary> {
        self.snapshots.capture(scope, name, options, now_utc()).await
    }

    pub async fn restore_state(&self, id: &str) -> SDKResult<RestoreReport> {
        self.snapshots.restore(id, now_utc()).await
    }

    pub async fn list_states(&self, scope: Option<&str>) -> SDKResult<Vec<SnapshotSummary>> {
        self.snapshots.list(scope).await
    }

    pub async fn get_state(&self, id: &str) -> SDKResult<StateSnapshot> {
        self.snapshots.get(id).await
    }

    pub async fn diff_states(&self, from: &str, to: &str) -> SDKResult<StateDiff> {
        self.snapshots.diff(from, to).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Analytics
    // ─────────────────────────────────────────────────────────────────────────

    /// Access summaries over `window` (default from configuration)
    pub async fn access_patterns(&self, window: Option<Duration>) -> SDKResult<Vec<AccessPattern>> {
        self.analytics
            .access_patterns(window.map(to_chrono), now_utc())
            .await
    }

    pub async fn access_history(&self, id: &str, limit: usize) -> SDKResult<Vec<AccessEvent>> {
        self.analytics.events_for(id, limit).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Bring the vector store back in line with the structured store:
    /// upsert missing vectors and delete vectors with no memory behind them.
    pub async fn reconcile_vectors(&self) -> SDKResult<ReconcileReport> {
        self.coordinator.queue().flush().await;

        let stored = self.coordinator.store().all_embeddings().await?;
        let timeout = self.config.retrieval.store_timeout();
        let indexed: HashSet<String> = match tokio::time::timeout(timeout, self.vectors.ids()).await {
            Ok(ids) => ids?.into_iter().collect(),
            Err(_) => {
                return Err(SDKError::timeout("vector store ids", timeout.as_millis() as u64));
            }
        };

        let mut report = ReconcileReport::default();
        let stored_ids: HashSet<&str> = stored.iter().map(|(id, _)| id.as_str()).collect();

        for (id, vector) in stored.iter().filter(|(id, v)| !indexed.contains(id) && !v.is_empty()) {
            match tokio::time::timeout(timeout, self.vectors.upsert(id, vector)).await {
                Ok(Ok(())) => report.upserted += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(id = %id, error = %e, "reconcile upsert failed");
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(id = %id, "reconcile upsert timed out");
                }
            }
        }
        for id in indexed.iter().filter(|id| !stored_ids.contains(id.as_str())) {
            match tokio::time::timeout(timeout, self.vectors.delete(id)).await {
                Ok(Ok(())) => report.removed += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(id = %id, error = %e, "reconcile delete failed");
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(id = %id, "reconcile delete timed out");
                }
            }
        }

        info!(
            upserted = report.upserted,
            removed = report.removed,
            failed = report.failed,
            "vector store reconciled"
        );
        Ok(report)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.coordinator.queue().stats()
    }

    pub async fn health(&self) -> HealthReport {
        let store = self.coordinator.store();
        let structured_store = store.ping().await.is_ok();
        let memories = if structured_store {
            store.count().await.ok()
        } else {
            None
        };
        let vectors =
            match tokio::time::timeout(self.config.retrieval.vector_timeout(), self.vectors.len()).await {
                Ok(Ok(len)) => Some(len),
                _ => None,
            };
        let vector_store = vectors.is_some();

        let status = if !structured_store {
            HealthStatus::Unavailable
        } else if !vector_store {
            HealthStatus::Degraded
        } else {
            HealthStatus::Ok
        };

        HealthReport {
            status,
            structured_store,
            vector_store,
            memories,
            vectors,
            vector_queue: self.queue_stats(),
            last_migration: self.scheduler.last_run(),
            embedder: self.embedder_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryConfig, RetrievalConfig};
    use crate::memory::testing::{unit, FlakyVectorStore, HangingSearchStore, StubEmbedder};
    use crate::memory::FixedAssessor;
    use chrono::Duration as ChronoDuration;
    use mnemon_core::{AccessOperation, MemoryTier, Metadata};

    const DIMS: usize = 8;

    fn config() -> SDKConfig {
        SDKConfig::in_memory().with_memory(MemoryConfig {
            importance_threshold: 0.3,
            embedding_dimensions: DIMS,
        })
    }

    fn engine_with(embedder: StubEmbedder, vectors: Arc<dyn VectorStore>) -> MemoryEngine {
        MemoryEngine::builder(config())
            .with_embedder(Arc::new(embedder))
            .with_assessor(Arc::new(FixedAssessor(0.6)))
            .with_vector_store(vectors)
            .build()
            .unwrap()
    }

    fn engine() -> (MemoryEngine, Arc<InMemoryVectorStore>) {
        let vectors = Arc::new(InMemoryVectorStore::new());
        (engine_with(StubEmbedder::new(DIMS), vectors.clone()), vectors)
    }

    #[tokio::test]
    async fn test_store_then_get() {
        let (engine, vectors) = engine();
        let outcome = engine
            .store_memory(StoreRequest::new(
                "Build with cargo build --release",
                MemoryContext::ProjectKnowledge,
            ))
            .await
            .unwrap();
        let id = outcome.id.unwrap();

        let memory = engine.get_memory(&id).await.unwrap();
        assert_eq!(memory.tier, MemoryTier::Working);
        assert_eq!(memory.importance, 0.6);

        engine.shutdown().await.unwrap();
        assert_eq!(vectors.ids().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_get_missing_and_invalid() {
        let (engine, _) = engine();
        assert!(engine.get_memory("not-a-uuid").await.unwrap_err().is_validation());
        let missing = uuid::Uuid::new_v4().to_string();
        assert!(engine.get_memory(&missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_config_error() {
        let result = MemoryEngine::builder(config())
            .with_embedder(Arc::new(StubEmbedder::new(DIMS + 1)))
            .build();
        assert!(matches!(result, Err(SDKError::Config(_))));
    }

    #[tokio::test]
    async fn test_consolidation_through_engine() {
        let first = "Deploys go through the staging cluster";
        let second = "Staging cluster receives every deploy first";
        let merged = "Deploys go through the staging cluster. Staging cluster receives every deploy first.";
        let embedder = StubEmbedder::new(DIMS)
            .with(first, unit(DIMS, 1, 2, 0.05))
            .with(second, unit(DIMS, 1, 2, 0.1))
            .with(merged, unit(DIMS, 1, 2, 0.07));
        let vectors = Arc::new(InMemoryVectorStore::new());
        let engine = engine_with(embedder, vectors.clone());

        let a = engine
            .store_memory(StoreRequest::new(first, MemoryContext::ProjectKnowledge))
            .await
            .unwrap()
            .id
            .unwrap();
        let b = engine
            .store_memory(StoreRequest::new(second, MemoryContext::ProjectKnowledge))
            .await
            .unwrap()
            .id
            .unwrap();

        // Both may land in the same millisecond; the seed is the oldest by
        // (created_at, id) as stored
        let (first_row, second_row) = (
            engine.get_memory(&a).await.unwrap(),
            engine.get_memory(&b).await.unwrap(),
        );
        let (seed, absorbed) = if (first_row.created_at, &first_row.id)
            <= (second_row.created_at, &second_row.id)
        {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };

        let report = engine.consolidate_memories(None).await.unwrap();
        assert_eq!(report.merged, 1);

        let survivor = engine.get_memory(&seed).await.unwrap();
        assert!(survivor.content.contains("staging cluster."));
        assert!(survivor.content.contains("every deploy first."));
        if seed == a {
            assert_eq!(survivor.content, merged);
        }
        assert_eq!(survivor.consolidated_from, vec![seed.clone(), absorbed.clone()]);
        assert!(engine.get_memory(&absorbed).await.unwrap_err().is_not_found());
        assert!(!engine.consolidate_memories(None).await.unwrap().has_changes());

        engine.shutdown().await.unwrap();
        assert_eq!(vectors.ids().await.unwrap(), vec![seed]);
    }

    #[tokio::test]
    async fn test_recall_finds_just_stored_content() {
        let engine = MemoryEngine::builder(SDKConfig::in_memory())
            .with_assessor(Arc::new(FixedAssessor(0.6)))
            .build()
            .unwrap();
        let content = "The billing service retries webhooks three times";

        let id = engine
            .store_memory(StoreRequest::new(content, MemoryContext::ProjectKnowledge))
            .await
            .unwrap()
            .id
            .unwrap();
        let results = engine.recall_memories(content, None, Some(5)).await.unwrap();

        let hit = results.iter().find(|r| r.memory.id == id).unwrap();
        assert!((hit.components.semantic - 1.0).abs() < 1e-6);
        assert_eq!(results[0].memory.id, id);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_analytics_window_is_rejected() {
        let (engine, _) = engine();
        let err = engine
            .access_patterns(Some(std::time::Duration::from_secs(10u64.pow(15))))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_aged_memory_migrates_and_stays_visible_in_overlap() {
        let (engine, _) = engine();
        let now = Utc::now();
        let created = now - ChronoDuration::hours(49);
        let id = uuid::Uuid::new_v4().to_string();
        engine
            .coordinator
            .store()
            .insert(Memory {
                id: id.clone(),
                content: "legacy build flags live in build.rs".into(),
                content_hash: crate::utils::content_hash("legacy build flags live in build.rs"),
                context: MemoryContext::ProjectKnowledge,
                importance: 0.6,
                embedding: unit(DIMS, 0, 1, 0.0),
                tier: MemoryTier::Working,
                created_at: created,
                accessed_at: created,
                modified_at: created,
                access_count: 0,
                tier_migrated_at: None,
                parent_memory_id: None,
                consolidated_from: Vec::new(),
                metadata: Metadata::default(),
            })
            .await
            .unwrap();

        let candidates = engine.get_memories_for_migration().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].target_tier, MemoryTier::Session);

        let report = engine.run_migration().await.unwrap();
        assert_eq!(report.migrated, 1);
        assert_eq!(engine.get_memory(&id).await.unwrap().tier, MemoryTier::Session);

        for tier in [MemoryTier::Working, MemoryTier::Session] {
            let hits = engine
                .search_exact(
                    "build flags",
                    ExactSearchOptions {
                        tier: Some(tier),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            assert_eq!(hits.len(), 1, "tier {}", tier);
        }

        let stats = engine.get_tier_stats().await.unwrap();
        let session = stats.iter().find(|s| s.tier == MemoryTier::Session).unwrap();
        assert_eq!(session.count, 1);
    }

    #[tokio::test]
    async fn test_hybrid_search_degrades_when_vector_search_hangs() {
        let vectors = Arc::new(HangingSearchStore::default());
        let engine = MemoryEngine::builder(config().with_retrieval(RetrievalConfig {
            vector_timeout_ms: 50,
            ..Default::default()
        }))
        .with_embedder(Arc::new(StubEmbedder::new(DIMS)))
        .with_assessor(Arc::new(FixedAssessor(0.6)))
        .with_vector_store(vectors)
        .build()
        .unwrap();

        engine
            .store_memory(StoreRequest::new("retry budget is five attempts", MemoryContext::Decision))
            .await
            .unwrap();

        let results = engine
            .search_hybrid("retry budget", HybridSearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].semantic_score, 0.0);
        assert!((results[0].score - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recall_updates_access_bookkeeping() {
        let (engine, _) = engine();
        let id = engine
            .store_memory(StoreRequest::new("Prefer tracing over println", MemoryContext::UserPreference))
            .await
            .unwrap()
            .id
            .unwrap();
        let before = engine.get_memory(&id).await.unwrap();

        let results = engine.recall_memories("tracing", None, Some(5)).await.unwrap();
        assert_eq!(results[0].memory.id, id);

        engine.recorder.flush().await;
        let after = engine.get_memory(&id).await.unwrap();
        assert_eq!(after.access_count, before.access_count + 1);
        assert!(after.accessed_at >= before.accessed_at);
        assert_eq!(after.importance, before.importance);
        assert_eq!(after.content, before.content);

        let history = engine.access_history(&id, 10).await.unwrap();
        assert_eq!(history[0].operation, AccessOperation::Recall);

        let patterns = engine.access_patterns(None).await.unwrap();
        assert_eq!(patterns[0].memory_id, id);
        assert_eq!(patterns[0].recent_accesses, 1);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_through_engine() {
        let (engine, _) = engine();
        let id = engine
            .store_memory(StoreRequest::new("Current task: tier migration", MemoryContext::TaskCritical))
            .await
            .unwrap()
            .id
            .unwrap();

        let first = engine
            .capture_state("session-1", Some("start"), CaptureOptions::default())
            .await
            .unwrap();
        let listed = engine.list_states(Some("session-1")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(engine.get_state(&first.id).await.unwrap().payload.working_ids, vec![id.clone()]);

        let report = engine.restore_state(&first.id).await.unwrap();
        assert_eq!(report.resurfaced, vec![id.clone()]);
        assert!(engine.diff_states(&first.id, &first.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_repairs_vector_store() {
        let (engine, vectors) = engine();
        let id = engine
            .store_memory(StoreRequest::new("reconcile me", MemoryContext::General))
            .await
            .unwrap()
            .id
            .unwrap();
        engine.coordinator.queue().flush().await;

        vectors.delete(&id).await.unwrap();
        vectors.upsert("orphan", &[1.0; DIMS]).await.unwrap();

        let report = engine.reconcile_vectors().await.unwrap();
        assert_eq!(report.upserted, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(vectors.ids().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_health_and_lifecycle() {
        let (engine, _) = engine();
        engine.initialize().await.unwrap();
        engine.initialize().await.unwrap();
        assert!(engine.is_initialized());

        let health = engine.health().await;
        assert_eq!(health.status, HealthStatus::Ok);
        assert_eq!(health.memories, Some(0));

        tokio::time::timeout(Duration::from_secs(5), engine.shutdown())
            .await
            .unwrap()
            .unwrap();
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_health_reports_degraded_vector_store() {
        let engine = MemoryEngine::builder(config())
            .with_embedder(Arc::new(StubEmbedder::new(DIMS)))
            .with_vector_store(Arc::new(FlakyVectorStore::failing_first(100)))
            .build()
            .unwrap();

        let health = engine.health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.structured_store);
        assert!(!health.vector_store);
        assert!(health.vectors.is_none());
        assert!(engine.reconcile_vectors().await.is_err());
    }
}
