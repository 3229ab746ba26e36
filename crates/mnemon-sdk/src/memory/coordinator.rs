//! Dual-write coordinator
//!
//! The structured store is written synchronously inside one transaction; the
//! vector store is fed asynchronously through the [`VectorWriteQueue`]. No
//! transaction spans both stores: a committed memory whose vector write is
//! lost is still authoritative and is repaired by reconciliation.

use mnemon_core::{Memory, MemoryTier};
use std::sync::Arc;
use tracing::{debug, info};

use super::embeddings::EmbeddingProvider;
use super::importance::ImportanceAssessor;
use super::queue::{VectorOp, VectorWriteQueue};
use super::store::StructuredStore;
use super::types::{StoreOutcome, StoreRequest};
use crate::config::MemoryConfig;
use crate::utils::{content_hash, now_utc, validate_content, validate_memory_id};
use crate::{SDKError, SDKResult};

#[derive(Clone)]
pub struct DualWriteCoordinator {
    store: StructuredStore,
    queue: VectorWriteQueue,
    embedder: Arc<dyn EmbeddingProvider>,
    assessor: Arc<dyn ImportanceAssessor>,
    config: MemoryConfig,
}

impl DualWriteCoordinator {
    pub fn new(
        store: StructuredStore,
        queue: VectorWriteQueue,
        embedder: Arc<dyn EmbeddingProvider>,
        assessor: Arc<dyn ImportanceAssessor>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            store,
            queue,
            embedder,
            assessor,
            config,
        }
    }

    /// Embed text, checking the provider honors its declared dimensionality
    pub async fn embed(&self, text: &str) -> SDKResult<Vec<f32>> {
        let vector = self.embedder.embed(text).await?;
        if vector.len() != self.embedder.dimensions() {
            return Err(SDKError::validation(format!(
                "embedding has {} dimensions, expected {}",
                vector.len(),
                self.embedder.dimensions()
            )));
        }
        Ok(vector)
    }

    /// Validate, assess, and persist a memory; then queue its vector.
    pub async fn store_memory(&self, request: StoreRequest) -> SDKResult<StoreOutcome> {
        validate_content(&request.content)?;
        request.metadata.validate()?;

        if let Some(parent_id) = &request.parent_memory_id {
            validate_memory_id(parent_id)?;
            if self.store.get(parent_id).await?.is_none() {
                return Err(SDKError::not_found("Memory", parent_id.clone()));
            }
        }

        let hash = content_hash(&request.content);
        if let Some(existing) = self.store.find_by_hash(&hash, request.context).await? {
            debug!(id = %existing.id, context = %request.context, "identical memory already stored");
            return Ok(StoreOutcome {
                stored: true,
                id: Some(existing.id),
                tier: Some(existing.tier),
                importance: Some(existing.importance),
                reason: Some("identical content already stored".into()),
                deduplicated: true,
            });
        }

        let embedding = self.embed(&request.content).await?;

        let importance = self
            .assessor
            .assess(&request.content, request.context)
            .await?;
        if !(0.0..=1.0).contains(&importance) {
            return Err(SDKError::validation(format!(
                "importance must be within [0, 1], assessor returned {}",
                importance
            )));
        }

        if importance < self.config.importance_threshold {
            debug!(importance, threshold = self.config.importance_threshold, "memory below importance threshold");
            return Ok(StoreOutcome {
                stored: false,
                id: None,
                tier: None,
                importance: Some(importance),
                reason: Some(format!(
                    "importance {:.2} below threshold {:.2}",
                    importance, self.config.importance_threshold
                )),
                deduplicated: false,
            });
        }

        let now = now_utc();
        let memory = Memory {
            id: uuid::Uuid::new_v4().to_string(),
            content: request.content,
            content_hash: hash,
            context: request.context,
            importance,
            embedding,
            tier: MemoryTier::Working,
            created_at: now,
            accessed_at: now,
            modified_at: now,
            access_count: 0,
            tier_migrated_at: None,
            parent_memory_id: request.parent_memory_id,
            consolidated_from: Vec::new(),
            metadata: request.metadata,
        };
        let id = memory.id.clone();
        let vector = memory.embedding.clone();

        self.store.insert(memory).await?;
        self.queue.enqueue(VectorOp::Upsert {
            id: id.clone(),
            vector,
        });

        info!(id = %id, context = %request.context, importance, "memory stored");
        Ok(StoreOutcome {
            stored: true,
            id: Some(id),
            tier: Some(MemoryTier::Working),
            importance: Some(importance),
            reason: None,
            deduplicated: false,
        })
    }

    /// Delete from the structured store, then queue the vector delete
    pub async fn delete_memory(&self, id: &str) -> SDKResult<()> {
        validate_memory_id(id)?;
        if !self.store.delete(id).await? {
            return Err(SDKError::not_found("Memory", id));
        }
        self.queue.enqueue(VectorOp::Delete { id: id.to_string() });
        info!(id, "memory deleted");
        Ok(())
    }

    /// Delete many; missing ids are ignored. Returns rows removed.
    pub async fn delete_many(&self, ids: Vec<String>) -> SDKResult<usize> {
        let deleted = self.store.delete_many(ids.clone()).await?;
        for id in ids {
            self.queue.enqueue(VectorOp::Delete { id });
        }
        Ok(deleted)
    }

    /// Queue a vector upsert for a record already committed
    pub fn queue_upsert(&self, id: &str, vector: Vec<f32>) {
        self.queue.enqueue(VectorOp::Upsert {
            id: id.to_string(),
            vector,
        });
    }

    /// Queue a vector delete for a record already removed
    pub fn queue_delete(&self, id: &str) {
        self.queue.enqueue(VectorOp::Delete { id: id.to_string() });
    }

    pub fn queue(&self) -> &VectorWriteQueue {
        &self.queue
    }

    pub fn store(&self) -> &StructuredStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VectorQueueConfig;
    use crate::memory::importance::{FixedAssessor, HeuristicAssessor};
    use crate::memory::testing::{FlakyVectorStore, StubEmbedder};
    use crate::memory::vector::{InMemoryVectorStore, VectorStore};
    use mnemon_core::{Database, MemoryContext, Metadata};
    use serde_json::json;
    use std::time::Duration;

    const DIMS: usize = 16;

    fn setup(
        vectors: Arc<dyn VectorStore>,
        assessor: Arc<dyn ImportanceAssessor>,
    ) -> DualWriteCoordinator {
        let db = Database::open_in_memory().unwrap();
        db.migrate_memory_schema().unwrap();
        let store = StructuredStore::new(Arc::new(db), Duration::from_secs(5));
        let (queue, _worker) = VectorWriteQueue::start(
            vectors,
            VectorQueueConfig {
                capacity: 64,
                max_retries: 2,
                retry_base_ms: 1,
            },
            Duration::from_secs(1),
        );
        DualWriteCoordinator::new(
            store,
            queue,
            Arc::new(StubEmbedder::new(DIMS)),
            assessor,
            MemoryConfig {
                importance_threshold: 0.3,
                embedding_dimensions: DIMS,
            },
        )
    }

    #[tokio::test]
    async fn test_store_writes_both_stores() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let coordinator = setup(vectors.clone(), Arc::new(HeuristicAssessor));

        let outcome = coordinator
            .store_memory(StoreRequest::new(
                "The user prefers dark mode",
                MemoryContext::UserPreference,
            ))
            .await
            .unwrap();

        assert!(outcome.stored);
        assert_eq!(outcome.tier, Some(MemoryTier::Working));
        let importance = outcome.importance.unwrap();
        assert!((0.0..=1.0).contains(&importance));

        let id = outcome.id.unwrap();
        let memory = coordinator.store().get(&id).await.unwrap().unwrap();
        assert_eq!(memory.tier, MemoryTier::Working);
        assert_eq!(memory.embedding.len(), DIMS);

        coordinator.queue().flush().await;
        assert_eq!(vectors.ids().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_below_threshold_is_not_persisted() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let coordinator = setup(vectors.clone(), Arc::new(FixedAssessor(0.1)));

        let outcome = coordinator
            .store_memory(StoreRequest::new("passing remark", MemoryContext::Conversation))
            .await
            .unwrap();

        assert!(!outcome.stored);
        assert!(outcome.id.is_none());
        assert_eq!(outcome.importance, Some(0.1));
        assert!(outcome.reason.is_some());
        assert_eq!(coordinator.store().count().await.unwrap(), 0);
        coordinator.queue().flush().await;
        assert_eq!(vectors.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_importance_is_rejected() {
        let coordinator = setup(Arc::new(InMemoryVectorStore::new()), Arc::new(FixedAssessor(1.5)));
        let err = coordinator
            .store_memory(StoreRequest::new("something", MemoryContext::General))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let coordinator = setup(Arc::new(InMemoryVectorStore::new()), Arc::new(FixedAssessor(f64::NAN)));
        assert!(
            coordinator
                .store_memory(StoreRequest::new("something", MemoryContext::General))
                .await
                .unwrap_err()
                .is_validation()
        );
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let coordinator = setup(Arc::new(InMemoryVectorStore::new()), Arc::new(FixedAssessor(0.9)));

        let err = coordinator
            .store_memory(StoreRequest::new("   ", MemoryContext::General))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let bad_metadata = Metadata::default().with_extra("has space", json!(1));
        let err = coordinator
            .store_memory(StoreRequest::new("x y z", MemoryContext::General).with_metadata(bad_metadata))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = coordinator
            .store_memory(
                StoreRequest::new("x y z", MemoryContext::General)
                    .with_parent(uuid::Uuid::new_v4().to_string()),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_identical_content_is_deduplicated() {
        let coordinator = setup(Arc::new(InMemoryVectorStore::new()), Arc::new(FixedAssessor(0.9)));
        let request = StoreRequest::new("Use cargo nextest for tests", MemoryContext::ProjectKnowledge);

        let first = coordinator.store_memory(request.clone()).await.unwrap();
        let second = coordinator.store_memory(request).await.unwrap();

        assert!(second.deduplicated);
        assert_eq!(first.id, second.id);
        assert_eq!(coordinator.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_vector_failure_does_not_fail_store() {
        let vectors = Arc::new(FlakyVectorStore::failing_first(100));
        let coordinator = setup(vectors.clone(), Arc::new(FixedAssessor(0.9)));

        let outcome = coordinator
            .store_memory(StoreRequest::new("still stored", MemoryContext::General))
            .await
            .unwrap();
        assert!(outcome.stored);

        coordinator.queue().flush().await;
        assert_eq!(coordinator.queue().stats().failed, 1);
        assert_eq!(coordinator.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_memory() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let coordinator = setup(vectors.clone(), Arc::new(FixedAssessor(0.9)));
        let id = coordinator
            .store_memory(StoreRequest::new("temporary", MemoryContext::General))
            .await
            .unwrap()
            .id
            .unwrap();

        coordinator.delete_memory(&id).await.unwrap();
        coordinator.queue().flush().await;
        assert_eq!(vectors.len().await.unwrap(), 0);
        assert!(coordinator.delete_memory(&id).await.unwrap_err().is_not_found());
        assert!(coordinator.delete_memory("nope").await.unwrap_err().is_validation());
    }
}
