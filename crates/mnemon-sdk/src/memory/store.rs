//! Async structured store adapter
//!
//! Wraps the synchronous [`Database`] so every call runs on the blocking pool
//! under a deadline. A call that exceeds the deadline fails with
//! [`SDKError::Timeout`]; the blocking work itself is left to finish.

use chrono::{DateTime, Utc};
use mnemon_core::{
    AccessCount, AccessEvent, Database, ExactQuery, Memory, MemoryContext, MemoryFilter,
    MemoryTier, MergeWrite, TierStats,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::{SDKError, SDKResult};

/// Structured (source-of-truth) store
#[derive(Clone)]
pub struct StructuredStore {
    db: Arc<Database>,
    timeout: Duration,
}

impl StructuredStore {
    pub fn new(db: Arc<Database>, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Underlying database handle
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub(crate) async fn call<T, F>(&self, operation: &'static str, f: F) -> SDKResult<T>
    where
        F: FnOnce(&Database) -> mnemon_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let task = tokio::task::spawn_blocking(move || f(&db));
        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                let duration_ms = self.timeout.as_millis() as u64;
                warn!(operation, duration_ms, "structured store call timed out");
                Err(SDKError::timeout(format!("structured store {}", operation), duration_ms))
            }
            Ok(Err(join_err)) => Err(SDKError::Other(anyhow::anyhow!(
                "structured store task for {} failed: {}",
                operation,
                join_err
            ))),
            Ok(Ok(result)) => result.map_err(SDKError::from),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Memories
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn insert(&self, memory: Memory) -> SDKResult<()> {
        self.call("insert", move |db| db.insert_memory(&memory)).await
    }

    pub async fn get(&self, id: &str) -> SDKResult<Option<Memory>> {
        let id = id.to_string();
        self.call("get", move |db| db.get_memory(&id)).await
    }

    pub async fn get_many(&self, ids: Vec<String>) -> SDKResult<Vec<Memory>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.call("get_many", move |db| db.get_memories(&ids)).await
    }

    pub async fn find_by_hash(&self, hash: &str, context: MemoryContext) -> SDKResult<Option<Memory>> {
        let hash = hash.to_string();
        self.call("find_by_hash", move |db| db.find_by_hash(&hash, context))
            .await
    }

    pub async fn list(&self, filter: MemoryFilter) -> SDKResult<Vec<Memory>> {
        self.call("list", move |db| db.list_memories(&filter)).await
    }

    pub async fn search_exact(&self, query: ExactQuery) -> SDKResult<Vec<Memory>> {
        self.call("search_exact", move |db| db.search_exact(&query))
            .await
    }

    pub async fn update_tier_if(
        &self,
        id: &str,
        from: MemoryTier,
        to: MemoryTier,
        at: DateTime<Utc>,
    ) -> SDKResult<bool> {
        let id = id.to_string();
        self.call("update_tier", move |db| db.update_tier_if(&id, from, to, at))
            .await
    }

    pub async fn touch(&self, ids: Vec<String>, at: DateTime<Utc>) -> SDKResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.call("touch", move |db| db.touch_memories(&ids, at)).await
    }

    pub async fn apply_merge(&self, merge: MergeWrite) -> SDKResult<()> {
        self.call("apply_merge", move |db| db.apply_merge(&merge)).await
    }

    pub async fn delete(&self, id: &str) -> SDKResult<bool> {
        let id = id.to_string();
        self.call("delete", move |db| db.delete_memory(&id)).await
    }

    pub async fn delete_many(&self, ids: Vec<String>) -> SDKResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.call("delete_many", move |db| db.delete_memories(&ids))
            .await
    }

    pub async fn all_embeddings(&self) -> SDKResult<Vec<(String, Vec<f32>)>> {
        self.call("all_embeddings", |db| db.all_embeddings()).await
    }

    pub async fn count(&self) -> SDKResult<u64> {
        self.call("count", |db| db.count_memories()).await
    }

    pub async fn tier_stats(&self) -> SDKResult<Vec<TierStats>> {
        self.call("tier_stats", |db| db.tier_stats()).await
    }

    pub async fn ping(&self) -> SDKResult<()> {
        self.call("ping", |db| db.ping()).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Access Events
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn record_events(&self, events: Vec<AccessEvent>) -> SDKResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        self.call("record_events", move |db| db.record_access_events(&events))
            .await
    }

    pub async fn events_for(&self, memory_id: &str, limit: usize) -> SDKResult<Vec<AccessEvent>> {
        let memory_id = memory_id.to_string();
        self.call("events_for", move |db| db.events_for_memory(&memory_id, limit))
            .await
    }

    pub async fn access_counts_since(&self, since: DateTime<Utc>) -> SDKResult<Vec<AccessCount>> {
        self.call("access_counts", move |db| db.access_counts_since(since))
            .await
    }

    pub async fn prune_events(&self, before: DateTime<Utc>) -> SDKResult<usize> {
        self.call("prune_events", move |db| db.prune_access_events(before))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> StructuredStore {
        let db = Database::open_in_memory().unwrap();
        db.migrate_memory_schema().unwrap();
        StructuredStore::new(Arc::new(db), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_round_trip_through_blocking_pool() {
        let store = test_store();
        let now = Utc::now();
        let memory = Memory {
            id: uuid::Uuid::new_v4().to_string(),
            content: "cargo workspaces share a lockfile".into(),
            content_hash: crate::utils::content_hash("cargo workspaces share a lockfile"),
            context: MemoryContext::ProjectKnowledge,
            importance: 0.6,
            embedding: vec![0.5, 0.5],
            tier: MemoryTier::Working,
            created_at: now,
            accessed_at: now,
            modified_at: now,
            access_count: 0,
            tier_migrated_at: None,
            parent_memory_id: None,
            consolidated_from: Vec::new(),
            metadata: Default::default(),
        };
        store.insert(memory.clone()).await.unwrap();

        let loaded = store.get(&memory.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, memory.content);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.delete(&memory.id).await.unwrap());
        assert!(store.get(&memory.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_core_errors_are_mapped() {
        let store = test_store();
        let err = store
            .search_exact(ExactQuery {
                pattern: "x".into(),
                field: Some("no spaces allowed".into()),
                limit: 5,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_empty_batches_skip_the_pool() {
        let store = test_store();
        assert_eq!(store.touch(Vec::new(), Utc::now()).await.unwrap(), 0);
        assert!(store.get_many(Vec::new()).await.unwrap().is_empty());
        assert_eq!(store.record_events(Vec::new()).await.unwrap(), 0);
    }
}
