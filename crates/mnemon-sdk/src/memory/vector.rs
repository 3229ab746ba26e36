//! Vector store adapter
//!
//! The vector store is a derived projection of the structured store: it only
//! holds `(id, vector)` pairs and may lag behind. Content always comes from the
//! structured store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::embeddings::cosine_similarity;
use crate::SDKResult;

/// Nearest-neighbor hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    /// Cosine distance (1 - cosine similarity), in [0, 2]
    pub distance: f32,
}

impl VectorMatch {
    /// Relevance in [0, 1]
    pub fn similarity(&self) -> f64 {
        (1.0 - self.distance as f64).clamp(0.0, 1.0)
    }
}

/// Nearest-neighbor index over `(id, vector)` pairs.
///
/// Upserts and deletes must be idempotent: the write queue may apply the same
/// operation more than once.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, id: &str, vector: &[f32]) -> SDKResult<()>;

    async fn delete(&self, id: &str) -> SDKResult<()>;

    /// Up to `limit` nearest vectors, closest first
    async fn search(&self, query: &[f32], limit: usize) -> SDKResult<Vec<VectorMatch>>;

    /// Every indexed id
    async fn ids(&self) -> SDKResult<Vec<String>>;

    async fn len(&self) -> SDKResult<usize>;
}

/// Exact brute-force index held in memory.
#[derive(Default)]
pub struct InMemoryVectorStore {
    vectors: RwLock<HashMap<String, Vec<f32>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, id: &str, vector: &[f32]) -> SDKResult<()> {
        self.vectors
            .write()
            .await
            .insert(id.to_string(), vector.to_vec());
        Ok(())
    }

    async fn delete(&self, id: &str) -> SDKResult<()> {
        self.vectors.write().await.remove(id);
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> SDKResult<Vec<VectorMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let vectors = self.vectors.read().await;
        let mut matches: Vec<VectorMatch> = vectors
            .iter()
            .map(|(id, vector)| VectorMatch {
                id: id.clone(),
                distance: 1.0 - cosine_similarity(query, vector),
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn ids(&self) -> SDKResult<Vec<String>> {
        let mut ids: Vec<String> = self.vectors.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn len(&self) -> SDKResult<usize> {
        Ok(self.vectors.read().await.len())
    }
}
