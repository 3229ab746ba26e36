//! Test doubles shared by the memory module tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::embeddings::{EmbeddingProvider, HashingEmbedder};
use super::vector::{InMemoryVectorStore, VectorMatch, VectorStore};
use crate::{SDKError, SDKResult};

/// Embedder with hand-picked vectors for known texts, falling back to
/// feature hashing for everything else.
pub struct StubEmbedder {
    table: HashMap<String, Vec<f32>>,
    fallback: HashingEmbedder,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            table: HashMap::new(),
            fallback: HashingEmbedder::new(dimensions),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> SDKResult<Vec<f32>> {
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.embed_text(text)))
    }

    fn dimensions(&self) -> usize {
        self.fallback.dimensions()
    }
}

/// Unit vector along `axis` with a small tilt towards `tilt_axis`.
pub fn unit(dimensions: usize, axis: usize, tilt_axis: usize, tilt: f32) -> Vec<f32> {
    let mut v = vec![0.0; dimensions];
    v[axis] = 1.0;
    v[tilt_axis] += tilt;
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter_mut().for_each(|x| *x /= norm);
    v
}

/// Vector store whose first `n` calls fail.
pub struct FlakyVectorStore {
    pub inner: InMemoryVectorStore,
    remaining_failures: AtomicUsize,
}

impl FlakyVectorStore {
    pub fn failing_first(n: usize) -> Self {
        Self {
            inner: InMemoryVectorStore::new(),
            remaining_failures: AtomicUsize::new(n),
        }
    }

    fn check(&self) -> SDKResult<()> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(SDKError::connection("vector", "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VectorStore for FlakyVectorStore {
    async fn upsert(&self, id: &str, vector: &[f32]) -> SDKResult<()> {
        self.check()?;
        self.inner.upsert(id, vector).await
    }

    async fn delete(&self, id: &str) -> SDKResult<()> {
        self.check()?;
        self.inner.delete(id).await
    }

    async fn search(&self, query: &[f32], limit: usize) -> SDKResult<Vec<VectorMatch>> {
        self.check()?;
        self.inner.search(query, limit).await
    }

    async fn ids(&self) -> SDKResult<Vec<String>> {
        self.check()?;
        self.inner.ids().await
    }

    async fn len(&self) -> SDKResult<usize> {
        self.check()?;
        self.inner.len().await
    }
}

/// Vector store that accepts writes but hangs on every search.
#[derive(Default)]
pub struct HangingSearchStore {
    pub inner: InMemoryVectorStore,
}

#[async_trait]
impl VectorStore for HangingSearchStore {
    async fn upsert(&self, id: &str, vector: &[f32]) -> SDKResult<()> {
        self.inner.upsert(id, vector).await
    }

    async fn delete(&self, id: &str) -> SDKResult<()> {
        self.inner.delete(id).await
    }

    async fn search(&self, _query: &[f32], _limit: usize) -> SDKResult<Vec<VectorMatch>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }

    async fn ids(&self) -> SDKResult<Vec<String>> {
        self.inner.ids().await
    }

    async fn len(&self) -> SDKResult<usize> {
        self.inner.len().await
    }
}
