//! Embedding providers for semantic search
//!
//! The engine consumes embeddings through [`EmbeddingProvider`]. Two
//! implementations ship with the crate:
//!
//! - [`HashingEmbedder`]: deterministic feature hashing over words and
//!   character trigrams. No model, no I/O; good enough for lexical
//!   similarity and fully reproducible in tests.
//! - `FastEmbedProvider` (feature `fastembed`): local all-MiniLM-L6-v2
//!   inference with lazy model loading.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::SDKResult;

/// Embedding dimensions for all-MiniLM-L6-v2 (and the hashing default)
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Text → vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> SDKResult<Vec<f32>>;

    /// Length of every vector this provider returns
    fn dimensions(&self) -> usize;

    /// Short name for logs and health output
    fn name(&self) -> &str {
        "custom"
    }
}

/// Compute cosine similarity between two vectors
///
/// Returns a value between -1.0 and 1.0. Mismatched lengths and zero
/// vectors yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Cosine similarity mapped onto a [0, 1] relevance score
pub fn similarity_score(a: &[f32], b: &[f32]) -> f64 {
    (cosine_similarity(a, b) as f64).clamp(0.0, 1.0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Hashing Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic bag-of-features embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed synchronously. Output is L2-normalized (or all zeros for text
    /// without any word characters).
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut vector, word.as_bytes(), 1.0);

            let padded: Vec<char> = format!("^{}$", word).chars().collect();
            for trigram in padded.windows(3) {
                let feature: String = trigram.iter().collect();
                self.add_feature(&mut vector, feature.as_bytes(), 0.5);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> SDKResult<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FastEmbed Provider
// ─────────────────────────────────────────────────────────────────────────────

/// Local all-MiniLM-L6-v2 embeddings via `fastembed`, loaded on first use.
#[cfg(feature = "fastembed")]
pub struct FastEmbedProvider {
    model: std::sync::Arc<tokio::sync::RwLock<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "fastembed")]
impl Default for FastEmbedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "fastembed")]
impl FastEmbedProvider {
    pub fn new() -> Self {
        Self {
            model: std::sync::Arc::new(tokio::sync::RwLock::new(None)),
        }
    }

    async fn ensure_model(&self) -> SDKResult<()> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        if self.model.read().await.is_some() {
            return Ok(());
        }

        let mut model_guard = self.model.write().await;
        if model_guard.is_some() {
            return Ok(());
        }

        tracing::info!("Loading embedding model: all-MiniLM-L6-v2");
        let start = std::time::Instant::now();

        let mut init_options = InitOptions::default();
        init_options.model_name = EmbeddingModel::AllMiniLML6V2;
        init_options.show_download_progress = false;

        let model = TextEmbedding::try_new(init_options).map_err(|e| {
            crate::SDKError::embedding(format!("Failed to load embedding model: {}", e))
        })?;

        tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "Embedding model loaded");
        *model_guard = Some(model);
        Ok(())
    }

    /// Check if the model is loaded
    pub async fn is_loaded(&self) -> bool {
        self.model.read().await.is_some()
    }
}

#[cfg(feature = "fastembed")]
#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> SDKResult<Vec<f32>> {
        self.ensure_model().await?;

        let model_guard = self.model.read().await;
        let model = model_guard
            .as_ref()
            .ok_or_else(|| crate::SDKError::embedding("Embedding model not initialized"))?;

        let embeddings = model.embed(vec![text], None).map_err(|e| {
            crate::SDKError::embedding(format!("Failed to generate embedding: {}", e))
        })?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| crate::SDKError::embedding("No embedding generated"))
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn name(&self) -> &str {
        "fastembed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
        assert_eq!(similarity_score(&a, &d), 0.0);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("The user prefers dark mode").await.unwrap();
        let b = embedder.embed("The user prefers dark mode").await.unwrap();
        assert_eq!(a.len(), EMBEDDING_DIMENSIONS);
        assert_eq!(a, b);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_embedder_lexical_similarity() {
        let embedder = HashingEmbedder::default();
        let base = embedder.embed("rust async runtime tokio").await.unwrap();
        let close = embedder.embed("tokio async runtime for rust").await.unwrap();
        let far = embedder.embed("chocolate cake recipe").await.unwrap();
        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_hashing_embedder_empty_text() {
        let embedder = HashingEmbedder::new(16);
        let vector = embedder.embed_text("!!!");
        assert_eq!(vector.len(), 16);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[cfg(feature = "fastembed")]
    #[tokio::test]
    #[ignore = "requires model download (~90MB)"]
    async fn test_fastembed_dimensions() {
        let provider = FastEmbedProvider::new();
        let vector = provider.embed("hello world").await.unwrap();
        assert_eq!(vector.len(), EMBEDDING_DIMENSIONS);
    }
}
