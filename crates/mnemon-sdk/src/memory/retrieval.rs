//! Hybrid retrieval and recall ranking
//!
//! Exact search runs against the structured store; semantic search asks the
//! vector store for nearest ids and hydrates them from the structured store.
//! When the vector store errors or misses its deadline, retrieval degrades to
//! exact-only and says so in the log.

use chrono::{DateTime, Utc};
use mnemon_core::{
    AccessEvent, AccessOperation, ExactQuery, Memory, MemoryContext, MemoryTier, ScoreComponents,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::access::AccessRecorder;
use super::coordinator::DualWriteCoordinator;
use super::embeddings::similarity_score;
use super::tiers::TierClassifier;
use super::types::{ExactSearchOptions, HybridSearchOptions, RecallResult, SearchResult};
use super::vector::VectorStore;
use crate::config::RetrievalConfig;
use crate::utils::{hours_between, validate_query};
use crate::{SDKError, SDKResult};

#[derive(Clone)]
pub struct RetrievalEngine {
    coordinator: DualWriteCoordinator,
    vectors: Arc<dyn VectorStore>,
    classifier: TierClassifier,
    recorder: AccessRecorder,
    config: RetrievalConfig,
}

/// Semantic hits hydrated from the structured store, or `None` when degraded
struct SemanticHits {
    query_vector: Option<Vec<f32>>,
    hits: Option<Vec<(Memory, f64)>>,
}

impl RetrievalEngine {
    pub fn new(
        coordinator: DualWriteCoordinator,
        vectors: Arc<dyn VectorStore>,
        classifier: TierClassifier,
        recorder: AccessRecorder,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            coordinator,
            vectors,
            classifier,
            recorder,
            config,
        }
    }

    fn candidate_limit(&self, limit: usize) -> usize {
        limit.saturating_mul(self.config.candidate_multiplier.max(1))
    }

    /// Recency signal: `exp(-decay * hours since last access)`
    pub fn recency_score(&self, accessed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        (-self.config.decay_rate * hours_between(accessed_at, now)).exp()
    }

    /// Frequency signal: `ln(1 + count) / ln(10)`, capped at 1
    pub fn frequency_score(access_count: u64) -> f64 {
        ((1.0 + access_count as f64).ln() / 10f64.ln()).min(1.0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Exact
    // ─────────────────────────────────────────────────────────────────────────

    /// Case-insensitive substring search over content (or one metadata field),
    /// most important first.
    pub async fn search_exact(
        &self,
        query: &str,
        options: ExactSearchOptions,
        now: DateTime<Utc>,
    ) -> SDKResult<Vec<Memory>> {
        validate_query(query)?;
        let limit = options.limit.unwrap_or(self.config.default_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.exact_candidates(query, options.field, options.context, options.tier, limit, now)
            .await
    }

    async fn exact_candidates(
        &self,
        query: &str,
        field: Option<String>,
        context: Option<MemoryContext>,
        tier: Option<MemoryTier>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> SDKResult<Vec<Memory>> {
        let (tiers, fetch) = match tier {
            Some(t) => (self.classifier.storage_tiers_for(t), self.candidate_limit(limit)),
            None => (Vec::new(), limit),
        };
        let mut memories = self
            .coordinator
            .store()
            .search_exact(ExactQuery {
                pattern: query.to_string(),
                field,
                context,
                tiers,
                limit: fetch,
            })
            .await?;
        if let Some(t) = tier {
            memories.retain(|m| self.classifier.matches_tier(m, t, now));
        }
        memories.truncate(limit);
        Ok(memories)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Semantic
    // ─────────────────────────────────────────────────────────────────────────

    async fn semantic_candidates(
        &self,
        query: &str,
        context: Option<MemoryContext>,
        tier: Option<MemoryTier>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> SDKResult<SemanticHits> {
        let query_vector = match self.coordinator.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "query embedding failed; degrading to exact-only retrieval");
                return Ok(SemanticHits {
                    query_vector: None,
                    hits: None,
                });
            }
        };

        let k = self.candidate_limit(limit);
        let timeout = self.config.vector_timeout();
        let matches = match tokio::time::timeout(timeout, self.vectors.search(&query_vector, k)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                warn!(error = %e, "vector search failed; degrading to exact-only retrieval");
                return Ok(SemanticHits {
                    query_vector: Some(query_vector),
                    hits: None,
                });
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "vector search timed out; degrading to exact-only retrieval"
                );
                return Ok(SemanticHits {
                    query_vector: Some(query_vector),
                    hits: None,
                });
            }
        };

        let similarity: HashMap<String, f64> = matches
            .iter()
            .map(|m| (m.id.clone(), m.similarity()))
            .collect();
        let ids = matches.into_iter().map(|m| m.id).collect();

        // Ids the structured store no longer has are vector-side leftovers
        let hits = self
            .coordinator
            .store()
            .get_many(ids)
            .await?
            .into_iter()
            .filter(|m| context.is_none_or(|c| m.context == c))
            .filter(|m| tier.is_none_or(|t| self.classifier.matches_tier(m, t, now)))
            .map(|m| {
                let score = similarity.get(&m.id).copied().unwrap_or(0.0);
                (m, score)
            })
            .collect();

        Ok(SemanticHits {
            query_vector: Some(query_vector),
            hits: Some(hits),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hybrid
    // ─────────────────────────────────────────────────────────────────────────

    /// `w * exact + (1 - w) * semantic`, exact and semantic run concurrently.
    pub async fn search_hybrid(
        &self,
        query: &str,
        options: HybridSearchOptions,
        now: DateTime<Utc>,
    ) -> SDKResult<Vec<SearchResult>> {
        validate_query(query)?;
        let weight = options.exact_weight.unwrap_or(self.config.exact_weight);
        if !(0.0..=1.0).contains(&weight) {
            return Err(SDKError::validation(format!(
                "exact weight must be within [0, 1], got {}",
                weight
            )));
        }
        let limit = options.limit.unwrap_or(self.config.default_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let fetch = self.candidate_limit(limit);
        let (exact, semantic) = tokio::join!(
            self.exact_candidates(query, None, options.context, options.tier, fetch, now),
            self.semantic_candidates(query, options.context, options.tier, limit, now),
        );
        let exact = exact?;
        let semantic = semantic?;

        let mut merged: HashMap<String, SearchResult> = HashMap::new();
        for memory in exact {
            merged.insert(
                memory.id.clone(),
                SearchResult {
                    memory,
                    score: 0.0,
                    exact_score: 1.0,
                    semantic_score: 0.0,
                },
            );
        }
        for (memory, similarity) in semantic.hits.unwrap_or_default() {
            merged
                .entry(memory.id.clone())
                .or_insert_with(|| SearchResult {
                    memory,
                    score: 0.0,
                    exact_score: 0.0,
                    semantic_score: 0.0,
                })
                .semantic_score = similarity;
        }

        let mut results: Vec<SearchResult> = merged
            .into_values()
            .map(|mut r| {
                r.score = weight * r.exact_score + (1.0 - weight) * r.semantic_score;
                r
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        results.truncate(limit);
        Ok(results)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recall
    // ─────────────────────────────────────────────────────────────────────────

    /// Ranked recall. Given the same stored state and `now`, the ordering is
    /// deterministic; ties break on ascending id.
    ///
    /// Returned memories are recorded as accessed (count, `accessed_at`, and an
    /// access event) without delaying the response.
    pub async fn recall(
        &self,
        query: &str,
        context: Option<MemoryContext>,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> SDKResult<Vec<RecallResult>> {
        validate_query(query)?;
        let limit = limit.unwrap_or(self.config.default_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let started = Instant::now();

        let fetch = self.candidate_limit(limit);
        let (exact, semantic) = tokio::join!(
            self.exact_candidates(query, None, context, None, fetch, now),
            self.semantic_candidates(query, context, None, limit, now),
        );
        let exact = exact?;
        let semantic = semantic?;

        let mut candidates: HashMap<String, Memory> = HashMap::new();
        for memory in exact {
            candidates.insert(memory.id.clone(), memory);
        }
        let mut vector_similarity: HashMap<String, f64> = HashMap::new();
        for (memory, similarity) in semantic.hits.unwrap_or_default() {
            vector_similarity.insert(memory.id.clone(), similarity);
            candidates.entry(memory.id.clone()).or_insert(memory);
        }

        let weights = self.config.weights;
        let mut results: Vec<RecallResult> = candidates
            .into_values()
            .map(|memory| {
                let semantic_score = match &semantic.query_vector {
                    Some(q) if !memory.embedding.is_empty() => similarity_score(q, &memory.embedding),
                    Some(_) => vector_similarity.get(&memory.id).copied().unwrap_or(0.0),
                    None => 0.0,
                };
                let recency = self.recency_score(memory.accessed_at, now);
                let importance = memory.importance;
                let frequency = Self::frequency_score(memory.access_count);
                let total = weights.semantic * semantic_score
                    + weights.recency * recency
                    + weights.importance * importance
                    + weights.frequency * frequency;
                RecallResult {
                    score: total,
                    components: ScoreComponents {
                        semantic: semantic_score,
                        recency,
                        importance,
                        frequency,
                        total,
                    },
                    memory,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        results.truncate(limit);

        let latency_ms = started.elapsed().as_millis() as u64;
        let events = results
            .iter()
            .map(|r| {
                AccessEvent::new(&r.memory.id, AccessOperation::Recall, now)
                    .with_components(r.components)
                    .with_latency_ms(latency_ms)
            })
            .collect();
        self.recorder.record(events);
        self.recorder
            .touch(results.iter().map(|r| r.memory.id.clone()).collect(), now);

        debug!(returned = results.len(), latency_ms, "recall complete");
        Ok(results)
    }
}
