//! Memory consolidation
//!
//! Finds near-duplicate memories within the same context and folds them into
//! the oldest one. Seeds are visited in creation order; each seed keeps
//! absorbing neighbours (compared against its updated embedding) until none
//! remain above the threshold, so a second run over the result finds nothing
//! to merge.
//!
//! Each merge is one structured-store transaction guarded by the seed's
//! `modified_at`; a concurrent edit turns the merge into a counted conflict.

use chrono::{DateTime, Duration, Utc};
use mnemon_core::{AccessEvent, AccessOperation, Memory, MemoryContext, MemoryFilter, MergeWrite};
use std::collections::HashSet;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::access::AccessRecorder;
use super::coordinator::DualWriteCoordinator;
use super::embeddings::cosine_similarity;
use super::types::ConsolidationReport;
use crate::config::ConsolidationConfig;
use crate::utils::{content_hash, now_utc};
use crate::{SDKError, SDKResult};

// ─────────────────────────────────────────────────────────────────────────────
// Content Merging
// ─────────────────────────────────────────────────────────────────────────────

/// Split text into trimmed sentences on `.`, `!` or `?` followed by
/// whitespace, and on newlines.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            push_sentence(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|next| next.is_whitespace()) {
            push_sentence(&mut sentences, &mut current);
        }
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

fn sentence_key(sentence: &str) -> String {
    sentence
        .trim_end_matches(['.', '!', '?'])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Union of the sentences of every part, in first-seen order.
///
/// Sentences are compared case-insensitively, ignoring whitespace runs and
/// trailing punctuation. When more than one sentence survives, unterminated
/// ones get a period so the result reads as prose.
pub fn merge_contents<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut seen = HashSet::new();
    let mut sentences = Vec::new();
    for part in parts {
        for sentence in split_sentences(part) {
            if seen.insert(sentence_key(&sentence)) {
                sentences.push(sentence);
            }
        }
    }

    if sentences.len() > 1 {
        for sentence in &mut sentences {
            if !sentence.ends_with(['.', '!', '?']) {
                sentence.push('.');
            }
        }
    }
    sentences.join(" ")
}

/// Seed's lineage plus every absorbed id and lineage, de-duplicated in order.
fn merged_lineage(seed: &Memory, absorbed: &[&Memory]) -> Vec<String> {
    let mut lineage = if seed.consolidated_from.is_empty() {
        vec![seed.id.clone()]
    } else {
        seed.consolidated_from.clone()
    };
    for memory in absorbed {
        lineage.push(memory.id.clone());
        lineage.extend(memory.consolidated_from.iter().cloned());
    }
    let mut seen = HashSet::new();
    lineage.retain(|id| seen.insert(id.clone()));
    lineage
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ConsolidationEngine {
    coordinator: DualWriteCoordinator,
    recorder: AccessRecorder,
    config: ConsolidationConfig,
}

struct Slot {
    memory: Memory,
    absorbed: bool,
}

enum SeedOutcome {
    Merged(usize),
    Unchanged,
    Conflict,
    Failed,
}

impl ConsolidationEngine {
    pub fn new(coordinator: DualWriteCoordinator, recorder: AccessRecorder, config: ConsolidationConfig) -> Self {
        Self {
            coordinator,
            recorder,
            config,
        }
    }

    /// One consolidation pass over every stored memory.
    ///
    /// `threshold` overrides the configured similarity threshold and must be
    /// within (0, 1]. Fails only if the snapshot of memories cannot be read.
    pub async fn consolidate(
        &self,
        threshold: Option<f64>,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> SDKResult<ConsolidationReport> {
        let threshold = threshold.unwrap_or(self.config.similarity_threshold);
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(SDKError::validation(format!(
                "similarity threshold must be within (0, 1], got {}",
                threshold
            )));
        }

        let started = Instant::now();
        let memories = self
            .coordinator
            .store()
            .list(MemoryFilter {
                include_embeddings: true,
                ..Default::default()
            })
            .await?;

        let mut report = ConsolidationReport::default();
        'contexts: for context in MemoryContext::ALL {
            let mut slots: Vec<Slot> = memories
                .iter()
                .filter(|m| m.context == context)
                .map(|m| Slot {
                    memory: m.clone(),
                    absorbed: false,
                })
                .collect();

            for seed in 0..slots.len() {
                if slots[seed].absorbed {
                    continue;
                }
                if shutdown.is_some_and(|rx| *rx.borrow()) {
                    report.cancelled = true;
                    break 'contexts;
                }
                report.seeds_examined += 1;

                let mut absorbed_any = false;
                loop {
                    match self.merge_round(&mut slots, seed, threshold as f32).await {
                        SeedOutcome::Merged(count) => {
                            report.merged += count;
                            absorbed_any = true;
                        }
                        SeedOutcome::Unchanged => break,
                        SeedOutcome::Conflict => {
                            report.conflicts += 1;
                            break;
                        }
                        SeedOutcome::Failed => {
                            report.failures += 1;
                            break;
                        }
                    }
                }
                if absorbed_any {
                    report.survivors += 1;
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        if report.has_changes() || report.conflicts > 0 || report.failures > 0 {
            info!(
                merged = report.merged,
                survivors = report.survivors,
                conflicts = report.conflicts,
                failures = report.failures,
                duration_ms = report.duration_ms,
                "consolidation pass complete"
            );
        }
        Ok(report)
    }

    /// Absorb every live neighbour of `seed` above `threshold` in one merge.
    async fn merge_round(&self, slots: &mut [Slot], seed: usize, threshold: f32) -> SeedOutcome {
        let seed_memory = &slots[seed].memory;
        if seed_memory.embedding.is_empty() {
            return SeedOutcome::Unchanged;
        }

        let neighbours: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(i, slot)| {
                *i != seed
                    && !slot.absorbed
                    && cosine_similarity(&seed_memory.embedding, &slot.memory.embedding) >= threshold
            })
            .map(|(i, _)| i)
            .collect();
        if neighbours.is_empty() {
            return SeedOutcome::Unchanged;
        }

        let absorbed: Vec<&Memory> = neighbours.iter().map(|&i| &slots[i].memory).collect();
        let content = merge_contents(
            std::iter::once(seed_memory.content.as_str())
                .chain(absorbed.iter().map(|m| m.content.as_str())),
        );
        let importance = absorbed
            .iter()
            .map(|m| m.importance)
            .fold(seed_memory.importance, f64::max);
        let consolidated_from = merged_lineage(seed_memory, &absorbed);
        let absorbed_ids: Vec<String> = absorbed.iter().map(|m| m.id.clone()).collect();

        let embedding = match self.coordinator.embed(&content).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(seed = %seed_memory.id, error = %e, "could not embed merged content");
                return SeedOutcome::Failed;
            }
        };

        let modified_at = next_modified_at(seed_memory.modified_at, now_utc());
        let merge = MergeWrite {
            survivor_id: seed_memory.id.clone(),
            expected_modified_at: seed_memory.modified_at,
            content_hash: content_hash(&content),
            content,
            embedding,
            importance,
            consolidated_from,
            modified_at,
            absorbed_ids,
        };

        if let Err(e) = self.coordinator.store().apply_merge(merge.clone()).await {
            if e.is_conflict() {
                warn!(seed = %merge.survivor_id, error = %e, "merge skipped: record changed concurrently");
                return SeedOutcome::Conflict;
            }
            warn!(seed = %merge.survivor_id, error = %e, "merge failed");
            return SeedOutcome::Failed;
        }

        let mut events = vec![AccessEvent::new(&merge.survivor_id, AccessOperation::Consolidate, modified_at)];
        for id in &merge.absorbed_ids {
            events.push(AccessEvent::new(id, AccessOperation::Consolidate, modified_at));
            self.coordinator.queue_delete(id);
        }
        self.coordinator.queue_upsert(&merge.survivor_id, merge.embedding.clone());
        self.recorder.record(events);

        debug!(
            survivor = %merge.survivor_id,
            absorbed = merge.absorbed_ids.len(),
            "memories merged"
        );

        for &i in &neighbours {
            slots[i].absorbed = true;
        }
        let survivor = &mut slots[seed].memory;
        survivor.content = merge.content;
        survivor.content_hash = merge.content_hash;
        survivor.embedding = merge.embedding;
        survivor.importance = merge.importance;
        survivor.consolidated_from = merge.consolidated_from;
        survivor.modified_at = merge.modified_at;

        SeedOutcome::Merged(neighbours.len())
    }

    /// Run a pass every `interval_secs` until `shutdown` flips to true.
    pub fn spawn(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let engine = self.clone();
        let interval_secs = self.config.interval_secs.max(1);

        tokio::spawn(async move {
            let mut ticker = interval(std::time::Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; wait a full period before the first pass
            ticker.tick().await;
            info!(interval_secs, "consolidation scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                if *shutdown.borrow() {
                    break;
                }
                if let Err(e) = engine.consolidate(None, Some(&shutdown)).await {
                    error!(error = %e, "consolidation pass aborted");
                }
            }

            info!("consolidation scheduler stopped");
        })
    }
}

/// A modification timestamp strictly after `previous`, so optimistic checks
/// can tell consecutive merges apart even within one millisecond.
fn next_modified_at(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(previous + Duration::milliseconds(1))
}
