//! Tier classification
//!
//! Pure functions of a memory and "now": which tier its age puts it in,
//! whether it should migrate, and which tiers it answers to during the
//! overlap around a boundary. Nothing here touches storage.

use chrono::{DateTime, Duration, Utc};
use mnemon_core::{Memory, MemoryTier};

use super::types::MigrationCandidate;
use crate::config::{PrunePolicy, TierConfig};

#[derive(Debug, Clone)]
pub struct TierClassifier {
    working_window: Duration,
    session_window: Duration,
    overlap: Duration,
    session_min_importance: Option<f64>,
    longterm_min_importance: Option<f64>,
    prune_policy: PrunePolicy,
}

impl TierClassifier {
    pub fn new(config: &TierConfig) -> Self {
        Self {
            working_window: Duration::seconds(config.working_window_secs as i64),
            session_window: Duration::seconds(config.session_window_secs as i64),
            overlap: Duration::seconds(config.overlap_secs as i64),
            session_min_importance: config.session_min_importance,
            longterm_min_importance: config.longterm_min_importance,
            prune_policy: config.prune_policy,
        }
    }

    /// Tier a memory of this age belongs in, ignoring where it is stored
    pub fn tier_for_age(&self, age: Duration) -> MemoryTier {
        if age < self.working_window {
            MemoryTier::Working
        } else if age < self.session_window {
            MemoryTier::Session
        } else {
            MemoryTier::LongTerm
        }
    }

    fn promotion_bar(&self, tier: MemoryTier) -> Option<f64> {
        match tier {
            MemoryTier::Working => None,
            MemoryTier::Session => self.session_min_importance,
            MemoryTier::LongTerm => self.longterm_min_importance,
        }
    }

    /// Plan for one memory, or `None` when it stays put.
    ///
    /// The target never ranks below the current tier. A memory that misses the
    /// importance bar for the next tier is reported prune-eligible (unless
    /// pinned, in which case it silently stays).
    pub fn classify(&self, memory: &Memory, now: DateTime<Utc>) -> Option<MigrationCandidate> {
        let age_tier = self.tier_for_age(memory.age_at(now));
        if age_tier <= memory.tier {
            return None;
        }

        let mut target = memory.tier;
        let mut blocked_at = None;
        while target < age_tier {
            let Some(step) = target.next() else { break };
            let below_bar = self
                .promotion_bar(step)
                .is_some_and(|bar| memory.importance < bar);
            if below_bar && self.prune_policy == PrunePolicy::KeepInTier {
                blocked_at = Some(step);
                break;
            }
            target = step;
        }

        if target > memory.tier {
            return Some(MigrationCandidate {
                memory: memory.clone(),
                current_tier: memory.tier,
                target_tier: target,
                prune_eligible: false,
            });
        }

        match blocked_at {
            Some(step) if !memory.metadata.pinned => Some(MigrationCandidate {
                memory: memory.clone(),
                current_tier: memory.tier,
                target_tier: step,
                prune_eligible: true,
            }),
            _ => None,
        }
    }

    /// Plans for every memory that should move or is prune-eligible, in input order
    pub fn candidates<'a>(
        &self,
        memories: impl IntoIterator<Item = &'a Memory>,
        now: DateTime<Utc>,
    ) -> Vec<MigrationCandidate> {
        memories
            .into_iter()
            .filter_map(|memory| self.classify(memory, now))
            .collect()
    }

    /// Whether a memory should be returned for a query filtered to `tier`.
    ///
    /// Over-inclusive around boundaries: a memory matches its stored tier, the
    /// tier it migrated out of within the overlap, the tier its age already
    /// puts it in (scheduler lag), and both tiers adjacent to any boundary its
    /// age is within the overlap of.
    pub fn matches_tier(&self, memory: &Memory, tier: MemoryTier, now: DateTime<Utc>) -> bool {
        if memory.tier == tier {
            return true;
        }

        if let Some(migrated_at) = memory.tier_migrated_at {
            if now.signed_duration_since(migrated_at) < self.overlap
                && memory.tier.previous() == Some(tier)
            {
                return true;
            }
        }

        let age = memory.age_at(now);
        if tier > memory.tier && self.tier_for_age(age) == tier {
            return true;
        }

        [
            (self.working_window, MemoryTier::Working, MemoryTier::Session),
            (self.session_window, MemoryTier::Session, MemoryTier::LongTerm),
        ]
        .into_iter()
        .any(|(boundary, below, above)| {
            (age - boundary).abs() < self.overlap && (tier == below || tier == above)
        })
    }

    /// Stored tiers worth fetching before applying [`matches_tier`](Self::matches_tier)
    pub fn storage_tiers_for(&self, tier: MemoryTier) -> Vec<MemoryTier> {
        let ceiling = tier.next().unwrap_or(tier);
        MemoryTier::ALL
            .into_iter()
            .filter(|t| *t <= ceiling)
            .collect()
    }
}
