//! Tier migration scheduler
//!
//! Each tick lists working and session memories, classifies them, and moves
//! the ones that aged out in batches. Every move is a conditional update on
//! the tier the tick observed, so a concurrent change makes the move a no-op
//! instead of a regression. Shutdown is checked between records.

use chrono::{DateTime, Utc};
use mnemon_core::{AccessEvent, AccessOperation, MemoryFilter, MemoryTier};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::access::{AccessAnalytics, AccessRecorder};
use super::coordinator::DualWriteCoordinator;
use super::tiers::TierClassifier;
use super::types::{MigrationCandidate, MigrationReport, PruneReport};
use crate::config::TierConfig;
use crate::utils::now_utc;
use crate::SDKResult;

#[derive(Clone)]
pub struct MigrationScheduler {
    coordinator: DualWriteCoordinator,
    classifier: TierClassifier,
    recorder: AccessRecorder,
    analytics: AccessAnalytics,
    config: TierConfig,
    last_run: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl MigrationScheduler {
    pub fn new(
        coordinator: DualWriteCoordinator,
        recorder: AccessRecorder,
        analytics: AccessAnalytics,
        config: TierConfig,
    ) -> Self {
        Self {
            coordinator,
            classifier: TierClassifier::new(&config),
            recorder,
            analytics,
            config,
            last_run: Arc::new(Mutex::new(None)),
        }
    }

    pub fn classifier(&self) -> &TierClassifier {
        &self.classifier
    }

    /// When the last tick finished
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run.lock().ok().and_then(|guard| *guard)
    }

    /// Memories that should migrate, or are prune-eligible, at `now`
    pub async fn candidates(&self, now: DateTime<Utc>) -> SDKResult<Vec<MigrationCandidate>> {
        let memories = self
            .coordinator
            .store()
            .list(MemoryFilter {
                tiers: vec![MemoryTier::Working, MemoryTier::Session],
                ..Default::default()
            })
            .await?;
        Ok(self.classifier.candidates(&memories, now))
    }

    /// One migration pass. Fails only if candidates cannot be listed;
    /// per-record failures are counted in the report.
    pub async fn run_once(
        &self,
        now: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
    ) -> SDKResult<MigrationReport> {
        let started = Instant::now();
        let candidates = self.candidates(now).await?;

        let mut report = MigrationReport {
            candidates: candidates.len(),
            prune_eligible: candidates.iter().filter(|c| c.prune_eligible).count(),
            ..Default::default()
        };

        let movable: Vec<_> = candidates.into_iter().filter(|c| !c.prune_eligible).collect();
        let store = self.coordinator.store();

        for batch in movable.chunks(self.config.batch_size.max(1)) {
            let mut events = Vec::with_capacity(batch.len());
            for candidate in batch {
                if *shutdown.borrow() {
                    report.cancelled = true;
                    break;
                }
                let id = &candidate.memory.id;
                match store
                    .update_tier_if(id, candidate.current_tier, candidate.target_tier, now)
                    .await
                {
                    Ok(true) => {
                        report.migrated += 1;
                        events.push(AccessEvent::new(id, AccessOperation::Migrate, now));
                        debug!(id = %id, from = %candidate.current_tier, to = %candidate.target_tier, "memory migrated");
                    }
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(id = %id, error = %e, "tier migration failed");
                    }
                }
            }
            self.recorder.record(events);
            if report.cancelled {
                break;
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        if let Ok(mut last_run) = self.last_run.lock() {
            *last_run = Some(now);
        }
        Ok(report)
    }

    /// Delete every prune-eligible memory. Pinned memories are never eligible.
    pub async fn prune(&self, now: DateTime<Utc>) -> SDKResult<PruneReport> {
        let ids: Vec<String> = self
            .candidates(now)
            .await?
            .into_iter()
            .filter(|c| c.prune_eligible && !c.memory.metadata.pinned)
            .map(|c| c.memory.id)
            .collect();
        if ids.is_empty() {
            return Ok(PruneReport::default());
        }

        let deleted = self.coordinator.delete_many(ids.clone()).await?;
        info!(deleted, "pruned memories below promotion bar");
        Ok(PruneReport { deleted, ids })
    }

    /// Run ticks every `interval_secs` until `shutdown` flips to true.
    pub fn spawn(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let scheduler = self.clone();
        let interval_secs = self.config.interval_secs.max(1);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs, "tier migration scheduler started");

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

                let now = now_utc();
                match scheduler.run_once(now, &shutdown).await {
                    Ok(report) if report.migrated > 0 || report.failed > 0 => info!(
                        migrated = report.migrated,
                        skipped = report.skipped,
                        failed = report.failed,
                        prune_eligible = report.prune_eligible,
                        duration_ms = report.duration_ms,
                        "tier migration tick"
                    ),
                    Ok(_) => debug!("tier migration tick: nothing to move"),
                    Err(e) => error!(error = %e, "tier migration tick aborted"),
                }
                if let Err(e) = scheduler.analytics.prune_access_log(now).await {
                    warn!(error = %e, "access log pruning failed");
                }
            }

            info!("tier migration scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalyticsConfig, MemoryConfig, VectorQueueConfig};
    use crate::memory::importance::FixedAssessor;
    use crate::memory::queue::VectorWriteQueue;
    use crate::memory::store::StructuredStore;
    use crate::memory::testing::StubEmbedder;
    use crate::memory::vector::{InMemoryVectorStore, VectorStore};
    use chrono::Duration as ChronoDuration;
    use mnemon_core::{Database, Memory, MemoryContext, Metadata};

    struct Harness {
        scheduler: MigrationScheduler,
        store: StructuredStore,
        vectors: Arc<InMemoryVectorStore>,
        recorder: AccessRecorder,
    }

    fn harness(config: TierConfig) -> Harness {
        let db = Database::open_in_memory().unwrap();
        db.migrate_memory_schema().unwrap();
        let store = StructuredStore::new(Arc::new(db), std::time::Duration::from_secs(5));
        let vectors = Arc::new(InMemoryVectorStore::new());
        let (queue, _worker) = VectorWriteQueue::start(
            vectors.clone(),
            VectorQueueConfig::default(),
            std::time::Duration::from_secs(1),
        );
        let coordinator = DualWriteCoordinator::new(
            store.clone(),
            queue,
            Arc::new(StubEmbedder::new(8)),
            Arc::new(FixedAssessor(0.5)),
            MemoryConfig {
                importance_threshold: 0.3,
                embedding_dimensions: 8,
            },
        );
        let (recorder, _writer) = AccessRecorder::start(store.clone());
        let analytics = AccessAnalytics::new(store.clone(), AnalyticsConfig::default());
        Harness {
            scheduler: MigrationScheduler::new(coordinator, recorder.clone(), analytics, config),
            store,
            vectors,
            recorder,
        }
    }

    async fn insert_aged(
        store: &StructuredStore,
        hours: i64,
        importance: f64,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let created = now - ChronoDuration::hours(hours);
        store
            .insert(Memory {
                id: id.clone(),
                content: format!("aged {} hours", hours),
                content_hash: crate::utils::content_hash(&id),
                context: MemoryContext::General,
                importance,
                embedding: vec![0.0; 8],
                tier: MemoryTier::Working,
                created_at: created,
                accessed_at: created,
                modified_at: created,
                access_count: 0,
                tier_migrated_at: None,
                parent_memory_id: None,
                consolidated_from: Vec::new(),
                metadata,
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_tick_migrates_aged_working_memory() {
        let h = harness(TierConfig::default());
        let now = Utc::now();
        let old = insert_aged(&h.store, 49, 0.5, Metadata::default(), now).await;
        let young = insert_aged(&h.store, 1, 0.5, Metadata::default(), now).await;
        let (_tx, rx) = watch::channel(false);

        let report = h.scheduler.run_once(now, &rx).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.migrated, 1);
        assert!(!report.cancelled);
        assert_eq!(h.scheduler.last_run(), Some(now));

        let migrated = h.store.get(&old).await.unwrap().unwrap();
        assert_eq!(migrated.tier, MemoryTier::Session);
        assert_eq!(
            migrated.tier_migrated_at.unwrap().timestamp_millis(),
            now.timestamp_millis()
        );
        assert_eq!(h.store.get(&young).await.unwrap().unwrap().tier, MemoryTier::Working);

        h.recorder.flush().await;
        let events = h.store.events_for(&old, 10).await.unwrap();
        assert_eq!(events[0].operation, AccessOperation::Migrate);

        // Second tick is a no-op
        let report = h.scheduler.run_once(now, &rx).await.unwrap();
        assert_eq!(report.migrated, 0);
    }

    #[tokio::test]
    async fn test_cancelled_tick_stops_between_records() {
        let h = harness(TierConfig::default());
        let now = Utc::now();
        insert_aged(&h.store, 50, 0.5, Metadata::default(), now).await;
        insert_aged(&h.store, 60, 0.5, Metadata::default(), now).await;
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let report = h.scheduler.run_once(now, &rx).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.migrated, 0);
        assert_eq!(report.candidates, 2);
    }

    #[tokio::test]
    async fn test_prune_skips_pinned() {
        let h = harness(TierConfig {
            session_min_importance: Some(0.6),
            ..Default::default()
        });
        let now = Utc::now();
        let weak = insert_aged(&h.store, 49, 0.2, Metadata::default(), now).await;
        let pinned = insert_aged(&h.store, 49, 0.2, Metadata::default().pinned(), now).await;
        let strong = insert_aged(&h.store, 49, 0.9, Metadata::default(), now).await;
        h.vectors.upsert(&weak, &[1.0; 8]).await.unwrap();

        let (_tx, rx) = watch::channel(false);
        let report = h.scheduler.run_once(now, &rx).await.unwrap();
        assert_eq!(report.migrated, 1);
        assert_eq!(report.prune_eligible, 1);
        assert_eq!(h.store.get(&weak).await.unwrap().unwrap().tier, MemoryTier::Working);

        let pruned = h.scheduler.prune(now).await.unwrap();
        assert_eq!(pruned.ids, vec![weak.clone()]);
        assert!(h.store.get(&weak).await.unwrap().is_none());
        assert!(h.store.get(&pinned).await.unwrap().is_some());
        assert!(h.store.get(&strong).await.unwrap().is_some());

        h.scheduler.coordinator.queue().flush().await;
        assert_eq!(h.vectors.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_background_loop_stops_on_shutdown() {
        let h = harness(TierConfig::default());
        let (tx, rx) = watch::channel(false);
        let handle = h.scheduler.spawn(rx);
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
