//! Access recording and analytics
//!
//! Recall and restore must not wait on bookkeeping, so access events and
//! access-count bumps go through an unbounded channel to a single writer
//! task. `flush` waits for everything sent before it to land.

use chrono::{DateTime, Duration, Utc};
use mnemon_core::{AccessEvent, MemoryTier, TierStats};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::store::StructuredStore;
use super::types::{AccessPattern, TierRecommendation};
use crate::config::AnalyticsConfig;
use crate::utils::{hours_between, validate_memory_id};
use crate::{SDKError, SDKResult};

enum RecorderMsg {
    Events(Vec<AccessEvent>),
    Touch { ids: Vec<String>, at: DateTime<Utc> },
    Flush(oneshot::Sender<()>),
    Close,
}

/// Fire-and-forget writer for access bookkeeping; cheap to clone.
#[derive(Clone)]
pub struct AccessRecorder {
    tx: mpsc::UnboundedSender<RecorderMsg>,
}

impl AccessRecorder {
    /// Create the recorder and spawn its writer on the current runtime.
    pub fn start(store: StructuredStore) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(store, rx));
        (Self { tx }, writer)
    }

    /// Queue access events
    pub fn record(&self, events: Vec<AccessEvent>) {
        if events.is_empty() {
            return;
        }
        if self.tx.send(RecorderMsg::Events(events)).is_err() {
            debug!("access recorder closed; events dropped");
        }
    }

    /// Queue an access-count and `accessed_at` bump
    pub fn touch(&self, ids: Vec<String>, at: DateTime<Utc>) {
        if ids.is_empty() {
            return;
        }
        if self.tx.send(RecorderMsg::Touch { ids, at }).is_err() {
            debug!("access recorder closed; touch dropped");
        }
    }

    /// Wait until everything sent before this call has been written
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(RecorderMsg::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Ask the writer to exit once it has drained
    pub fn close(&self) {
        let _ = self.tx.send(RecorderMsg::Close);
    }
}

async fn run_writer(store: StructuredStore, mut rx: mpsc::UnboundedReceiver<RecorderMsg>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            RecorderMsg::Events(events) => {
                let count = events.len();
                if let Err(e) = store.record_events(events).await {
                    warn!(count, error = %e, "failed to record access events");
                }
            }
            RecorderMsg::Touch { ids, at } => {
                let count = ids.len();
                if let Err(e) = store.touch(ids, at).await {
                    warn!(count, error = %e, "failed to update access counts");
                }
            }
            RecorderMsg::Flush(done) => {
                let _ = done.send(());
            }
            RecorderMsg::Close => break,
        }
    }
    debug!("access recorder stopped");
}

// ─────────────────────────────────────────────────────────────────────────────
// Analytics
// ─────────────────────────────────────────────────────────────────────────────

/// Read-side view over the access log
#[derive(Clone)]
pub struct AccessAnalytics {
    store: StructuredStore,
    config: AnalyticsConfig,
}

impl AccessAnalytics {
    pub fn new(store: StructuredStore, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    pub async fn tier_stats(&self) -> SDKResult<Vec<TierStats>> {
        self.store.tier_stats().await
    }

    /// Access history for one memory, newest first
    pub async fn events_for(&self, memory_id: &str, limit: usize) -> SDKResult<Vec<AccessEvent>> {
        validate_memory_id(memory_id)?;
        self.store.events_for(memory_id, limit).await
    }

    /// Per-memory access summaries for memories recalled or restored within
    /// `window` (default from configuration), busiest first.
    ///
    /// Recommendations are advisory: nothing here changes a tier.
    pub async fn access_patterns(
        &self,
        window: Option<Duration>,
        now: DateTime<Utc>,
    ) -> SDKResult<Vec<AccessPattern>> {
        let window = match window {
            Some(window) => window,
            None => i64::try_from(self.config.window_hours)
                .ok()
                .and_then(Duration::try_hours)
                .ok_or_else(|| SDKError::validation("analytics.window_hours is out of range"))?,
        };
        let since = lookback(now, window)?;
        let counts = self.store.access_counts_since(since).await?;
        if counts.is_empty() {
            return Ok(Vec::new());
        }

        let ids = counts.iter().map(|c| c.memory_id.clone()).collect();
        let memories: HashMap<_, _> = self
            .store
            .get_many(ids)
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let patterns = counts
            .into_iter()
            .filter_map(|count| {
                // Events outlive deleted memories until retention prunes them
                let memory = memories.get(&count.memory_id)?;
                let last_access = count.last_access.max(memory.accessed_at);
                let staleness_hours = hours_between(last_access, now);
                let recommendation = self.recommend(memory.tier, count.count, staleness_hours);
                Some(AccessPattern {
                    memory_id: count.memory_id,
                    tier: memory.tier,
                    recent_accesses: count.count,
                    total_accesses: memory.access_count,
                    last_access,
                    staleness_hours,
                    recommendation,
                })
            })
            .collect();
        Ok(patterns)
    }

    fn recommend(&self, tier: MemoryTier, recent: u64, staleness_hours: f64) -> Option<TierRecommendation> {
        if recent >= self.config.early_promotion_accesses && tier != MemoryTier::LongTerm {
            Some(TierRecommendation::PromoteEarly)
        } else if staleness_hours >= self.config.stale_after_hours as f64 && tier != MemoryTier::Working {
            Some(TierRecommendation::DemoteCandidate)
        } else {
            None
        }
    }

    /// Drop events older than the retention period. Returns rows removed.
    pub async fn prune_access_log(&self, now: DateTime<Utc>) -> SDKResult<usize> {
        let retention = i64::try_from(self.config.event_retention_days)
            .ok()
            .and_then(Duration::try_days)
            .ok_or_else(|| SDKError::validation("analytics.event_retention_days is out of range"))?;
        let cutoff = lookback(now, retention)?;
        let removed = self.store.prune_events(cutoff).await?;
        if removed > 0 {
            debug!(removed, "pruned access events");
        }
        Ok(removed)
    }
}

/// `now - window`, rejecting windows that reach past the representable range
fn lookback(now: DateTime<Utc>, window: Duration) -> SDKResult<DateTime<Utc>> {
    now.checked_sub_signed(window).ok_or_else(|| {
        SDKError::validation(format!("window of {}s is out of range", window.num_seconds()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_core::{AccessOperation, Database, Memory, MemoryContext};
    use std::sync::Arc;

    fn test_store() -> StructuredStore {
        let db = Database::open_in_memory().unwrap();
        db.migrate_memory_schema().unwrap();
        StructuredStore::new(Arc::new(db), std::time::Duration::from_secs(5))
    }

    async fn insert(store: &StructuredStore, tier: MemoryTier, accessed_at: DateTime<Utc>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        store
            .insert(Memory {
                id: id.clone(),
                content: format!("memory {}", id),
                content_hash: crate::utils::content_hash(&id),
                context: MemoryContext::General,
                importance: 0.5,
                embedding: Vec::new(),
                tier,
                created_at: accessed_at,
                accessed_at,
                modified_at: accessed_at,
                access_count: 0,
                tier_migrated_at: None,
                parent_memory_id: None,
                consolidated_from: Vec::new(),
                metadata: Default::default(),
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_recorder_writes_events_and_touches() {
        let store = test_store();
        let (recorder, _writer) = AccessRecorder::start(store.clone());
        let now = Utc::now();
        let id = insert(&store, MemoryTier::Working, now - Duration::hours(1)).await;

        recorder.record(vec![AccessEvent::new(&id, AccessOperation::Recall, now)]);
        recorder.touch(vec![id.clone()], now);
        recorder.flush().await;

        let memory = store.get(&id).await.unwrap().unwrap();
        assert_eq!(memory.access_count, 1);
        assert_eq!(memory.accessed_at.timestamp_millis(), now.timestamp_millis());
        assert_eq!(store.events_for(&id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_close_stops_writer() {
        let store = test_store();
        let (recorder, writer) = AccessRecorder::start(store);
        recorder.close();
        writer.await.unwrap();
        // Sends after close are dropped silently and flush returns
        recorder.record(vec![AccessEvent::new("x", AccessOperation::Recall, Utc::now())]);
        recorder.flush().await;
    }

    #[tokio::test]
    async fn test_access_patterns_recommendations() {
        let store = test_store();
        let analytics = AccessAnalytics::new(store.clone(), AnalyticsConfig::default());
        let now = Utc::now();

        let busy = insert(&store, MemoryTier::Working, now).await;
        let stale = insert(&store, MemoryTier::Session, now - Duration::days(20)).await;

        let mut events: Vec<_> = (0..6)
            .map(|i| AccessEvent::new(&busy, AccessOperation::Recall, now - Duration::minutes(i)))
            .collect();
        // An old event inside a wide window, long after the memory was last touched
        events.push(AccessEvent::new(&stale, AccessOperation::Restore, now - Duration::days(15)));
        store.record_events(events).await.unwrap();

        let patterns = analytics.access_patterns(None, now).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].memory_id, busy);
        assert_eq!(patterns[0].recent_accesses, 6);
        assert_eq!(patterns[0].recommendation, Some(TierRecommendation::PromoteEarly));

        let patterns = analytics
            .access_patterns(Some(Duration::days(30)), now)
            .await
            .unwrap();
        let stale_pattern = patterns.iter().find(|p| p.memory_id == stale).unwrap();
        assert_eq!(stale_pattern.recommendation, Some(TierRecommendation::DemoteCandidate));
        assert!(stale_pattern.staleness_hours >= 336.0);
    }

    #[tokio::test]
    async fn test_oversized_windows_are_rejected() {
        let store = test_store();
        let now = Utc::now();

        let analytics = AccessAnalytics::new(store.clone(), AnalyticsConfig::default());
        let err = analytics
            .access_patterns(Some(Duration::MAX), now)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let analytics = AccessAnalytics::new(
            store,
            AnalyticsConfig {
                window_hours: u64::MAX,
                event_retention_days: u64::MAX,
                ..Default::default()
            },
        );
        assert!(analytics.access_patterns(None, now).await.unwrap_err().is_validation());
        assert!(analytics.prune_access_log(now).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_prune_access_log_respects_retention() {
        let store = test_store();
        let analytics = AccessAnalytics::new(store.clone(), AnalyticsConfig::default());
        let now = Utc::now();
        store
            .record_events(vec![
                AccessEvent::new("old", AccessOperation::Recall, now - Duration::days(31)),
                AccessEvent::new("new", AccessOperation::Recall, now - Duration::days(1)),
            ])
            .await
            .unwrap();

        assert_eq!(analytics.prune_access_log(now).await.unwrap(), 1);
        assert_eq!(analytics.prune_access_log(now).await.unwrap(), 0);
        assert!(analytics.events_for("old", 10).await.unwrap_err().is_validation());
    }
}
