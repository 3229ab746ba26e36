//! Snapshot manager
//!
//! Captures the hot working set of a scope (recently accessed working and
//! session ids, plus host context) into a separate snapshot database, keeps
//! each scope under its retention cap, and restores or diffs snapshots.
//! Restoring never rewrites memory content; it only marks the captured
//! memories as accessed so they resurface in recall.

use chrono::{DateTime, Utc};
use mnemon_core::{
    AccessEvent, AccessOperation, MemoryFilter, MemoryOrder, MemoryTier, SnapshotRecord,
    SnapshotSummary,
};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::provider::ContextProvider;
use super::types::{
    CaptureOptions, ContextChange, RestoreReport, SnapshotPayload, StateDiff, StateSnapshot,
};
use crate::config::SnapshotConfig;
use crate::memory::{AccessRecorder, StructuredStore, TierClassifier};
use crate::utils::{to_chrono, validate_memory_id, validate_scope};
use crate::{SDKError, SDKResult};

const DEFAULT_IMPORTANCE: f64 = 0.5;

#[derive(Clone)]
pub struct SnapshotManager {
    /// Store over the snapshot database
    snapshots: StructuredStore,
    /// Store over the memory database
    memories: StructuredStore,
    classifier: TierClassifier,
    recorder: AccessRecorder,
    provider: Arc<dyn ContextProvider>,
    config: SnapshotConfig,
}

impl SnapshotManager {
    pub fn new(
        snapshots: StructuredStore,
        memories: StructuredStore,
        classifier: TierClassifier,
        recorder: AccessRecorder,
        provider: Arc<dyn ContextProvider>,
        config: SnapshotConfig,
    ) -> Self {
        Self {
            snapshots,
            memories,
            classifier,
            recorder,
            provider,
            config,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Capture
    // ─────────────────────────────────────────────────────────────────────────

    /// Capture a snapshot of `scope` and enforce the scope's retention cap.
    /// Returns the new snapshot's summary. A failed capture stores nothing.
    pub async fn capture(
        &self,
        scope: &str,
        name: Option<&str>,
        options: CaptureOptions,
        now: DateTime<Utc>,
    ) -> SDKResult<SnapshotSummary> {
        validate_scope(scope)?;
        let importance = options.importance.unwrap_or(DEFAULT_IMPORTANCE);
        if !(0.0..=1.0).contains(&importance) {
            return Err(SDKError::validation(format!(
                "snapshot importance must be within [0, 1], got {}",
                importance
            )));
        }

        let hot = self
            .memories
            .list(MemoryFilter {
                order: MemoryOrder::AccessedDesc,
                ..Default::default()
            })
            .await?;
        let hot_ids = |tier: MemoryTier| -> Vec<String> {
            hot.iter()
                .filter(|m| self.classifier.matches_tier(m, tier, now))
                .take(self.config.hot_limit)
                .map(|m| m.id.clone())
                .collect()
        };

        let mut context = self.provider.capture(scope).await?;
        context.extend(options.context);
        let payload = SnapshotPayload {
            working_ids: hot_ids(MemoryTier::Working),
            session_ids: hot_ids(MemoryTier::Session),
            context,
        };

        let json = serde_json::to_vec(&payload)?;
        let (bytes, compressed) = if self.config.compress {
            (zstd::stream::encode_all(json.as_slice(), self.config.compression_level)?, true)
        } else {
            (json, false)
        };

        let ttl = options
            .ttl
            .or(self.config.default_ttl_secs.map(Duration::from_secs));
        let expires_at = match ttl {
            Some(ttl) => Some(now.checked_add_signed(to_chrono(ttl)).ok_or_else(|| {
                SDKError::validation(format!("snapshot ttl of {}s is out of range", ttl.as_secs()))
            })?),
            None => None,
        };
        let record = SnapshotRecord {
            id: uuid::Uuid::new_v4().to_string(),
            scope: scope.to_string(),
            name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .unwrap_or_else(|| format!("snapshot-{}", now.format("%Y%m%dT%H%M%S%.3fZ"))),
            created_at: now,
            expires_at,
            importance,
            compressed,
            size_bytes: bytes.len() as u64,
            payload: bytes,
        };
        let summary = SnapshotSummary::from(&record);

        self.snapshots
            .call("snapshot_insert", move |db| db.insert_snapshot(&record))
            .await?;
        info!(
            id = %summary.id,
            scope,
            working = payload.working_ids.len(),
            session = payload.session_ids.len(),
            size_bytes = summary.size_bytes,
            "state captured"
        );

        self.prune_scope(scope, now).await?;
        Ok(summary)
    }

    /// Delete expired snapshots of `scope`, then trim it to `max_per_scope`
    /// by removing the lowest-importance, oldest unprotected snapshots.
    /// Unexpired snapshots at or above `protect_importance` are never removed.
    pub async fn prune_scope(&self, scope: &str, now: DateTime<Utc>) -> SDKResult<Vec<String>> {
        let listed = self.list(Some(scope)).await?;

        let (expired, live): (Vec<_>, Vec<_>) = listed.into_iter().partition(|s| s.is_expired(now));
        let mut doomed: Vec<String> = expired.into_iter().map(|s| s.id).collect();

        let excess = live.len().saturating_sub(self.config.max_per_scope);
        if excess > 0 {
            let mut unprotected: Vec<&SnapshotSummary> = live
                .iter()
                .filter(|s| s.importance < self.config.protect_importance)
                .collect();
            unprotected.sort_by(|a, b| {
                a.importance
                    .total_cmp(&b.importance)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            });
            if unprotected.len() < excess {
                debug!(scope, excess, "scope over cap; remaining snapshots are protected");
            }
            doomed.extend(unprotected.into_iter().take(excess).map(|s| s.id.clone()));
        }

        if doomed.is_empty() {
            return Ok(doomed);
        }
        let ids = doomed.clone();
        let removed = self
            .snapshots
            .call("snapshot_delete", move |db| db.delete_snapshots(&ids))
            .await?;
        debug!(scope, removed, "snapshots pruned");
        Ok(doomed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read
    // ─────────────────────────────────────────────────────────────────────────

    /// Snapshot summaries, newest first
    pub async fn list(&self, scope: Option<&str>) -> SDKResult<Vec<SnapshotSummary>> {
        if let Some(scope) = scope {
            validate_scope(scope)?;
        }
        let scope = scope.map(String::from);
        self.snapshots
            .call("snapshot_list", move |db| db.list_snapshots(scope.as_deref()))
            .await
    }

    /// Load and decode one snapshot
    pub async fn get(&self, id: &str) -> SDKResult<StateSnapshot> {
        validate_memory_id(id)?;
        let lookup = id.to_string();
        let record = self
            .snapshots
            .call("snapshot_get", move |db| db.get_snapshot(&lookup))
            .await?
            .ok_or_else(|| SDKError::not_found("Snapshot", id))?;

        let json = if record.compressed {
            zstd::stream::decode_all(record.payload.as_slice())?
        } else {
            record.payload.clone()
        };
        let payload: SnapshotPayload = serde_json::from_slice(&json)?;
        Ok(StateSnapshot {
            summary: SnapshotSummary::from(&record),
            payload,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Restore / Diff
    // ─────────────────────────────────────────────────────────────────────────

    /// Resurface the captured memories and replay the captured context.
    pub async fn restore(&self, id: &str, now: DateTime<Utc>) -> SDKResult<RestoreReport> {
        let snapshot = self.get(id).await?;
        let payload = snapshot.payload;

        let mut seen = HashSet::new();
        let ids: Vec<String> = payload
            .working_ids
            .iter()
            .chain(&payload.session_ids)
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let existing: HashSet<String> = self
            .memories
            .get_many(ids.clone())
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();
        let (resurfaced, missing): (Vec<String>, Vec<String>) =
            ids.into_iter().partition(|id| existing.contains(id));

        self.memories.touch(resurfaced.clone(), now).await?;
        self.recorder.record(
            resurfaced
                .iter()
                .map(|id| AccessEvent::new(id, AccessOperation::Restore, now))
                .collect(),
        );

        let scope = snapshot.summary.scope;
        self.provider.replay(&scope, &payload.context).await?;

        info!(
            id,
            scope = %scope,
            resurfaced = resurfaced.len(),
            missing = missing.len(),
            "state restored"
        );
        Ok(RestoreReport {
            snapshot_id: snapshot.summary.id,
            scope,
            resurfaced,
            missing,
            context: payload.context,
        })
    }

    /// What changed going from snapshot `from` to snapshot `to`
    pub async fn diff(&self, from: &str, to: &str) -> SDKResult<StateDiff> {
        let before = self.get(from).await?.payload;
        let after = self.get(to).await?.payload;

        let (added_working, removed_working) = id_changes(&before.working_ids, &after.working_ids);
        let (added_session, removed_session) = id_changes(&before.session_ids, &after.session_ids);

        Ok(StateDiff {
            from: from.to_string(),
            to: to.to_string(),
            added_working,
            removed_working,
            added_session,
            removed_session,
            changed_context: context_changes(&before.context, &after.context),
        })
    }
}

/// (ids only in `after`, ids only in `before`), each in its list's order
fn id_changes(before: &[String], after: &[String]) -> (Vec<String>, Vec<String>) {
    let before_set: HashSet<&String> = before.iter().collect();
    let after_set: HashSet<&String> = after.iter().collect();
    let added = after.iter().filter(|id| !before_set.contains(id)).cloned().collect();
    let removed = before.iter().filter(|id| !after_set.contains(id)).cloned().collect();
    (added, removed)
}

fn context_changes(before: &Map<String, Value>, after: &Map<String, Value>) -> Vec<ContextChange> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter_map(|key| {
            let old = before.get(key);
            let new = after.get(key);
            (old != new).then(|| ContextChange {
                key: key.clone(),
                before: old.cloned(),
                after: new.cloned(),
            })
        })
        .collect()
}
