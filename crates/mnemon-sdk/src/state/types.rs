//! Snapshot payloads, options and results.

use mnemon_core::SnapshotSummary;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// What a snapshot holds: the hot working set plus caller context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    /// Most recently accessed working-tier ids, hottest first
    pub working_ids: Vec<String>,
    /// Most recently accessed session-tier ids, hottest first
    pub session_ids: Vec<String>,
    /// Free-form context captured from the provider and the caller
    #[serde(default)]
    pub context: Map<String, Value>,
}

/// A decoded snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub summary: SnapshotSummary,
    pub payload: SnapshotPayload,
}

/// Options for `capture_state`
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    /// Retention weight in [0, 1] (default: 0.5)
    pub importance: Option<f64>,
    /// Overrides the configured default time-to-live
    pub ttl: Option<Duration>,
    /// Merged over whatever the context provider captures
    pub context: Map<String, Value>,
}

impl CaptureOptions {
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Outcome of `restore_state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub snapshot_id: String,
    pub scope: String,
    /// Ids that still exist and were marked as accessed
    pub resurfaced: Vec<String>,
    /// Ids deleted or consolidated away since capture
    pub missing: Vec<String>,
    pub context: Map<String, Value>,
}

/// One context key that differs between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextChange {
    pub key: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Differences going from snapshot `from` to snapshot `to`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDiff {
    pub from: String,
    pub to: String,
    pub added_working: Vec<String>,
    pub removed_working: Vec<String>,
    pub added_session: Vec<String>,
    pub removed_session: Vec<String>,
    pub changed_context: Vec<ContextChange>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.added_working.is_empty()
            && self.removed_working.is_empty()
            && self.added_session.is_empty()
            && self.removed_session.is_empty()
            && self.changed_context.is_empty()
    }
}
