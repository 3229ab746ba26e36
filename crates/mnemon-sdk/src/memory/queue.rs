//! Vector write queue
//!
//! Fire-and-forget delivery of upserts and deletes to the vector store.
//! Enqueueing never blocks: when the queue is full the oldest pending
//! operation is dropped (the reconciliation job repairs the gap). A single
//! worker applies operations in order, retrying each with exponential backoff
//! and jitter; an operation that exhausts its retries is logged and abandoned.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::vector::VectorStore;
use crate::config::VectorQueueConfig;

/// Longest single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Pending vector-store write
#[derive(Debug, Clone, PartialEq)]
pub enum VectorOp {
    Upsert { id: String, vector: Vec<f32> },
    Delete { id: String },
}

impl VectorOp {
    pub fn id(&self) -> &str {
        match self {
            Self::Upsert { id, .. } | Self::Delete { id } => id,
        }
    }
}

/// Queue counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub enqueued: u64,
    pub applied: u64,
    pub failed: u64,
    pub dropped: u64,
    pub pending: usize,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<(u64, VectorOp)>,
    in_flight: Option<u64>,
    next_seq: u64,
    closed: bool,
}

impl QueueState {
    /// Whether every op with sequence number <= `seq` is finished or dropped
    fn settled_through(&self, seq: u64) -> bool {
        self.in_flight.is_none_or(|s| s > seq)
            && self.pending.front().is_none_or(|(s, _)| *s > seq)
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
    work: Notify,
    progress: Notify,
    enqueued: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    config: VectorQueueConfig,
    op_timeout: Duration,
}

/// Handle to the queue; cheap to clone.
#[derive(Clone)]
pub struct VectorWriteQueue {
    inner: Arc<QueueInner>,
}

impl VectorWriteQueue {
    /// Create the queue and spawn its worker on the current runtime.
    pub fn start(
        store: Arc<dyn VectorStore>,
        config: VectorQueueConfig,
        op_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState::default()),
            work: Notify::new(),
            progress: Notify::new(),
            enqueued: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            config,
            op_timeout,
        });
        let worker = tokio::spawn(run_worker(Arc::clone(&inner), store));
        (Self { inner }, worker)
    }

    /// Queue an operation. Never blocks; drops the oldest pending op when full.
    pub fn enqueue(&self, op: VectorOp) {
        let dropped = {
            let Ok(mut state) = self.inner.state.lock() else {
                warn!(id = op.id(), "vector queue lock poisoned; write skipped");
                return;
            };
            if state.closed {
                warn!(id = op.id(), "vector queue closed; write skipped");
                return;
            }
            let dropped = if state.pending.len() >= self.inner.config.capacity {
                state.pending.pop_front().map(|(_, op)| op)
            } else {
                None
            };
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.push_back((seq, op));
            dropped
        };

        self.inner.enqueued.fetch_add(1, Ordering::Relaxed);
        if let Some(dropped) = dropped {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(id = dropped.id(), "vector queue full; dropped oldest pending write");
            self.inner.progress.notify_waiters();
        }
        self.inner.work.notify_one();
    }

    /// Wait until every op enqueued before this call was applied, abandoned or dropped.
    pub async fn flush(&self) {
        let target = match self.inner.state.lock() {
            Ok(state) if state.next_seq > 0 => state.next_seq - 1,
            _ => return,
        };
        loop {
            let notified = self.inner.progress.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let settled = match self.inner.state.lock() {
                Ok(state) => state.settled_through(target),
                Err(_) => true,
            };
            if settled {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting writes; the worker drains what is pending and exits.
    pub fn close(&self) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.closed = true;
        }
        self.inner.work.notify_one();
    }

    pub fn stats(&self) -> QueueStats {
        let pending = self
            .inner
            .state
            .lock()
            .map(|state| state.pending.len())
            .unwrap_or(0);
        QueueStats {
            enqueued: self.inner.enqueued.load(Ordering::Relaxed),
            applied: self.inner.applied.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            pending,
        }
    }
}

enum Next {
    Apply(VectorOp),
    Wait,
    Done,
}

async fn run_worker(inner: Arc<QueueInner>, store: Arc<dyn VectorStore>) {
    loop {
        let next = match inner.state.lock() {
            Ok(mut state) => match state.pending.pop_front() {
                Some((seq, op)) => {
                    state.in_flight = Some(seq);
                    Next::Apply(op)
                }
                None if state.closed => Next::Done,
                None => Next::Wait,
            },
            Err(_) => {
                warn!("vector queue lock poisoned; worker exiting");
                Next::Done
            }
        };

        match next {
            Next::Apply(op) => {
                apply_with_retry(&inner, store.as_ref(), &op).await;
                if let Ok(mut state) = inner.state.lock() {
                    state.in_flight = None;
                }
                inner.progress.notify_waiters();
            }
            Next::Wait => inner.work.notified().await,
            Next::Done => {
                debug!("vector queue drained and closed");
                return;
            }
        }
    }
}

async fn apply_with_retry(inner: &QueueInner, store: &dyn VectorStore, op: &VectorOp) {
    let attempts = inner.config.max_retries.max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        let call = async {
            match op {
                VectorOp::Upsert { id, vector } => store.upsert(id, vector).await,
                VectorOp::Delete { id } => store.delete(id).await,
            }
        };
        match tokio::time::timeout(inner.op_timeout, call).await {
            Ok(Ok(())) => {
                inner.applied.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("timed out after {}ms", inner.op_timeout.as_millis()),
        }

        if attempt + 1 < attempts {
            let delay = backoff(inner.config.retry_base_ms, attempt);
            debug!(id = op.id(), attempt, delay_ms = delay.as_millis() as u64, error = %last_error, "retrying vector write");
            tokio::time::sleep(delay).await;
        }
    }

    inner.failed.fetch_add(1, Ordering::Relaxed);
    warn!(
        id = op.id(),
        attempts,
        error = %last_error,
        "vector store write abandoned after retries"
    );
}

/// `base * 2^attempt` plus up to `base / 2` of jitter, capped.
fn backoff(base_ms: u64, attempt: u32) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
    let jitter = if base_ms >= 2 {
        rand::thread_rng().gen_range(0..=base_ms / 2)
    } else {
        0
    };
    Duration::from_millis(exp.saturating_add(jitter)).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::testing::FlakyVectorStore;
    use crate::memory::vector::InMemoryVectorStore;

    fn fast_config(capacity: usize) -> VectorQueueConfig {
        VectorQueueConfig {
            capacity,
            max_retries: 3,
            retry_base_ms: 1,
        }
    }

    fn upsert(id: &str) -> VectorOp {
        VectorOp::Upsert {
            id: id.to_string(),
            vector: vec![1.0, 0.0],
        }
    }

    #[tokio::test]
    async fn test_applies_in_order() {
        let store = Arc::new(InMemoryVectorStore::new());
        let (queue, _worker) =
            VectorWriteQueue::start(store.clone(), fast_config(16), Duration::from_secs(1));

        queue.enqueue(upsert("a"));
        queue.enqueue(upsert("b"));
        queue.enqueue(VectorOp::Delete { id: "a".into() });
        queue.flush().await;

        assert_eq!(store.ids().await.unwrap(), vec!["b"]);
        let stats = queue.stats();
        assert_eq!(stats.applied, 3);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_oldest_without_blocking() {
        let store = Arc::new(InMemoryVectorStore::new());
        let (queue, _worker) =
            VectorWriteQueue::start(store.clone(), fast_config(2), Duration::from_secs(1));

        // The worker cannot run until we yield, so all five land in the queue at once
        for id in ["1", "2", "3", "4", "5"] {
            queue.enqueue(upsert(id));
        }
        assert_eq!(queue.stats().dropped, 3);

        queue.flush().await;
        assert_eq!(store.ids().await.unwrap(), vec!["4", "5"]);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let store = Arc::new(FlakyVectorStore::failing_first(2));
        let (queue, _worker) =
            VectorWriteQueue::start(store.clone(), fast_config(8), Duration::from_secs(1));

        queue.enqueue(upsert("a"));
        queue.flush().await;

        assert_eq!(store.inner.ids().await.unwrap(), vec!["a"]);
        assert_eq!(queue.stats().applied, 1);
        assert_eq!(queue.stats().failed, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_abandoned() {
        let store = Arc::new(FlakyVectorStore::failing_first(100));
        let (queue, _worker) =
            VectorWriteQueue::start(store.clone(), fast_config(8), Duration::from_secs(1));

        queue.enqueue(upsert("a"));
        queue.flush().await;

        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.applied, 0);
        assert_eq!(store.inner.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_drains_then_stops_worker() {
        let store = Arc::new(InMemoryVectorStore::new());
        let (queue, worker) =
            VectorWriteQueue::start(store.clone(), fast_config(8), Duration::from_secs(1));

        queue.enqueue(upsert("a"));
        queue.close();
        worker.await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        queue.enqueue(upsert("b"));
        assert_eq!(queue.stats().enqueued, 1);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff(1, 0), Duration::from_millis(1));
        assert_eq!(backoff(1, 3), Duration::from_millis(8));
        assert!(backoff(100, 2) >= Duration::from_millis(400));
        assert!(backoff(100, 2) <= Duration::from_millis(450));
        assert_eq!(backoff(1000, 10), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_flush_on_empty_queue_returns() {
        let store = Arc::new(InMemoryVectorStore::new());
        let (queue, _worker) =
            VectorWriteQueue::start(store, fast_config(8), Duration::from_secs(1));
        tokio_test::assert_ok!(
            tokio::time::timeout(Duration::from_secs(1), queue.flush()).await
        );
    }
}
