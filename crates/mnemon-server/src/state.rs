//! Application state.

use chrono::{DateTime, Utc};
use mnemon_sdk::MemoryEngine;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Memory engine
    pub engine: Arc<MemoryEngine>,
    /// Server start time
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self {
            engine,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}
