//! Context provider
//!
//! Snapshots carry free-form context alongside memory ids. Where that context
//! comes from (and where it goes on restore) is up to the host application.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::SDKResult;

#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Context to store with a snapshot of `scope`
    async fn capture(&self, scope: &str) -> SDKResult<Map<String, Value>>;

    /// Hand restored context back to the host
    async fn replay(&self, scope: &str, context: &Map<String, Value>) -> SDKResult<()>;
}

/// Captures nothing and ignores replays
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopContextProvider;

#[async_trait]
impl ContextProvider for NoopContextProvider {
    async fn capture(&self, _scope: &str) -> SDKResult<Map<String, Value>> {
        Ok(Map::new())
    }

    async fn replay(&self, _scope: &str, _context: &Map<String, Value>) -> SDKResult<()> {
        Ok(())
    }
}
