//! State Snapshots
//!
//! Point-in-time captures of a scope's hot working set, stored in their own
//! database so snapshot churn never contends with memory writes.

mod manager;
mod provider;
mod types;

pub use manager::SnapshotManager;
pub use provider::{ContextProvider, NoopContextProvider};
pub use types::{
    CaptureOptions, ContextChange, RestoreReport, SnapshotPayload, StateDiff, StateSnapshot,
};
