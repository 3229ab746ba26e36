//! State snapshot routes.
//!
//! - POST /states - Capture the hot working set of a scope
//! - GET /states - List snapshots, optionally for one scope
//! - GET /states/{id} - Decoded snapshot
//! - POST /states/{id}/restore - Resurface a snapshot's memories
//! - GET /states/diff - Compare two snapshots

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use mnemon_core::SnapshotSummary;
use mnemon_sdk::{CaptureOptions, RestoreReport, StateDiff, StateSnapshot};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Longest accepted snapshot time-to-live (ten years)
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Create state router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/states", get(list_states).post(capture_state))
        .route("/states/diff", get(diff_states))
        .route("/states/{id}", get(get_state))
        .route("/states/{id}/restore", post(restore_state))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStateRequest {
    pub scope: String,
    pub name: Option<String>,
    pub importance: Option<f64>,
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl CaptureStateRequest {
    fn options(&self) -> CaptureOptions {
        CaptureOptions {
            importance: self.importance,
            ttl: self.ttl_seconds.map(Duration::from_secs),
            context: self.context.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListStatesQuery {
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub from: String,
    pub to: String,
}

pub async fn capture_state(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CaptureStateRequest>,
) -> ApiResult<(StatusCode, Json<SnapshotSummary>)> {
    if req
        .ttl_seconds
        .is_some_and(|ttl| !(1..=MAX_TTL_SECS).contains(&ttl))
    {
        return Err(ApiError::BadRequest(format!(
            "ttlSeconds must be between 1 and {MAX_TTL_SECS}"
        )));
    }
    let summary = state
        .engine
        .capture_state(&req.scope, req.name.as_deref(), req.options())
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn list_states(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListStatesQuery>,
) -> ApiResult<Json<Vec<SnapshotSummary>>> {
    Ok(Json(state.engine.list_states(query.scope.as_deref()).await?))
}

pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StateSnapshot>> {
    Ok(Json(state.engine.get_state(&id).await?))
}

pub async fn restore_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<RestoreReport>> {
    Ok(Json(state.engine.restore_state(&id).await?))
}

pub async fn diff_states(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DiffQuery>,
) -> ApiResult<Json<StateDiff>> {
    Ok(Json(state.engine.diff_states(&query.from, &query.to).await?))
}
