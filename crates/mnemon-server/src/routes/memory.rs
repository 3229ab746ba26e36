//! Memory routes.
//!
//! - POST /memories - Store a memory (dual-write)
//! - GET/DELETE /memories/{id} - Fetch or delete one memory
//! - GET /memories/recall - Ranked recall (records access)
//! - GET /memories/search/exact - Substring or metadata match
//! - GET /memories/search/hybrid - Blended exact + semantic search
//! - POST /memories/consolidate - Merge near-duplicates now
//! - POST /memories/reconcile - Repair the vector store

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use mnemon_core::{Memory, MemoryContext, MemoryTier};
use mnemon_sdk::{
    ConsolidationReport, ExactSearchOptions, HybridSearchOptions, RecallResult, ReconcileReport,
    SearchResult, StoreOutcome, StoreRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;

/// Create memory router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/memories", post(store_memory))
        .route("/memories/{id}", get(get_memory).delete(delete_memory))
        .route("/memories/recall", get(recall_memories))
        .route("/memories/search/exact", get(search_exact))
        .route("/memories/search/hybrid", get(search_hybrid))
        .route("/memories/consolidate", post(consolidate_memories))
        .route("/memories/reconcile", post(reconcile_vectors))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallQuery {
    pub query: String,
    pub context: Option<MemoryContext>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSearchQuery {
    pub query: String,
    /// Metadata key to match instead of content
    pub field: Option<String>,
    pub context: Option<MemoryContext>,
    pub tier: Option<MemoryTier>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridSearchQuery {
    pub query: String,
    pub context: Option<MemoryContext>,
    pub tier: Option<MemoryTier>,
    pub exact_weight: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ConsolidateQuery {
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub results: Vec<T>,
    pub query: String,
    pub total: usize,
}

impl<T> ListResponse<T> {
    fn new(query: String, results: Vec<T>) -> Self {
        Self {
            total: results.len(),
            results,
            query,
        }
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Store a memory. 201 when a new record was written, 200 when it was
/// deduplicated or rejected as unimportant.
pub async fn store_memory(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StoreRequest>,
) -> ApiResult<(StatusCode, Json<StoreOutcome>)> {
    let outcome = state.engine.store_memory(req).await?;

    let status = if outcome.stored && !outcome.deduplicated {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

pub async fn get_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Memory>> {
    Ok(Json(state.engine.get_memory(&id).await?))
}

pub async fn delete_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.delete_memory(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn recall_memories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecallQuery>,
) -> ApiResult<Json<ListResponse<RecallResult>>> {
    let results = state
        .engine
        .recall_memories(&query.query, query.context, query.limit)
        .await?;
    Ok(Json(ListResponse::new(query.query, results)))
}

pub async fn search_exact(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExactSearchQuery>,
) -> ApiResult<Json<ListResponse<Memory>>> {
    let options = ExactSearchOptions {
        field: query.field,
        context: query.context,
        tier: query.tier,
        limit: query.limit,
    };
    let results = state.engine.search_exact(&query.query, options).await?;
    Ok(Json(ListResponse::new(query.query, results)))
}

pub async fn search_hybrid(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HybridSearchQuery>,
) -> ApiResult<Json<ListResponse<SearchResult>>> {
    let options = HybridSearchOptions {
        context: query.context,
        tier: query.tier,
        exact_weight: query.exact_weight,
        limit: query.limit,
    };
    let results = state.engine.search_hybrid(&query.query, options).await?;
    Ok(Json(ListResponse::new(query.query, results)))
}

pub async fn consolidate_memories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConsolidateQuery>,
) -> ApiResult<Json<ConsolidationReport>> {
    let report = state.engine.consolidate_memories(query.threshold).await?;
    info!(merged = report.merged, "consolidation requested over API");
    Ok(Json(report))
}

pub async fn reconcile_vectors(State(state): State<Arc<AppState>>) -> ApiResult<Json<ReconcileReport>> {
    Ok(Json(state.engine.reconcile_vectors().await?))
}
