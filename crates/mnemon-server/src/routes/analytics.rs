//! Access analytics routes.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use mnemon_core::AccessEvent;
use mnemon_sdk::AccessPattern;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Widest accepted lookback (ten years)
const MAX_WINDOW_HOURS: f64 = 10.0 * 365.0 * 24.0;

/// Create analytics router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics/access", get(access_patterns))
        .route("/memories/{id}/access", get(access_history))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternsQuery {
    /// Lookback window; defaults to the engine configuration
    pub window_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

fn window(hours: Option<f64>) -> ApiResult<Option<Duration>> {
    match hours {
        None => Ok(None),
        Some(h) if h > 0.0 && h <= MAX_WINDOW_HOURS => {
            Ok(Some(Duration::from_secs_f64(h * 3600.0)))
        }
        Some(h) => Err(ApiError::BadRequest(format!(
            "windowHours must be in (0, {MAX_WINDOW_HOURS}], got {h}"
        ))),
    }
}

/// Recent access summaries with advisory tier recommendations
pub async fn access_patterns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PatternsQuery>,
) -> ApiResult<Json<Vec<AccessPattern>>> {
    let window = window(query.window_hours)?;
    Ok(Json(state.engine.access_patterns(window).await?))
}

/// Access log of one memory, newest first
pub async fn access_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<AccessEvent>>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.engine.access_history(&id, limit).await?))
}
