//! Health check endpoint.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use mnemon_sdk::{HealthReport, HealthStatus};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub initialized: bool,
    #[serde(flatten)]
    pub engine: HealthReport,
}

/// Health check endpoint. Degraded still answers 200 since exact retrieval
/// keeps working; an unreachable structured store answers 503.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let report = state.engine.health().await;

    let status = match report.status {
        HealthStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    (
        status,
        Json(HealthResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: state.started_at,
            uptime_seconds: state.start_time.elapsed().as_secs(),
            initialized: state.engine.is_initialized(),
            engine: report,
        }),
    )
}
