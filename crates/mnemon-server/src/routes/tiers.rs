//! Tier routes.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use mnemon_core::TierStats;
use mnemon_sdk::{MigrationCandidate, MigrationReport, PruneReport};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::state::AppState;

/// Create tier router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tiers/stats", get(get_tier_stats))
        .route("/tiers/candidates", get(get_candidates))
        .route("/tiers/migrate", post(run_migration))
        .route("/tiers/prune", post(prune_memories))
}

pub async fn get_tier_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<TierStats>>> {
    Ok(Json(state.engine.get_tier_stats().await?))
}

/// Memories whose age has outgrown their tier
pub async fn get_candidates(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<MigrationCandidate>>> {
    Ok(Json(state.engine.get_memories_for_migration().await?))
}

/// Run one migration pass outside the background schedule
pub async fn run_migration(State(state): State<Arc<AppState>>) -> ApiResult<Json<MigrationReport>> {
    Ok(Json(state.engine.run_migration().await?))
}

/// Delete prune-eligible memories
pub async fn prune_memories(State(state): State<Arc<AppState>>) -> ApiResult<Json<PruneReport>> {
    Ok(Json(state.engine.prune_memories().await?))
}

#[cfg(test)]
mod tests {
    use crate::routes::{create_router, testing::send};
    use crate::state::testing::test_state;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_stats_after_store() {
        let app = create_router(test_state());
        send(
            &app,
            Method::POST,
            "/api/memories",
            Some(json!({ "content": "deploys go out on tuesdays", "context": "decision" })),
        )
        .await;

        let (status, body) = send(&app, Method::GET, "/api/tiers/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        let working = body
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["tier"] == "working")
            .unwrap();
        assert_eq!(working["count"], 1);
    }

    #[tokio::test]
    async fn test_fresh_memories_do_not_migrate() {
        let app = create_router(test_state());
        send(
            &app,
            Method::POST,
            "/api/memories",
            Some(json!({ "content": "feature flags live in config/flags.toml", "context": "project_knowledge" })),
        )
        .await;

        let (status, body) = send(&app, Method::GET, "/api/tiers/candidates", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let (status, body) = send(&app, Method::POST, "/api/tiers/migrate", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["migrated"], 0);
        assert_eq!(body["cancelled"], false);

        let (status, body) = send(&app, Method::POST, "/api/tiers/prune", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 0);
    }
}
