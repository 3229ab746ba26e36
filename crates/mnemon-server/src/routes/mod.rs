//! API route modules.

pub mod analytics;
pub mod health;
pub mod memory;
pub mod states;
pub mod tiers;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .merge(memory::router())
        .merge(tiers::router())
        .merge(analytics::router())
        .merge(states::router());

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
