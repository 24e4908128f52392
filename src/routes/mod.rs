use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::ContentStore;
use crate::middleware::request_id::request_id_middleware;
use crate::services::{FeedQueue, GenerationOrchestrator, PreferenceEngine, TaskWorker};

pub mod feed;
pub mod interactions;
pub mod queue;
pub mod workers;

/// Dependency-injected service graph, constructed once at startup and
/// passed by reference through handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub feed: Arc<FeedQueue>,
    pub preferences: Arc<PreferenceEngine>,
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub worker: Arc<TaskWorker>,
    pub content: Arc<dyn ContentStore>,
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/feed", get(feed::get_feed))
        .route("/feed/stats/:user_id", get(feed::feed_stats))
        .route("/feed/:user_id/items/:content_id", delete(feed::remove_item))
        .route("/interactions", post(interactions::record_interaction))
        .route("/preferences/:user_id", get(interactions::get_preference))
        .route(
            "/preferences/:user_id/interactions",
            get(interactions::get_interactions),
        )
        .route("/preferences/:user_id/watched", get(interactions::watched))
        .route(
            "/preferences/:user_id/watched/:content_id",
            get(interactions::has_watched)
                .post(interactions::add_watched)
                .delete(interactions::remove_watched),
        )
        .route("/queue/:user_id/status", get(queue::status))
        .route("/queue/:user_id/process", post(queue::process))
        .route(
            "/queue/:user_id/tasks/:task_id/resubmit",
            post(queue::resubmit),
        )
        .route("/workers/status", get(workers::status))
        .route("/workers/process-all", post(workers::process_all))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
