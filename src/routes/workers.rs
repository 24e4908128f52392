use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{error::AppResult, routes::AppState};

pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.worker.stats_snapshot().await;
    Json(json!({
        "success": true,
        "stats": stats,
    }))
}

/// Drains every user's pending tasks once; the poll loop runs the same
/// code on a timer.
pub async fn process_all(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let processed = state.worker.process_all_pending_tasks().await?;
    Ok(Json(json!({
        "success": true,
        "processed": processed,
    })))
}
