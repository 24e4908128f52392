use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{error::AppResult, models::QueueStatus, routes::AppState};

pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<QueueStatus>> {
    let status = state.worker.queue_status(&user_id).await?;
    Ok(Json(status))
}

/// On-demand drain of one user's queue, off the feed read path.
pub async fn process(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    state.worker.reset_stuck_tasks(&user_id).await?;
    let processed = state.worker.process_user(&user_id).await?;
    Ok(Json(json!({
        "success": true,
        "processed": processed,
    })))
}

/// Puts a failed task back in line; the only retry path for failures.
pub async fn resubmit(
    State(state): State<Arc<AppState>>,
    Path((user_id, task_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    let resubmitted = state.worker.resubmit_failed_task(&user_id, task_id).await?;
    Ok(Json(json!({
        "success": resubmitted,
        "task_id": task_id,
        "message": if resubmitted {
            "Task resubmitted for processing"
        } else {
            "No failed task with that id"
        },
    })))
}
