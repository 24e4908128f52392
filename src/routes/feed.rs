use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::request_id::RequestId,
    models::{FeedPage, FeedRequest, FeedStats},
    routes::AppState,
    services::feed_queue,
};

/// Serves one page of the infinite feed, refilling synchronously when the
/// queue runs low.
pub async fn get_feed(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Query(request): Query<FeedRequest>,
) -> Json<FeedPage> {
    tracing::info!(
        request_id = %request_id,
        user_id = %request.user_id,
        cursor = request.cursor,
        limit = request.limit,
        refresh = request.refresh,
        "Feed page requested"
    );

    let page = feed_queue::fetch_feed(
        &state.feed,
        &state.preferences,
        state.content.as_ref(),
        request,
    )
    .await;

    Json(page)
}

pub async fn feed_stats(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<FeedStats>> {
    let stats = state.feed.stats(&user_id).await?;
    Ok(Json(stats))
}

pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path((user_id, content_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let removed = state.feed.remove(&user_id, &content_id).await?;
    Ok(Json(json!({
        "success": true,
        "removed": removed,
    })))
}
