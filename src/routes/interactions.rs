use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::request_id::RequestId,
    models::InteractionType,
    routes::AppState,
    services::InteractionAck,
};

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub user_id: String,
    pub content_id: String,
    pub interaction_type: InteractionType,
}

/// Records a user interaction; may fire a preference recompute when the
/// update threshold is reached.
pub async fn record_interaction(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<InteractionRequest>,
) -> AppResult<Json<InteractionAck>> {
    tracing::info!(
        request_id = %request_id,
        user_id = %request.user_id,
        content_id = %request.content_id,
        interaction = request.interaction_type.as_str(),
        "Recording interaction"
    );

    let ack = state
        .preferences
        .record_interaction(&request.user_id, &request.content_id, request.interaction_type)
        .await?;
    Ok(Json(ack))
}

/// A user without a preference yet gets an explicit null, not an error.
pub async fn get_preference(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    let preference = state.preferences.get_preference(&user_id).await?;
    Ok(Json(json!({
        "success": true,
        "preference": preference,
    })))
}

pub async fn get_interactions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    let interactions = state.preferences.get_interactions(&user_id).await?;
    Ok(Json(json!({
        "success": true,
        "user_id": user_id,
        "count": interactions.len(),
        "interactions": interactions,
    })))
}

pub async fn watched(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    let watched = state.preferences.watched(&user_id).await?;
    Ok(Json(json!({
        "success": true,
        "user_id": user_id,
        "count": watched.len(),
        "watched": watched,
    })))
}

pub async fn has_watched(
    State(state): State<Arc<AppState>>,
    Path((user_id, content_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let has_watched = state.preferences.has_watched(&user_id, &content_id).await?;
    Ok(Json(json!({
        "success": true,
        "has_watched": has_watched,
    })))
}

pub async fn add_watched(
    State(state): State<Arc<AppState>>,
    Path((user_id, content_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let added = state.preferences.add_watched(&user_id, &content_id).await?;
    Ok(Json(json!({
        "success": true,
        "added": added,
    })))
}

/// Admin-level removal; the watched set is otherwise append-only.
pub async fn remove_watched(
    State(state): State<Arc<AppState>>,
    Path((user_id, content_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let removed = state
        .preferences
        .remove_watched(&user_id, &content_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "removed": removed,
    })))
}
