use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::dto::{BroadcastResponse, CreateBroadcastRequest, ListBroadcastsQuery};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBroadcastRequest>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    let broadcast = state
        .broadcasts
        .create(
            body.admin_telegram_id,
            body.content_type,
            body.text,
            body.media_file_id,
            body.button,
            body.filter_tag,
        )
        .await?;
    Ok(Json(BroadcastResponse { broadcast }))
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    state.broadcasts.start(id).await?;
    let broadcast = state
        .broadcast_repo
        .find(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("broadcast {id}")))?;
    Ok(Json(BroadcastResponse { broadcast }))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    state.broadcasts.cancel(id).await?;
    let broadcast = state
        .broadcast_repo
        .find(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("broadcast {id}")))?;
    Ok(Json(BroadcastResponse { broadcast }))
}

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    let broadcast = state
        .broadcast_repo
        .find(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("broadcast {id}")))?;
    Ok(Json(BroadcastResponse { broadcast }))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListBroadcastsQuery>,
) -> Result<Json<Vec<BroadcastResponse>>, ApiError> {
    let rows = state.broadcast_repo.list(q.limit).await?;
    Ok(Json(
        rows.into_iter().map(|broadcast| BroadcastResponse { broadcast }).collect(),
    ))
}
