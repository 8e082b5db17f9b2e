use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::json;

use genhub_core::gateway::SubmitInput;
use genhub_core::models::ChatCoords;

use crate::dto::{RefreshRequest, ResultsResponse, SubmitRequest, SubmitResponse, TelegramIdQuery};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let input = SubmitInput {
        user_telegram_id: body.telegram_id,
        model_key: body.model_key.clone(),
        prompt: body.prompt.clone(),
        params: body.params(),
        reference_urls: body.reference_urls.clone(),
        reference_file_ids: body.reference_file_ids.clone(),
        chat_coords: ChatCoords {
            chat_id: body.chat_id,
            message_id: body.message_id,
            prompt_message_id: body.prompt_message_id,
            language: body.language.clone(),
        },
    };
    let outcome = state.gateway.submit(input).await?;
    Ok(Json(SubmitResponse {
        request: outcome.request,
        job_id: outcome.job_id,
        upstream_job_id: outcome.upstream_job_id,
        trial_used: outcome.trial_used,
    }))
}

pub async fn active(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TelegramIdQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let found = state.generations.find_active_for_user(q.telegram_id).await?;
    let body = match found {
        Some(request) => json!({
            "has_active": true,
            "request_id": request.id,
            "public_id": request.id,
            "status": request.status.as_str(),
        }),
        None => json!({ "has_active": false }),
    };
    Ok(Json(body))
}

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<TelegramIdQuery>,
) -> Result<Json<genhub_core::models::GenerationRequest>, ApiError> {
    let request = load_owned(&state, &id, q.telegram_id).await?;
    Ok(Json(request))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<genhub_core::models::GenerationRequest>, ApiError> {
    load_owned(&state, &id, body.telegram_id).await?;
    let updated = genhub_core::poller::refresh_once(&state.poller, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("generation {id}")))?;
    Ok(Json(updated))
}

pub async fn results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<TelegramIdQuery>,
) -> Result<Json<ResultsResponse>, ApiError> {
    load_owned(&state, &id, q.telegram_id).await?;
    let rows = state.generations.results(&id).await?;
    Ok(Json(ResultsResponse {
        urls: rows.into_iter().map(|r| r.url).collect(),
    }))
}

/// Fetches a generation request and checks it belongs to `telegram_id`.
async fn load_owned(
    state: &AppState,
    id: &str,
    telegram_id: i64,
) -> Result<genhub_core::models::GenerationRequest, ApiError> {
    let request = state
        .generations
        .find(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("generation {id}")))?;
    if request.user_telegram_id != telegram_id {
        return Err(ApiError::Forbidden);
    }
    Ok(request)
}
