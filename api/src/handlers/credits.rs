use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use genhub_core::money::Credits;

use crate::dto::{AdjustCreditsRequest, AdjustCreditsResponse};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn adjust(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AdjustCreditsRequest>,
) -> Result<Json<AdjustCreditsResponse>, ApiError> {
    let (old_balance, new_balance) = state
        .ledger
        .admin_adjustment(body.telegram_id, Credits::new(body.amount), body.reason.clone())
        .await?;
    Ok(Json(AdjustCreditsResponse {
        telegram_id: body.telegram_id,
        amount: body.amount,
        old_balance: old_balance.0,
        new_balance: new_balance.0,
        reason: body.reason,
    }))
}
