//! `ApiError` → `IntoResponse`, mapping each [`CoreError`] variant to its
//! HTTP status via a `thiserror` enum plus an `IntoResponse` impl.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use genhub_core::CoreError;
use serde_json::json;

pub enum ApiError {
    Core(CoreError),
    NotFound(String),
    Forbidden,
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError::Core(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Core(CoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            ApiError::Core(CoreError::ModelNotFound(key)) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("model not found: {key}") }),
            ),
            ApiError::Core(CoreError::PriceNotFound) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "no price configured for this model/parameter combination" }),
            ),
            ApiError::Core(CoreError::InsufficientBalance) => (
                StatusCode::PAYMENT_REQUIRED,
                json!({ "error": "insufficient balance" }),
            ),
            ApiError::Core(CoreError::ActiveLimit { active_count, limit }) => (
                StatusCode::CONFLICT,
                json!({ "error": "active generation limit reached", "active_count": active_count, "limit": limit }),
            ),
            ApiError::Core(CoreError::ProviderBalanceLow { balance, threshold }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "provider balance low", "balance": balance, "threshold": threshold }),
            ),
            ApiError::Core(CoreError::ProviderSubmitFailed(msg)) => {
                (StatusCode::BAD_GATEWAY, json!({ "error": msg }))
            }
            ApiError::Core(CoreError::InvalidState(msg)) => {
                (StatusCode::CONFLICT, json!({ "error": msg }))
            }
            ApiError::Core(CoreError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, json!({ "error": msg }))
            }
            ApiError::Core(e @ CoreError::Storage(_))
            | ApiError::Core(e @ CoreError::Transport(_))
            | ApiError::Core(e @ CoreError::Internal(_))
            | ApiError::Core(e @ CoreError::ProviderPollError(_))
            | ApiError::Core(e @ CoreError::PollingTimeout)
            | ApiError::Core(e @ CoreError::RecipientBlocked) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": e.to_string() }))
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, json!({ "error": what })),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                json!({ "error": "not the owner of this resource" }),
            ),
        };
        (status, Json(body)).into_response()
    }
}
