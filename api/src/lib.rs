//! HTTP surface for the generation orchestration core:
//! `Router::new().route(...).with_state(state)` over a shared `Arc<AppState>`.
//!
//! Authentication (HMAC internal API key + user-id header, or `initData`) is
//! explicitly out of scope here; it is the caller binary's job to wire an
//! `axum::middleware` layer in front of this router before exposing it.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generations/submit", post(handlers::generations::submit))
        .route("/generations/active", get(handlers::generations::active))
        .route("/generations/:id", get(handlers::generations::get_by_id))
        .route("/generations/:id/refresh", post(handlers::generations::refresh))
        .route("/generations/:id/results", get(handlers::generations::results))
        .route(
            "/admin/broadcasts",
            post(handlers::broadcasts::create).get(handlers::broadcasts::list),
        )
        .route("/admin/broadcasts/:id", get(handlers::broadcasts::get_by_id))
        .route("/admin/broadcasts/:id/start", post(handlers::broadcasts::start))
        .route("/admin/broadcasts/:id/cancel", post(handlers::broadcasts::cancel))
        .route("/admin/credits", post(handlers::credits::adjust))
        .with_state(state)
}
