//! End-to-end tests for the generations endpoints, driven through the axum
//! router with `tower::ServiceExt::oneshot`. Covers scenario 2 (trial
//! consumption then insufficient balance) and scenario 5 (active-limit
//! rejection).

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use genhub_core::broadcast::{BroadcastRateLimiter, BroadcastScheduler};
use genhub_core::chat::{ChatSendOutcome, ChatSender, SendOptions};
use genhub_core::error::CoreError;
use genhub_core::gateway::{Gateway, GatewayConfig, ProviderDispatchTable};
use genhub_core::ledger::Ledger;
use genhub_core::models::{GenerationParams, Model};
use genhub_core::money::Credits;
use genhub_core::poller::{PollerConfig, PollerContext};
use genhub_core::provider::{PredictionStatus, Provider, SubmitOutcome};
use genhub_core::store::{BroadcastRepo, Db, GenerationRepo, LedgerRepo, ModelRepo, UserRepo};

use api::state::AppState;

struct SilentChatSender;

#[async_trait]
impl ChatSender for SilentChatSender {
    async fn send_message(&self, _chat_id: i64, _text: &str) -> ChatSendOutcome {
        ChatSendOutcome::Sent
    }
    async fn send_photo(&self, _chat_id: i64, _u: &str, _o: &SendOptions) -> ChatSendOutcome {
        ChatSendOutcome::Sent
    }
    async fn send_document(&self, _chat_id: i64, _u: &str, _o: &SendOptions) -> ChatSendOutcome {
        ChatSendOutcome::Sent
    }
    async fn send_video(&self, _chat_id: i64, _u: &str, _o: &SendOptions) -> ChatSendOutcome {
        ChatSendOutcome::Sent
    }
    async fn send_animation(&self, _chat_id: i64, _u: &str, _o: &SendOptions) -> ChatSendOutcome {
        ChatSendOutcome::Sent
    }
    async fn edit_message_text(&self, _chat_id: i64, _m: i64, _t: &str) -> ChatSendOutcome {
        ChatSendOutcome::Sent
    }
    async fn delete_message(&self, _chat_id: i64, _m: i64) -> ChatSendOutcome {
        ChatSendOutcome::Sent
    }
    async fn send_invoice(&self, _chat_id: i64, _t: &str, _d: &str, _a: i64) -> ChatSendOutcome {
        ChatSendOutcome::Sent
    }
}

/// Always reports outputs synchronously, so `submit` never reaches for the
/// poller: keeps these tests independent of background task scheduling.
struct InstantProvider;

#[async_trait]
impl Provider for InstantProvider {
    async fn submit_text_to_image(
        &self,
        _model_key: &str,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<SubmitOutcome, CoreError> {
        Ok(SubmitOutcome {
            upstream_job_id: "upstream-1".into(),
            outputs: vec!["https://example/out.png".into()],
        })
    }
    async fn submit_image_to_image(
        &self,
        _model_key: &str,
        _prompt: &str,
        _params: &GenerationParams,
        _refs: &[String],
    ) -> Result<SubmitOutcome, CoreError> {
        unimplemented!()
    }
    async fn get_prediction(&self, _upstream_job_id: &str) -> Result<PredictionStatus, CoreError> {
        unimplemented!()
    }
    async fn get_balance(&self) -> Result<i64, CoreError> {
        Ok(1_000_000)
    }
}

fn sample_model() -> Model {
    Model {
        id: 0,
        model_key: "nano-banana-pro".into(),
        display_name: "Nano Banana Pro".into(),
        provider_name: "wavespeed".into(),
        supports_text_to_image: true,
        supports_image_to_image: true,
        supports_aspect_ratio: true,
        supports_size: false,
        supports_resolution: false,
        supports_quality: false,
        supports_reference: true,
        size_options: vec![],
        aspect_ratio_options: vec!["1:1".into()],
        resolution_options: vec![],
        quality_options: vec![],
        input_fidelity_options: vec![],
        is_active: true,
    }
}

async fn build_state(max_parallel_per_user: i64) -> Arc<AppState> {
    let db = Db::open_in_memory().unwrap();
    let users = UserRepo::new(db.clone());
    let models = ModelRepo::new(db.clone());
    let generations = GenerationRepo::new(db.clone());
    let ledger = Ledger::new(LedgerRepo::new(db.clone()));
    let broadcast_repo = BroadcastRepo::new(db.clone());

    models.upsert(sample_model()).await.unwrap();
    let model = models.find_by_key("nano-banana-pro").await.unwrap().unwrap();
    models.insert_price(model.id, Credits(140)).await.unwrap();

    let provider: Arc<dyn Provider> = Arc::new(InstantProvider);
    let provider_gate = Arc::new(genhub_core::provider_gate::ProviderGate::new(provider.clone(), 0));

    let mut dispatch = ProviderDispatchTable::new();
    dispatch.register("nano-banana-pro", provider.clone());

    let chat: Arc<dyn ChatSender> = Arc::new(SilentChatSender);

    let poller = Arc::new(PollerContext {
        generations: generations.clone(),
        ledger: ledger.clone(),
        provider: provider.clone(),
        chat: chat.clone(),
        config: PollerConfig {
            poll_interval: std::time::Duration::from_secs(3600),
            max_duration: std::time::Duration::from_secs(300),
        },
    });

    let gateway = Arc::new(Gateway::new(
        users.clone(),
        models,
        generations.clone(),
        ledger.clone(),
        provider_gate,
        dispatch,
        poller.clone(),
        Some(chat.clone()),
        GatewayConfig {
            max_parallel_per_user,
            markup: Credits::ZERO,
            admin_chat_ids: vec![],
        },
    ));

    let rate_limiter = Arc::new(BroadcastRateLimiter::new(20));
    let broadcasts = Arc::new(BroadcastScheduler::new(
        broadcast_repo.clone(),
        users.clone(),
        chat.clone(),
        rate_limiter,
    ));

    Arc::new(AppState {
        gateway,
        ledger,
        broadcasts,
        broadcast_repo,
        generations,
        users,
        poller,
    })
}

fn submit_body(telegram_id: i64) -> Body {
    Body::from(
        json!({
            "telegram_id": telegram_id,
            "model_id": "nano-banana-pro",
            "prompt": "a cat astronaut",
        })
        .to_string(),
    )
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Scenario 2: the user's first submission consumes the free trial (cost
/// zero, no ledger debit); the second submission, with no balance on the
/// ledger, is rejected as insufficient.
#[tokio::test]
async fn first_submission_is_free_then_second_is_rejected_for_insufficient_balance() {
    let state = build_state(10).await;
    let router = api::router(state.clone());

    let first = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/generations/submit")
                .header("content-type", "application/json")
                .body(submit_body(111))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = json_body(first).await;
    assert_eq!(first_body["trial_used"], json!(true));
    assert_eq!(first_body["cost"], json!(0));
    assert_eq!(state.ledger.balance(111).await.unwrap(), Credits::ZERO);

    let second = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/generations/submit")
                .header("content-type", "application/json")
                .body(submit_body(111))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::PAYMENT_REQUIRED);
}

/// Scenario 5: once a user has `max_parallel_per_user` active requests, the
/// next submission is rejected with 409 and `{active_count, limit}`.
#[tokio::test]
async fn submission_beyond_active_limit_is_rejected_with_409() {
    let state = build_state(1).await;
    let router = api::router(state.clone());
    let first = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/generations/submit")
                .header("content-type", "application/json")
                .body(submit_body(222))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = json_body(first).await;
    let request_id = first_body["id"].as_str().unwrap().to_string();
    state
        .generations
        .transition(&request_id, genhub_core::models::GenerationStatus::Running)
        .await
        .unwrap();

    let second = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/generations/submit")
                .header("content-type", "application/json")
                .body(submit_body(222))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = json_body(second).await;
    assert_eq!(body["active_count"], json!(1));
    assert_eq!(body["limit"], json!(1));
}

/// `GET /generations/:id` enforces ownership: a different telegram id than
/// the request's owner gets 403, not the record.
#[tokio::test]
async fn get_by_id_rejects_non_owner() {
    let state = build_state(10).await;
    let router = api::router(state.clone());
    let submit = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/generations/submit")
                .header("content-type", "application/json")
                .body(submit_body(333))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(submit).await;
    let request_id = body["id"].as_str().unwrap().to_string();

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/generations/{request_id}?telegram_id=999"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
