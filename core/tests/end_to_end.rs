//! End-to-end scenarios wired against a real temp-file SQLite database and
//! hand-rolled `Provider`/`ChatSender` test doubles, exercising the public
//! API rather than unit-testing internals.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use genhub_core::broadcast::{BroadcastRateLimiter, BroadcastScheduler};
use genhub_core::chat::{ChatSendOutcome, ChatSender, SendOptions};
use genhub_core::error::CoreError;
use genhub_core::gateway::{Gateway, GatewayConfig, ProviderDispatchTable};
use genhub_core::ledger::Ledger;
use genhub_core::models::{ContentType, EntryType, FilterTag, GenerationParams, GenerationStatus, Model};
use genhub_core::money::Credits;
use genhub_core::poller::{spawn_poller, PollerConfig, PollerContext};
use genhub_core::provider::{PredictionStatus, Provider, SubmitOutcome};
use genhub_core::store::{BroadcastRepo, Db, GenerationRepo, LedgerRepo, ModelRepo, UserRepo};

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

struct RecordingChatSender {
    messages: Mutex<Vec<(i64, String)>>,
}

impl RecordingChatSender {
    fn new() -> Self {
        RecordingChatSender {
            messages: Mutex::new(Vec::new()),
        }
    }

    async fn texts_for(&self, chat_id: i64) -> Vec<String> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatSender for RecordingChatSender {
    async fn send_message(&self, chat_id: i64, text: &str) -> ChatSendOutcome {
        self.messages.lock().await.push((chat_id, text.to_string()));
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

/// Scriptable provider: `submit_mode` controls what `submit_text_to_image`
/// returns, `prediction_sequence` what consecutive `get_prediction` calls
/// return (popped front-to-back, last entry repeats).
enum SubmitMode {
    Immediate(Vec<String>),
    Deferred,
    Failing(String),
}

struct ScriptedProvider {
    submit_mode: SubmitMode,
    predictions: Mutex<Vec<PredictionStatus>>,
    poll_calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(submit_mode: SubmitMode, predictions: Vec<PredictionStatus>) -> Self {
        ScriptedProvider {
            submit_mode,
            predictions: Mutex::new(predictions),
            poll_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn submit_text_to_image(
        &self,
        _model_key: &str,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<SubmitOutcome, CoreError> {
        match &self.submit_mode {
            SubmitMode::Immediate(outputs) => Ok(SubmitOutcome {
                upstream_job_id: "upstream-immediate".into(),
                outputs: outputs.clone(),
            }),
            SubmitMode::Deferred => Ok(SubmitOutcome {
                upstream_job_id: "upstream-deferred".into(),
                outputs: vec![],
            }),
            SubmitMode::Failing(msg) => Err(CoreError::ProviderSubmitFailed(msg.clone())),
        }
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
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let mut preds = self.predictions.lock().await;
        if preds.len() > 1 {
            Ok(preds.remove(0))
        } else {
            Ok(preds.first().cloned().unwrap_or(PredictionStatus {
                status: "running".into(),
                outputs: vec![],
                error_message: None,
            }))
        }
    }
    async fn get_balance(&self) -> Result<i64, CoreError> {
        Ok(1_000_000)
    }
}

impl Clone for PredictionStatus {
    fn clone(&self) -> Self {
        PredictionStatus {
            status: self.status.clone(),
            outputs: self.outputs.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

struct Harness {
    users: UserRepo,
    models: ModelRepo,
    generations: GenerationRepo,
    ledger: Ledger,
}

impl Harness {
    async fn new() -> Self {
        let db = Db::open_in_memory().unwrap();
        let users = UserRepo::new(db.clone());
        let models = ModelRepo::new(db.clone());
        let generations = GenerationRepo::new(db.clone());
        let ledger = Ledger::new(LedgerRepo::new(db.clone()));

        models.upsert(sample_model()).await.unwrap();
        let model = models.find_by_key("nano-banana-pro").await.unwrap().unwrap();
        models.insert_price(model.id, Credits(140)).await.unwrap();

        Harness {
            users,
            models,
            generations,
            ledger,
        }
    }

    /// Burns the user's one-time free trial against a throwaway request id,
    /// so a subsequent `Gateway::submit` exercises the charge/refund path
    /// instead of silently taking the trial.
    async fn seed_trial_use(&self, user_telegram_id: i64) {
        let claimed = self
            .generations
            .claim_trial_use(user_telegram_id, "seeded-trial")
            .await
            .unwrap();
        assert!(claimed, "trial already used for {user_telegram_id}");
    }

    fn gateway(
        &self,
        provider: Arc<dyn Provider>,
        poller: Arc<PollerContext>,
        chat: Arc<dyn ChatSender>,
        max_parallel_per_user: i64,
    ) -> Gateway {
        let provider_gate = Arc::new(genhub_core::provider_gate::ProviderGate::new(provider.clone(), 0));
        let mut dispatch = ProviderDispatchTable::new();
        dispatch.register("nano-banana-pro", provider);
        Gateway::new(
            self.users.clone(),
            self.models.clone(),
            self.generations.clone(),
            self.ledger.clone(),
            provider_gate,
            dispatch,
            poller,
            Some(chat),
            GatewayConfig {
                max_parallel_per_user,
                markup: Credits::ZERO,
                admin_chat_ids: vec![],
            },
        )
    }
}

async fn wait_until_terminal(generations: &GenerationRepo, request_id: &str, timeout: Duration) {
    tokio::time::timeout(timeout, async {
        loop {
            let request = generations.find(request_id).await.unwrap().unwrap();
            if request.status.is_terminal() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("request never reached a terminal state");
}

/// Scenario 1: balance 500, price 140, submit, poller runs, upstream
/// eventually completes: balance ends at 360, one result persisted.
#[tokio::test]
async fn scenario_1_successful_paid_generation() {
    let h = Harness::new().await;
    h.ledger
        .post(1, Credits(500), EntryType::Deposit, "dep-1", None)
        .await
        .unwrap();
    h.seed_trial_use(1).await;

    let provider: Arc<dyn Provider> = Arc::new(ScriptedProvider::new(
        SubmitMode::Deferred,
        vec![
            PredictionStatus {
                status: "queued".into(),
                outputs: vec![],
                error_message: None,
            },
            PredictionStatus {
                status: "completed".into(),
                outputs: vec!["https://a/1.png".into()],
                error_message: None,
            },
        ],
    ));
    let chat: Arc<dyn ChatSender> = Arc::new(RecordingChatSender::new());
    let poller = Arc::new(PollerContext {
        generations: h.generations.clone(),
        ledger: h.ledger.clone(),
        provider: provider.clone(),
        chat: chat.clone(),
        config: PollerConfig {
            poll_interval: Duration::from_millis(20),
            max_duration: Duration::from_secs(10),
        },
    });
    let gateway = h.gateway(provider, poller, chat, 10);

    let out = gateway
        .submit(genhub_core::gateway::SubmitInput {
            user_telegram_id: 1,
            model_key: "nano-banana-pro".into(),
            prompt: "a cat".into(),
            params: GenerationParams::default(),
            reference_urls: vec![],
            reference_file_ids: vec![],
            chat_coords: Default::default(),
        })
        .await
        .unwrap();
    assert!(!out.trial_used);
    assert_eq!(out.request.status, GenerationStatus::Queued);

    wait_until_terminal(&h.generations, &out.request.id, Duration::from_secs(2)).await;

    let reloaded = h.generations.find(&out.request.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, GenerationStatus::Completed);
    assert_eq!(h.ledger.balance(1).await.unwrap(), Credits(360));
    let results = h.generations.results(&out.request.id).await.unwrap();
    assert_eq!(results.len(), 1);
}

/// Scenario 2: fresh user with no balance gets a free trial on the first
/// submission, then a 402-equivalent `InsufficientBalance` on the second.
#[tokio::test]
async fn scenario_2_trial_consumption_then_insufficient_balance() {
    let h = Harness::new().await;
    let provider: Arc<dyn Provider> = Arc::new(ScriptedProvider::new(
        SubmitMode::Immediate(vec!["https://a/1.png".into()]),
        vec![],
    ));
    let chat: Arc<dyn ChatSender> = Arc::new(RecordingChatSender::new());
    let poller = Arc::new(PollerContext {
        generations: h.generations.clone(),
        ledger: h.ledger.clone(),
        provider: provider.clone(),
        chat: chat.clone(),
        config: PollerConfig::default(),
    });
    let gateway = h.gateway(provider, poller, chat, 10);

    let input = || genhub_core::gateway::SubmitInput {
        user_telegram_id: 2,
        model_key: "nano-banana-pro".into(),
        prompt: "a cat".into(),
        params: GenerationParams::default(),
        reference_urls: vec![],
        reference_file_ids: vec![],
        chat_coords: Default::default(),
    };

    let first = gateway.submit(input()).await.unwrap();
    assert!(first.trial_used);
    assert_eq!(first.request.cost, Credits::ZERO);
    assert_eq!(h.ledger.balance(2).await.unwrap(), Credits::ZERO);

    let second = gateway.submit(input()).await;
    assert!(matches!(second, Err(CoreError::InsufficientBalance)));
}

/// Scenario 3: upstream rejects the submit outright; the charge is rolled
/// back and the request ends `failed` with balance restored.
#[tokio::test]
async fn scenario_3_upstream_failure_is_compensated() {
    let h = Harness::new().await;
    h.ledger
        .post(3, Credits(500), EntryType::Deposit, "dep-3", None)
        .await
        .unwrap();
    h.seed_trial_use(3).await;

    let provider: Arc<dyn Provider> =
        Arc::new(ScriptedProvider::new(SubmitMode::Failing("rate limited".into()), vec![]));
    let chat: Arc<dyn ChatSender> = Arc::new(RecordingChatSender::new());
    let poller = Arc::new(PollerContext {
        generations: h.generations.clone(),
        ledger: h.ledger.clone(),
        provider: provider.clone(),
        chat: chat.clone(),
        config: PollerConfig::default(),
    });
    let gateway = h.gateway(provider, poller, chat, 10);

    let err = gateway
        .submit(genhub_core::gateway::SubmitInput {
            user_telegram_id: 3,
            model_key: "nano-banana-pro".into(),
            prompt: "a cat".into(),
            params: GenerationParams::default(),
            reference_urls: vec![],
            reference_file_ids: vec![],
            chat_coords: Default::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ProviderSubmitFailed(_)));
    assert_eq!(h.ledger.balance(3).await.unwrap(), Credits(500));
}

/// Scenario 4: upstream never reaches a terminal state before the poller's
/// deadline; the request fails with "polling timeout" and the user is
/// notified.
#[tokio::test]
async fn scenario_4_polling_timeout_refunds_and_notifies() {
    let h = Harness::new().await;
    h.ledger
        .post(4, Credits(500), EntryType::Deposit, "dep-4", None)
        .await
        .unwrap();
    h.seed_trial_use(4).await;

    let provider: Arc<dyn Provider> = Arc::new(ScriptedProvider::new(
        SubmitMode::Deferred,
        vec![PredictionStatus {
            status: "running".into(),
            outputs: vec![],
            error_message: None,
        }],
    ));
    let chat = Arc::new(RecordingChatSender::new());
    let chat_dyn: Arc<dyn ChatSender> = chat.clone();
    let poller = Arc::new(PollerContext {
        generations: h.generations.clone(),
        ledger: h.ledger.clone(),
        provider: provider.clone(),
        chat: chat_dyn.clone(),
        config: PollerConfig {
            poll_interval: Duration::from_millis(10),
            max_duration: Duration::from_millis(30),
        },
    });
    let gateway = h.gateway(provider, poller, chat_dyn, 10);

    let out = gateway
        .submit(genhub_core::gateway::SubmitInput {
            user_telegram_id: 4,
            model_key: "nano-banana-pro".into(),
            prompt: "a cat".into(),
            params: GenerationParams::default(),
            reference_urls: vec![],
            reference_file_ids: vec![],
            chat_coords: genhub_core::models::ChatCoords {
                chat_id: Some(4),
                message_id: None,
                prompt_message_id: None,
                language: None,
            },
        })
        .await
        .unwrap();

    wait_until_terminal(&h.generations, &out.request.id, Duration::from_secs(2)).await;

    let reloaded = h.generations.find(&out.request.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, GenerationStatus::Failed);
    assert_eq!(h.ledger.balance(4).await.unwrap(), Credits(500));
    assert!(!chat.texts_for(4).await.is_empty());
}

/// Scenario 5: at `max_parallel = 2` with both slots running, a third
/// submission is rejected without touching the ledger or creating a row.
#[tokio::test]
async fn scenario_5_active_limit_rejection() {
    let h = Harness::new().await;
    h.ledger
        .post(5, Credits(500), EntryType::Deposit, "dep-5", None)
        .await
        .unwrap();

    let provider: Arc<dyn Provider> = Arc::new(ScriptedProvider::new(SubmitMode::Deferred, vec![]));
    let chat: Arc<dyn ChatSender> = Arc::new(RecordingChatSender::new());
    let poller = Arc::new(PollerContext {
        generations: h.generations.clone(),
        ledger: h.ledger.clone(),
        provider: provider.clone(),
        chat: chat.clone(),
        config: PollerConfig {
            poll_interval: Duration::from_secs(3600),
            max_duration: Duration::from_secs(300),
        },
    });
    let gateway = h.gateway(provider, poller, chat, 2);

    let input = || genhub_core::gateway::SubmitInput {
        user_telegram_id: 5,
        model_key: "nano-banana-pro".into(),
        prompt: "a cat".into(),
        params: GenerationParams::default(),
        reference_urls: vec![],
        reference_file_ids: vec![],
        chat_coords: Default::default(),
    };

    let first = gateway.submit(input()).await.unwrap();
    let second = gateway.submit(input()).await.unwrap();
    h.generations
        .transition(&first.request.id, GenerationStatus::Running)
        .await
        .unwrap();
    h.generations
        .transition(&second.request.id, GenerationStatus::Running)
        .await
        .unwrap();

    let balance_before = h.ledger.balance(5).await.unwrap();
    let third = gateway.submit(input()).await;
    assert!(matches!(
        third,
        Err(CoreError::ActiveLimit { active_count: 2, limit: 2 })
    ));
    assert_eq!(h.ledger.balance(5).await.unwrap(), balance_before);
}

/// Scenario 6: a broadcast to 3 recipients, cancelled after 2 deliveries,
/// stops sending to the third and ends `cancelled`.
#[tokio::test]
async fn scenario_6_broadcast_completion_and_cancellation() {
    let db = Db::open_in_memory().unwrap();
    let users = UserRepo::new(db.clone());
    let broadcast_repo = BroadcastRepo::new(db.clone());
    for telegram_id in [10, 11, 12] {
        users.get_or_create(telegram_id, format!("ref-{telegram_id}"), None).await.unwrap();
    }

    let chat: Arc<dyn ChatSender> = Arc::new(RecordingChatSender::new());
    let rate_limiter = Arc::new(BroadcastRateLimiter::new(100));
    let scheduler = BroadcastScheduler::new(broadcast_repo.clone(), users.clone(), chat.clone(), rate_limiter);

    let broadcast = scheduler
        .create(1, ContentType::Text, Some("hello all".into()), None, None, FilterTag::All)
        .await
        .unwrap();
    assert_eq!(broadcast.total_users, 3);

    scheduler.start(broadcast.id).await.unwrap();
    let recipients = users.telegram_ids_for_filter("all").await.unwrap();
    scheduler.deliver_one(broadcast.id, recipients[0]).await.unwrap();
    scheduler.deliver_one(broadcast.id, recipients[1]).await.unwrap();

    scheduler.cancel(broadcast.id).await.unwrap();
    scheduler.deliver_one(broadcast.id, recipients[2]).await.unwrap();

    let reloaded = broadcast_repo.find(broadcast.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, genhub_core::models::BroadcastStatus::Cancelled);
    assert!(reloaded.sent_count + reloaded.failed_count + reloaded.blocked_count <= 3);
    assert!(reloaded.completed_at.is_some());
}

/// Two parallel submissions from one user starting at `active_count =
/// limit - 1` yield exactly one success and one active-limit rejection,
/// never two successes, even under repetition.
#[tokio::test]
async fn c1_concurrent_submissions_never_double_admit() {
    let h = Harness::new().await;
    h.ledger
        .post(6, Credits(10_000), EntryType::Deposit, "dep-6", None)
        .await
        .unwrap();

    let provider: Arc<dyn Provider> = Arc::new(ScriptedProvider::new(SubmitMode::Deferred, vec![]));
    let chat: Arc<dyn ChatSender> = Arc::new(RecordingChatSender::new());
    let poller = Arc::new(PollerContext {
        generations: h.generations.clone(),
        ledger: h.ledger.clone(),
        provider: provider.clone(),
        chat: chat.clone(),
        config: PollerConfig {
            poll_interval: Duration::from_secs(3600),
            max_duration: Duration::from_secs(300),
        },
    });
    let gateway = Arc::new(h.gateway(provider, poller, chat, 1));

    let input = || genhub_core::gateway::SubmitInput {
        user_telegram_id: 6,
        model_key: "nano-banana-pro".into(),
        prompt: "a cat".into(),
        params: GenerationParams::default(),
        reference_urls: vec![],
        reference_file_ids: vec![],
        chat_coords: Default::default(),
    };

    let g1 = gateway.clone();
    let g2 = gateway.clone();
    let (r1, r2) = tokio::join!(g1.submit(input()), g2.submit(input()));
    let successes = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
    let rejections = [&r1, &r2]
        .iter()
        .filter(|r| matches!(r, Err(CoreError::ActiveLimit { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(rejections, 1);
}

/// Exercises `spawn_poller`/`PollerHandoff` directly (rather than only
/// through `Gateway::submit`), grounding the background-task entry point
/// the reaper and gateway both rely on.
#[tokio::test]
async fn spawn_poller_drives_a_queued_request_to_completion() {
    let h = Harness::new().await;
    let provider: Arc<dyn Provider> = Arc::new(ScriptedProvider::new(
        SubmitMode::Deferred,
        vec![PredictionStatus {
            status: "completed".into(),
            outputs: vec!["https://a/1.png".into()],
            error_message: None,
        }],
    ));
    let chat: Arc<dyn ChatSender> = Arc::new(RecordingChatSender::new());
    let poller = Arc::new(PollerContext {
        generations: h.generations.clone(),
        ledger: h.ledger.clone(),
        provider: provider.clone(),
        chat,
        config: PollerConfig {
            poll_interval: Duration::from_millis(10),
            max_duration: Duration::from_secs(10),
        },
    });

    let request = genhub_core::models::GenerationRequest {
        id: "poller-direct-1".into(),
        user_telegram_id: 7,
        model_id: 1,
        model_key: "nano-banana-pro".into(),
        prompt: "a cat".into(),
        params: GenerationParams::default(),
        reference_count: 0,
        cost: Credits::ZERO,
        status: GenerationStatus::Queued,
        chat_coords: Default::default(),
        created_at: chrono::Utc::now(),
        started_at: None,
        completed_at: None,
    };
    h.generations.insert(request.clone()).await.unwrap();
    h.generations
        .insert_job(&request.id, "wavespeed", "upstream-direct-1")
        .await
        .unwrap();

    spawn_poller(poller, request.id.clone(), request.chat_coords.clone());
    wait_until_terminal(&h.generations, &request.id, Duration::from_secs(2)).await;

    let reloaded = h.generations.find(&request.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, GenerationStatus::Completed);
}
