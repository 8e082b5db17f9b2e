//! Submission Gateway. `Gateway::submit` runs the admission pipeline as a
//! sequence of private methods, one per step, each independently unit
//! testable.

mod dispatch;
mod locks;

use std::sync::Arc;

use rand::Rng;

use crate::chat::ChatSender;
use crate::error::CoreError;
use crate::ledger::Ledger;
use crate::models::{ChatCoords, GenerationParams, GenerationRequest, GenerationStatus};
use crate::money::Credits;
use crate::poller::PollerHandoff;
use crate::pricing;
use crate::provider_gate::ProviderGate;
use crate::store::{GenerationRepo, ModelRepo, UserRepo};

pub use dispatch::ProviderDispatchTable;
pub use locks::UserLockRegistry;

const MAX_REFERENCES: usize = 10;

pub struct GatewayConfig {
    pub max_parallel_per_user: i64,
    pub markup: Credits,
    pub admin_chat_ids: Vec<i64>,
}

pub struct Gateway {
    users: UserRepo,
    models: ModelRepo,
    generations: GenerationRepo,
    ledger: Ledger,
    provider_gate: Arc<ProviderGate>,
    dispatch: ProviderDispatchTable,
    user_locks: UserLockRegistry,
    poller: Arc<dyn PollerHandoff>,
    chat: Option<Arc<dyn ChatSender>>,
    config: GatewayConfig,
}

/// Everything the chat front-end supplied for one submission
/// (`POST /generations/submit` body).
pub struct SubmitInput {
    pub user_telegram_id: i64,
    pub model_key: String,
    pub prompt: String,
    pub params: GenerationParams,
    pub reference_urls: Vec<String>,
    pub reference_file_ids: Vec<Option<String>>,
    pub chat_coords: ChatCoords,
}

pub struct SubmitOutput {
    pub request: GenerationRequest,
    pub job_id: i64,
    pub upstream_job_id: String,
    pub trial_used: bool,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: UserRepo,
        models: ModelRepo,
        generations: GenerationRepo,
        ledger: Ledger,
        provider_gate: Arc<ProviderGate>,
        dispatch: ProviderDispatchTable,
        poller: Arc<dyn PollerHandoff>,
        chat: Option<Arc<dyn ChatSender>>,
        config: GatewayConfig,
    ) -> Self {
        Gateway {
            users,
            models,
            generations,
            ledger,
            provider_gate,
            dispatch,
            user_locks: UserLockRegistry::new(),
            poller,
            chat,
            config,
        }
    }

    pub async fn submit(&self, input: SubmitInput) -> Result<SubmitOutput, CoreError> {
        self.check_provider_gate().await?;

        let _guard = self.user_locks.lock(input.user_telegram_id).await;

        let user = self.materialize_user(input.user_telegram_id).await?;
        let model = self.resolve_model(&input.model_key).await?;
        let normalized = pricing::normalize_params(&model, &input.params);
        pricing::validate_params(&model, &normalized)?;
        let price = pricing::price_for(&self.models, &model, &normalized, self.config.markup).await?;
        self.check_reference_compatibility(&model, &input.reference_urls)?;
        self.admit_concurrency(user.telegram_id).await?;

        let request_id = uuid::Uuid::new_v4().to_string();
        let mut request = GenerationRequest {
            id: request_id.clone(),
            user_telegram_id: user.telegram_id,
            model_id: model.id,
            model_key: model.model_key.clone(),
            prompt: input.prompt.clone(),
            params: normalized,
            reference_count: input.reference_urls.len() as i32,
            cost: Credits::ZERO,
            status: GenerationStatus::Configuring,
            chat_coords: input.chat_coords,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.generations.insert(request.clone()).await?;
        for (i, url) in input.reference_urls.iter().enumerate() {
            let file_id = input.reference_file_ids.get(i).and_then(|f| f.as_deref());
            self.generations.add_reference(&request_id, url, file_id).await?;
        }

        let trial_used = self
            .apply_charge_policy(&mut request, price)
            .await?;

        let submit_result = self
            .submit_upstream(&model, &request, &input.reference_urls)
            .await;

        let outcome = match submit_result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.generations
                    .transition(&request_id, GenerationStatus::Failed)
                    .await?;
                if request.cost.is_positive() {
                    self.ledger
                        .refund_generation(user.telegram_id, &request_id, request.cost)
                        .await?;
                }
                if trial_used {
                    self.generations
                        .remove_trial_use(user.telegram_id, &request_id)
                        .await?;
                }
                return Err(e);
            }
        };

        let job = self
            .generations
            .insert_job(&request_id, &model.provider_name, &outcome.upstream_job_id)
            .await?;

        if !outcome.outputs.is_empty() {
            for url in &outcome.outputs {
                self.generations.add_result_if_new(&request_id, url, None).await?;
            }
            self.generations
                .transition(&request_id, GenerationStatus::Completed)
                .await?;
            self.generations
                .update_job_status(job.id, crate::models::JobStatus::Completed, None)
                .await?;
            request.status = GenerationStatus::Completed;
        } else {
            self.generations
                .transition(&request_id, GenerationStatus::Queued)
                .await?;
            request.status = GenerationStatus::Queued;
            self.poller.spawn(request_id.clone(), request.chat_coords.clone());
        }

        Ok(SubmitOutput {
            request,
            job_id: job.id,
            upstream_job_id: outcome.upstream_job_id,
            trial_used,
        })
    }

    async fn check_provider_gate(&self) -> Result<(), CoreError> {
        match self.provider_gate.check().await {
            Ok(()) => Ok(()),
            Err(e @ CoreError::ProviderBalanceLow { balance, threshold }) => {
                if self.provider_gate.should_alert().await {
                    self.alert_admins_balance_low(balance, threshold).await;
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn alert_admins_balance_low(&self, balance: i64, threshold: i64) {
        let Some(chat) = &self.chat else { return };
        let text = format!(
            "Upstream provider balance low: {balance} (threshold {threshold}). New generations are blocked."
        );
        for admin_chat_id in &self.config.admin_chat_ids {
            let _ = chat.send_message(*admin_chat_id, &text).await;
        }
    }

    async fn materialize_user(&self, telegram_id: i64) -> Result<crate::models::User, CoreError> {
        let existing = self.users.find_by_telegram_id(telegram_id).await?;
        let user = match existing {
            Some(user) => user,
            None => {
                self.users
                    .get_or_create(telegram_id, random_referral_code(), None)
                    .await?
            }
        };
        self.users.touch_last_active(telegram_id).await?;
        if user.is_banned {
            return Err(CoreError::Validation("user is banned".into()));
        }
        Ok(user)
    }

    async fn resolve_model(&self, model_key: &str) -> Result<crate::models::Model, CoreError> {
        self.models
            .find_by_key(model_key)
            .await?
            .ok_or_else(|| CoreError::ModelNotFound(model_key.to_string()))
    }

    fn check_reference_compatibility(
        &self,
        model: &crate::models::Model,
        reference_urls: &[String],
    ) -> Result<(), CoreError> {
        if reference_urls.len() > MAX_REFERENCES {
            return Err(CoreError::Validation(format!(
                "at most {MAX_REFERENCES} references allowed"
            )));
        }
        if reference_urls.is_empty() {
            if !model.supports_text_to_image {
                return Err(CoreError::Validation(
                    "model does not support text-to-image".into(),
                ));
            }
        } else if !model.supports_image_to_image {
            return Err(CoreError::Validation(
                "model does not support image-to-image".into(),
            ));
        }
        Ok(())
    }

    async fn admit_concurrency(&self, user_telegram_id: i64) -> Result<(), CoreError> {
        let active_count = self.generations.count_active_for_user(user_telegram_id).await?;
        if active_count >= self.config.max_parallel_per_user {
            return Err(CoreError::ActiveLimit {
                active_count,
                limit: self.config.max_parallel_per_user,
            });
        }
        Ok(())
    }

    /// Step 10: trial-or-charge. Returns whether the trial was consumed.
    async fn apply_charge_policy(
        &self,
        request: &mut GenerationRequest,
        price: Credits,
    ) -> Result<bool, CoreError> {
        let claimed_trial = self
            .generations
            .claim_trial_use(request.user_telegram_id, &request.id)
            .await?;
        if claimed_trial {
            request.cost = Credits::ZERO;
            return Ok(true);
        }

        let balance = self.ledger.balance(request.user_telegram_id).await?;
        if balance < price {
            self.generations
                .transition(&request.id, GenerationStatus::Failed)
                .await?;
            return Err(CoreError::InsufficientBalance);
        }
        self.ledger
            .charge_generation(request.user_telegram_id, &request.id, price)
            .await?;
        self.generations.set_cost(&request.id, price).await?;
        request.cost = price;
        Ok(false)
    }

    async fn submit_upstream(
        &self,
        model: &crate::models::Model,
        request: &GenerationRequest,
        reference_urls: &[String],
    ) -> Result<crate::provider::SubmitOutcome, CoreError> {
        self.dispatch
            .submit(&model.model_key, request.prompt.clone(), request.params.clone(), reference_urls.to_vec())
            .await
    }
}

/// Generates a short, shareable referral code. Collision handling is left to
/// the unique-constraint-free `referral_code` column: a collision simply
/// means two users share a code, which only matters for referral-bonus
/// attribution and is acceptable at this cardinality.
fn random_referral_code() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
