//! Status Poller. One independent task per active generation;
//! `tokio::spawn` + `tokio::time::sleep`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::chat::{ChatSender, SendOptions};
use crate::error::CoreError;
use crate::ledger::Ledger;
use crate::models::{ChatCoords, GenerationStatus, JobStatus};
use crate::provider::Provider;
use crate::store::GenerationRepo;

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub max_duration: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            poll_interval: Duration::from_secs(3),
            max_duration: Duration::from_secs(300),
        }
    }
}

pub struct PollerContext {
    pub generations: GenerationRepo,
    pub ledger: Ledger,
    pub provider: Arc<dyn Provider>,
    pub chat: Arc<dyn ChatSender>,
    pub config: PollerConfig,
}

/// Lets the Gateway (and the Reaper's respawn path, if any) enqueue a poller
/// without depending on [`PollerContext`]'s internals.
pub trait PollerHandoff: Send + Sync {
    fn spawn(&self, request_id: String, chat_coords: ChatCoords);
}

impl PollerHandoff for Arc<PollerContext> {
    fn spawn(&self, request_id: String, chat_coords: ChatCoords) {
        spawn_poller(Arc::clone(self), request_id, chat_coords);
    }
}

pub fn spawn_poller(
    ctx: Arc<PollerContext>,
    request_id: String,
    chat_coords: ChatCoords,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_poller(&ctx, &request_id, &chat_coords).await {
            warn!(request_id = %request_id, error = %e, "poller exited with error");
        }
    })
}

async fn run_poller(
    ctx: &PollerContext,
    request_id: &str,
    chat_coords: &ChatCoords,
) -> Result<(), CoreError> {
    let error_counter = AtomicU32::new(0);

    loop {
        tokio::time::sleep(ctx.config.poll_interval).await;
        match poll_once(ctx, request_id, chat_coords, &error_counter).await? {
            Some(request) if request.status.is_terminal() => return Ok(()),
            Some(_) => continue,
            None => return Ok(()),
        }
    }
}

/// Runs a single poll iteration: re-fetches the request, checks the deadline,
/// asks the provider for the current prediction status, and applies whatever
/// transition follows. Returns the request's post-iteration snapshot, or
/// `None` if the request no longer exists. Shared by the background poller
/// loop and the API's synchronous `/refresh` endpoint, so a manual refresh
/// and a scheduled tick behave identically. The deadline is
/// always measured from `created_at`, not from when this call happens, so a
/// manual refresh detects the same timeout a scheduled tick would.
async fn poll_once(
    ctx: &PollerContext,
    request_id: &str,
    chat_coords: &ChatCoords,
    error_counter: &AtomicU32,
) -> Result<Option<crate::models::GenerationRequest>, CoreError> {
    let request = match ctx.generations.find(request_id).await? {
        Some(r) => r,
        None => return Ok(None),
    };
    // Another poller (or the reaper) already finished this request, or a
    // manual refresh landed on an already-terminal one: both are a no-op.
    if request.status.is_terminal() {
        return Ok(Some(request));
    }

    let deadline = request.created_at
        + chrono::Duration::from_std(ctx.config.max_duration).unwrap_or_else(|_| chrono::Duration::seconds(300));
    if Utc::now() > deadline {
        fail_request(ctx, request_id, request.user_telegram_id, request.cost, "polling timeout")
            .await?;
        notify_timeout(ctx, chat_coords).await;
        return Ok(ctx.generations.find(request_id).await?);
    }

    let job = match ctx.generations.job_for_request(request_id).await? {
        Some(j) => j,
        None => return Ok(Some(request)),
    };

    let prediction = match ctx.provider.get_prediction(&job.upstream_job_id).await {
        Ok(p) => {
            error_counter.store(0, Ordering::SeqCst);
            p
        }
        Err(e) => {
            let count = error_counter.fetch_add(1, Ordering::SeqCst) + 1;
            if matches!(count, 3 | 6 | 10) {
                let _ = ctx
                    .chat
                    .send_message(
                        chat_coords.chat_id.unwrap_or_default(),
                        "Still working on your generation...",
                    )
                    .await;
            }
            info!(request_id, consecutive_errors = count, error = %e, "transient poll error");
            return Ok(Some(request));
        }
    };

    if prediction.status == "completed"
        || (prediction.status.is_empty() && !prediction.outputs.is_empty())
    {
        complete_request(ctx, &request, job.id, &prediction.outputs, chat_coords).await?;
        return Ok(ctx.generations.find(request_id).await?);
    }

    if prediction.status == "failed" {
        let message = prediction
            .error_message
            .unwrap_or_else(|| "Generation failed".to_string());
        ctx.generations
            .update_job_status(job.id, JobStatus::Failed, Some(message.clone()))
            .await?;
        fail_request(ctx, request_id, request.user_telegram_id, request.cost, &message).await?;
        notify_failure(ctx, chat_coords, &message, request.cost).await;
        return Ok(ctx.generations.find(request_id).await?);
    }

    if matches!(prediction.status.as_str(), "created" | "queued") {
        ctx.generations.transition(request_id, GenerationStatus::Queued).await?;
    } else {
        ctx.generations.transition(request_id, GenerationStatus::Running).await?;
    }
    Ok(ctx.generations.find(request_id).await?)
}

/// Runs one poll iteration immediately, with no sleep, for the UI-triggered
/// `/refresh` endpoint. A refresh on an already-terminal request is a no-op
/// that just returns the current snapshot.
pub async fn refresh_once(
    ctx: &PollerContext,
    request_id: &str,
) -> Result<Option<crate::models::GenerationRequest>, CoreError> {
    let Some(request) = ctx.generations.find(request_id).await? else {
        return Ok(None);
    };
    let error_counter = AtomicU32::new(0);
    poll_once(ctx, request_id, &request.chat_coords, &error_counter).await
}

async fn complete_request(
    ctx: &PollerContext,
    request: &crate::models::GenerationRequest,
    job_id: i64,
    outputs: &[String],
    chat_coords: &ChatCoords,
) -> Result<(), CoreError> {
    for url in outputs {
        ctx.generations.add_result_if_new(&request.id, url, None).await?;
    }
    ctx.generations
        .transition(&request.id, GenerationStatus::Completed)
        .await?;
    ctx.generations
        .update_job_status(job_id, JobStatus::Completed, None)
        .await?;

    let duration_secs = (Utc::now() - request.started_at.unwrap_or(request.created_at)).num_seconds();
    let caption = format!(
        "#{model}\nCost: {cost} credits\nDuration: {duration}s\n\n{prompt}",
        model = request.model_key,
        cost = request.cost,
        duration = duration_secs,
        prompt = request.prompt,
    );
    if let Some(chat_id) = chat_coords.chat_id {
        for url in outputs {
            let _ = ctx
                .chat
                .send_photo(
                    chat_id,
                    url,
                    &SendOptions {
                        caption: Some(caption.clone()),
                        button: None,
                    },
                )
                .await;
        }
    }
    Ok(())
}

async fn fail_request(
    ctx: &PollerContext,
    request_id: &str,
    user_telegram_id: i64,
    cost: crate::money::Credits,
    error_message: &str,
) -> Result<(), CoreError> {
    ctx.generations.transition(request_id, GenerationStatus::Failed).await?;
    if cost.is_positive() {
        ctx.ledger
            .refund_generation(user_telegram_id, request_id, cost)
            .await?;
    }
    ctx.generations.remove_trial_use(user_telegram_id, request_id).await?;
    info!(request_id, error_message, "generation failed");
    Ok(())
}

async fn notify_failure(
    ctx: &PollerContext,
    chat_coords: &ChatCoords,
    message: &str,
    cost: crate::money::Credits,
) {
    let Some(chat_id) = chat_coords.chat_id else { return };
    let text = if cost.is_positive() {
        format!("Generation failed: {message}\n{cost} credits were refunded.")
    } else {
        format!("Generation failed: {message}")
    };
    let _ = ctx.chat.send_message(chat_id, &text).await;
}

async fn notify_timeout(ctx: &PollerContext, chat_coords: &ChatCoords) {
    let Some(chat_id) = chat_coords.chat_id else { return };
    let _ = ctx
        .chat
        .send_message(chat_id, "Generation timed out. Your credits have been refunded.")
        .await;
}
