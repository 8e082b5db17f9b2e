//! Broadcast Scheduler. Cohort resolution, rate-limited fan-out, and
//! atomic per-recipient progress tracking.

mod rate_limiter;

pub use rate_limiter::BroadcastRateLimiter;

use std::sync::Arc;

use tracing::warn;

use crate::chat::{ChatSendOutcome, ChatSender, SendOptions};
use crate::error::CoreError;
use crate::models::{Broadcast, BroadcastStatus, ContentType, FilterTag, InlineButton, RecipientStatus};
use crate::store::{BroadcastRepo, UserRepo};

#[derive(Clone)]
pub struct BroadcastScheduler {
    broadcasts: BroadcastRepo,
    users: UserRepo,
    chat: Arc<dyn ChatSender>,
    rate_limiter: Arc<BroadcastRateLimiter>,
}

impl BroadcastScheduler {
    pub fn new(
        broadcasts: BroadcastRepo,
        users: UserRepo,
        chat: Arc<dyn ChatSender>,
        rate_limiter: Arc<BroadcastRateLimiter>,
    ) -> Self {
        BroadcastScheduler {
            broadcasts,
            users,
            chat,
            rate_limiter,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        admin_telegram_id: i64,
        content_type: ContentType,
        text: Option<String>,
        media_file_id: Option<String>,
        button: Option<InlineButton>,
        filter_tag: FilterTag,
    ) -> Result<Broadcast, CoreError> {
        let cohort = self.users.telegram_ids_for_filter(filter_tag.as_str()).await?;
        self.broadcasts
            .create(
                admin_telegram_id,
                content_type,
                text,
                media_file_id,
                button,
                filter_tag,
                cohort.len() as i64,
            )
            .await
    }

    /// Re-resolves the cohort (deliberately: "the cohort snapshot is taken
    /// at start, not at create") and spawns one delivery task per recipient.
    pub async fn start(&self, broadcast_id: i64) -> Result<(), CoreError> {
        let broadcast = self
            .broadcasts
            .find(broadcast_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("broadcast {broadcast_id}")))?;
        if broadcast.status != BroadcastStatus::Pending {
            return Err(CoreError::InvalidState(
                "broadcast is not pending".to_string(),
            ));
        }

        let recipients = self
            .users
            .telegram_ids_for_filter(broadcast.filter_tag.as_str())
            .await?;
        self.broadcasts.seed_recipients(broadcast_id, recipients.clone()).await?;
        self.broadcasts.set_status(broadcast_id, BroadcastStatus::Running).await?;

        for telegram_id in recipients {
            let scheduler = self.clone();
            tokio::spawn(async move {
                if let Err(e) = scheduler.deliver_one(broadcast_id, telegram_id).await {
                    warn!(broadcast_id, telegram_id, error = %e, "broadcast delivery task failed");
                }
            });
        }
        Ok(())
    }

    pub async fn cancel(&self, broadcast_id: i64) -> Result<(), CoreError> {
        self.broadcasts
            .set_status(broadcast_id, BroadcastStatus::Cancelled)
            .await
    }

    /// Sends one message, bounded by the shared rate limiter, and records
    /// the outcome. Re-checks cancellation immediately before sending so an
    /// in-flight fan-out stops promptly after `cancel`.
    pub async fn deliver_one(&self, broadcast_id: i64, user_telegram_id: i64) -> Result<(), CoreError> {
        let broadcast = self
            .broadcasts
            .find(broadcast_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("broadcast {broadcast_id}")))?;
        if broadcast.status == BroadcastStatus::Cancelled {
            return Ok(());
        }

        self.rate_limiter.acquire().await;

        let outcome = self.send_content(&broadcast, user_telegram_id).await;
        let (status, error_message) = match outcome {
            ChatSendOutcome::Sent => (RecipientStatus::Sent, None),
            ChatSendOutcome::Blocked => (RecipientStatus::Blocked, None),
            ChatSendOutcome::Failed(msg) => (RecipientStatus::Failed, Some(msg)),
        };
        self.broadcasts
            .record_outcome(broadcast_id, user_telegram_id, status, error_message)
            .await?;

        if let Some(updated) = self.broadcasts.find(broadcast_id).await? {
            if updated.is_complete() && updated.status == BroadcastStatus::Running {
                self.broadcasts
                    .set_status(broadcast_id, BroadcastStatus::Completed)
                    .await?;
                self.notify_admin_summary(&updated).await;
            }
        }
        Ok(())
    }

    async fn send_content(&self, broadcast: &Broadcast, chat_id: i64) -> ChatSendOutcome {
        let opts = SendOptions {
            caption: broadcast.text.clone(),
            button: broadcast.button.clone(),
        };
        match broadcast.content_type {
            ContentType::Text => {
                self.chat
                    .send_message(chat_id, broadcast.text.as_deref().unwrap_or_default())
                    .await
            }
            ContentType::Photo => {
                self.chat
                    .send_photo(chat_id, broadcast.media_file_id.as_deref().unwrap_or_default(), &opts)
                    .await
            }
            ContentType::Video => {
                self.chat
                    .send_video(chat_id, broadcast.media_file_id.as_deref().unwrap_or_default(), &opts)
                    .await
            }
            ContentType::Document => {
                self.chat
                    .send_document(chat_id, broadcast.media_file_id.as_deref().unwrap_or_default(), &opts)
                    .await
            }
            ContentType::Animation => {
                self.chat
                    .send_animation(chat_id, broadcast.media_file_id.as_deref().unwrap_or_default(), &opts)
                    .await
            }
        }
    }

    async fn notify_admin_summary(&self, broadcast: &Broadcast) {
        let text = format!(
            "Broadcast #{} complete: {} sent, {} failed, {} blocked (of {}).",
            broadcast.id,
            broadcast.sent_count,
            broadcast.failed_count,
            broadcast.blocked_count,
            broadcast.total_users,
        );
        let _ = self.chat.send_message(broadcast.admin_telegram_id, &text).await;
    }
}
