//! Chat-platform send contract. Defined here, with no `teloxide` dependency,
//! so the Gateway, Poller, and Broadcast Scheduler can depend on the trait
//! alone; only the `telegram-bot` binary implements it.

use async_trait::async_trait;

use crate::models::InlineButton;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatSendOutcome {
    Sent,
    Blocked,
    Failed(String),
}

/// HTTP 403, or a description containing "blocked"/"deactivated", maps to
/// [`ChatSendOutcome::Blocked`]; every other failure is
/// [`ChatSendOutcome::Failed`]. Implementations call this from their own
/// error paths rather than reimplementing the mapping.
pub fn classify_send_error(status: Option<u16>, description: &str) -> ChatSendOutcome {
    let lowered = description.to_ascii_lowercase();
    if status == Some(403) || lowered.contains("blocked") || lowered.contains("deactivated") {
        ChatSendOutcome::Blocked
    } else {
        ChatSendOutcome::Failed(description.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub caption: Option<String>,
    pub button: Option<InlineButton>,
}

#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> ChatSendOutcome;

    async fn send_photo(&self, chat_id: i64, url_or_file_id: &str, opts: &SendOptions) -> ChatSendOutcome;

    async fn send_document(&self, chat_id: i64, url_or_file_id: &str, opts: &SendOptions) -> ChatSendOutcome;

    async fn send_video(&self, chat_id: i64, url_or_file_id: &str, opts: &SendOptions) -> ChatSendOutcome;

    async fn send_animation(&self, chat_id: i64, url_or_file_id: &str, opts: &SendOptions) -> ChatSendOutcome;

    async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> ChatSendOutcome;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> ChatSendOutcome;

    async fn send_invoice(&self, chat_id: i64, title: &str, description: &str, amount: i64) -> ChatSendOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_403_classifies_as_blocked() {
        assert_eq!(classify_send_error(Some(403), "Forbidden"), ChatSendOutcome::Blocked);
    }

    #[test]
    fn deactivated_description_classifies_as_blocked() {
        assert_eq!(
            classify_send_error(None, "Bot was deactivated by the user"),
            ChatSendOutcome::Blocked
        );
    }

    #[test]
    fn other_errors_classify_as_failed() {
        assert_eq!(
            classify_send_error(Some(500), "Internal Server Error"),
            ChatSendOutcome::Failed("Internal Server Error".into())
        );
    }
}
