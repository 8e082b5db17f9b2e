//! `ChatSender` over a `teloxide::Bot`. The only place `teloxide` becomes a
//! dependency, keeping `core` free of any chat-platform SDK.

use async_trait::async_trait;
use teloxide::payloads::{SendAnimationSetters, SendDocumentSetters, SendPhotoSetters, SendVideoSetters};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId};
use teloxide::RequestError;

use genhub_core::chat::{classify_send_error, ChatSendOutcome, ChatSender, SendOptions};

pub struct TeloxideChatSender {
    bot: Bot,
}

impl TeloxideChatSender {
    pub fn new(bot: Bot) -> Self {
        TeloxideChatSender { bot }
    }
}

fn input_file(url_or_file_id: &str) -> InputFile {
    match reqwest::Url::parse(url_or_file_id) {
        Ok(url) => InputFile::url(url),
        Err(_) => InputFile::file_id(url_or_file_id),
    }
}

fn keyboard(button: &genhub_core::models::InlineButton) -> Option<InlineKeyboardMarkup> {
    let url = reqwest::Url::parse(&button.url).ok()?;
    Some(InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(
        button.text.clone(),
        url,
    )]]))
}

/// Telegram's "bot was blocked"/"user is deactivated" failures map to
/// [`ChatSendOutcome::Blocked`] directly; everything else falls through to
/// the shared text heuristic.
fn outcome_from_error(err: RequestError) -> ChatSendOutcome {
    match &err {
        RequestError::Api(teloxide::ApiError::BotBlocked)
        | RequestError::Api(teloxide::ApiError::UserDeactivated) => ChatSendOutcome::Blocked,
        _ => classify_send_error(None, &err.to_string()),
    }
}

#[async_trait]
impl ChatSender for TeloxideChatSender {
    async fn send_message(&self, chat_id: i64, text: &str) -> ChatSendOutcome {
        match self.bot.send_message(ChatId(chat_id), text).await {
            Ok(_) => ChatSendOutcome::Sent,
            Err(e) => outcome_from_error(e),
        }
    }

    async fn send_photo(&self, chat_id: i64, url_or_file_id: &str, opts: &SendOptions) -> ChatSendOutcome {
        let mut req = self.bot.send_photo(ChatId(chat_id), input_file(url_or_file_id));
        if let Some(caption) = &opts.caption {
            req = req.caption(caption.clone());
        }
        if let Some(button) = opts.button.as_ref().and_then(keyboard) {
            req = req.reply_markup(button);
        }
        match req.await {
            Ok(_) => ChatSendOutcome::Sent,
            Err(e) => outcome_from_error(e),
        }
    }

    async fn send_document(&self, chat_id: i64, url_or_file_id: &str, opts: &SendOptions) -> ChatSendOutcome {
        let mut req = self.bot.send_document(ChatId(chat_id), input_file(url_or_file_id));
        if let Some(caption) = &opts.caption {
            req = req.caption(caption.clone());
        }
        if let Some(button) = opts.button.as_ref().and_then(keyboard) {
            req = req.reply_markup(button);
        }
        match req.await {
            Ok(_) => ChatSendOutcome::Sent,
            Err(e) => outcome_from_error(e),
        }
    }

    async fn send_video(&self, chat_id: i64, url_or_file_id: &str, opts: &SendOptions) -> ChatSendOutcome {
        let mut req = self.bot.send_video(ChatId(chat_id), input_file(url_or_file_id));
        if let Some(caption) = &opts.caption {
            req = req.caption(caption.clone());
        }
        if let Some(button) = opts.button.as_ref().and_then(keyboard) {
            req = req.reply_markup(button);
        }
        match req.await {
            Ok(_) => ChatSendOutcome::Sent,
            Err(e) => outcome_from_error(e),
        }
    }

    async fn send_animation(&self, chat_id: i64, url_or_file_id: &str, opts: &SendOptions) -> ChatSendOutcome {
        let mut req = self.bot.send_animation(ChatId(chat_id), input_file(url_or_file_id));
        if let Some(caption) = &opts.caption {
            req = req.caption(caption.clone());
        }
        if let Some(button) = opts.button.as_ref().and_then(keyboard) {
            req = req.reply_markup(button);
        }
        match req.await {
            Ok(_) => ChatSendOutcome::Sent,
            Err(e) => outcome_from_error(e),
        }
    }

    async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> ChatSendOutcome {
        match self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id as i32), text)
            .await
        {
            Ok(_) => ChatSendOutcome::Sent,
            Err(e) => outcome_from_error(e),
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> ChatSendOutcome {
        match self
            .bot
            .delete_message(ChatId(chat_id), MessageId(message_id as i32))
            .await
        {
            Ok(_) => ChatSendOutcome::Sent,
            Err(e) => outcome_from_error(e),
        }
    }

    /// Payment intake is out of scope for this service, so this never
    /// calls out to Telegram.
    async fn send_invoice(&self, _chat_id: i64, _title: &str, _description: &str, _amount: i64) -> ChatSendOutcome {
        ChatSendOutcome::Failed("invoice delivery is out of scope".to_string())
    }
}
