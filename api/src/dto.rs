//! Request/response bodies for the submission, broadcast, and ledger APIs.
//! Plain `serde` structs, no validation beyond shape — field validation is
//! the gateway's job.

use genhub_core::models::{
    Broadcast, ContentType, FilterTag, GenerationParams, GenerationRequest, InlineButton,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub telegram_id: i64,
    #[serde(rename = "model_id")]
    pub model_key: String,
    pub prompt: String,
    pub size: Option<String>,
    pub aspect_ratio: Option<String>,
    pub resolution: Option<String>,
    pub quality: Option<String>,
    pub input_fidelity: Option<String>,
    #[serde(default)]
    pub reference_urls: Vec<String>,
    #[serde(default)]
    pub reference_file_ids: Vec<Option<String>>,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub prompt_message_id: Option<i64>,
    pub language: Option<String>,
}

impl SubmitRequest {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            size: self.size.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
            resolution: self.resolution.clone(),
            quality: self.quality.clone(),
            input_fidelity: self.input_fidelity.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    #[serde(flatten)]
    pub request: GenerationRequest,
    pub job_id: i64,
    pub upstream_job_id: String,
    pub trial_used: bool,
}

#[derive(Debug, Deserialize)]
pub struct TelegramIdQuery {
    pub telegram_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub telegram_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBroadcastRequest {
    pub admin_telegram_id: i64,
    pub content_type: ContentType,
    pub text: Option<String>,
    pub media_file_id: Option<String>,
    pub button: Option<InlineButton>,
    pub filter_tag: FilterTag,
}

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    #[serde(flatten)]
    pub broadcast: Broadcast,
}

#[derive(Debug, Deserialize)]
pub struct ListBroadcastsQuery {
    #[serde(default = "default_broadcast_limit")]
    pub limit: i64,
}

fn default_broadcast_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct AdjustCreditsRequest {
    pub telegram_id: i64,
    pub amount: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdjustCreditsResponse {
    pub telegram_id: i64,
    pub amount: i64,
    pub old_balance: i64,
    pub new_balance: i64,
    pub reason: Option<String>,
}
