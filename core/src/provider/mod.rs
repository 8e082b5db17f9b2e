//! Upstream image-synthesis provider contract.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub upstream_job_id: String,
    /// Present when the provider returned outputs synchronously, skipping
    /// the poller entirely.
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PredictionStatus {
    pub status: String,
    pub outputs: Vec<String>,
    pub error_message: Option<String>,
}

/// One method per generation mode in the abstract generator interface.
/// A single production implementation, [`HttpProvider`], is registered
/// under a dispatch table keyed by `(model_key, has_references)` in the
/// Gateway rather than being matched on here.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn submit_text_to_image(
        &self,
        model_key: &str,
        prompt: &str,
        params: &crate::models::GenerationParams,
    ) -> Result<SubmitOutcome, CoreError>;

    async fn submit_image_to_image(
        &self,
        model_key: &str,
        prompt: &str,
        params: &crate::models::GenerationParams,
        reference_urls: &[String],
    ) -> Result<SubmitOutcome, CoreError>;

    async fn get_prediction(&self, upstream_job_id: &str) -> Result<PredictionStatus, CoreError>;

    async fn get_balance(&self) -> Result<i64, CoreError>;
}

/// `reqwest`-backed [`Provider`]: a client, base URL, and API key, with a
/// per-request timeout.
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        HttpProvider::with_timeout(base_url, api_key, Duration::from_secs(30))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a static timeout");
        HttpProvider {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn submit(&self, model_key: &str, body: Value) -> Result<SubmitOutcome, CoreError> {
        let resp = self
            .client
            .post(format!("{}/v1/models/{}/predictions", self.base_url, model_key))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let payload: Value = resp.json().await?;
        if !status.is_success() {
            let msg = first_non_empty_error(&payload).unwrap_or_else(|| "Generation failed".into());
            return Err(CoreError::ProviderSubmitFailed(msg));
        }
        let upstream_job_id = payload
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::ProviderSubmitFailed("missing job id in response".into()))?
            .to_string();
        let outputs = normalize_outputs(payload.get("outputs"));
        Ok(SubmitOutcome {
            upstream_job_id,
            outputs,
        })
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn submit_text_to_image(
        &self,
        model_key: &str,
        prompt: &str,
        params: &crate::models::GenerationParams,
    ) -> Result<SubmitOutcome, CoreError> {
        self.submit(model_key, params_to_json(prompt, params, &[])).await
    }

    async fn submit_image_to_image(
        &self,
        model_key: &str,
        prompt: &str,
        params: &crate::models::GenerationParams,
        reference_urls: &[String],
    ) -> Result<SubmitOutcome, CoreError> {
        self.submit(model_key, params_to_json(prompt, params, reference_urls))
            .await
    }

    async fn get_prediction(&self, upstream_job_id: &str) -> Result<PredictionStatus, CoreError> {
        let resp = self
            .client
            .get(format!("{}/v1/predictions/{}", self.base_url, upstream_job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let payload: Value = resp.json().await.map_err(CoreError::from)?;
        Ok(PredictionStatus {
            status: payload
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            outputs: normalize_outputs(payload.get("outputs")),
            error_message: first_non_empty_error(&payload),
        })
    }

    async fn get_balance(&self) -> Result<i64, CoreError> {
        #[derive(Deserialize)]
        struct BalanceResponse {
            balance: i64,
        }
        let resp = self
            .client
            .get(format!("{}/v1/balance", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let parsed: BalanceResponse = resp.json().await?;
        Ok(parsed.balance)
    }
}

fn params_to_json(prompt: &str, params: &crate::models::GenerationParams, refs: &[String]) -> Value {
    let mut body = serde_json::json!({ "prompt": prompt });
    let obj = body.as_object_mut().expect("object literal");
    if let Some(size) = &params.size {
        obj.insert("size".into(), Value::String(size.clone()));
    }
    if let Some(ar) = &params.aspect_ratio {
        obj.insert("aspect_ratio".into(), Value::String(ar.clone()));
    }
    if let Some(res) = &params.resolution {
        obj.insert("resolution".into(), Value::String(res.clone()));
    }
    if let Some(q) = &params.quality {
        obj.insert("quality".into(), Value::String(q.clone()));
    }
    if let Some(fid) = &params.input_fidelity {
        obj.insert("input_fidelity".into(), Value::String(fid.clone()));
    }
    if !refs.is_empty() {
        obj.insert(
            "image_urls".into(),
            Value::Array(refs.iter().cloned().map(Value::String).collect()),
        );
    }
    body
}

/// `_normalize_outputs`: upstream sometimes returns a bare string instead of
/// a one-element list (`original_source/api/app/worker/tasks.py`).
fn normalize_outputs(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// First non-empty string among `error_message | error | detail | message`,
/// grounded on the Python `response.message or "Generation failed"` chain.
pub fn first_non_empty_error(payload: &Value) -> Option<String> {
    for key in ["error_message", "error", "detail", "message"] {
        if let Some(s) = payload.get(key).and_then(Value::as_str) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}
