//! Provider dispatch by `(model_key, has_references)`: a table of boxed
//! async closures keyed by the pair, rather than a class hierarchy. Each
//! entry captures the shared [`Provider`] and the model key;
//! `has_references` is decided inside the closure from the `refs` argument
//! rather than doubling the table.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::CoreError;
use crate::models::GenerationParams;
use crate::provider::{Provider, SubmitOutcome};

type DispatchFuture = BoxFuture<'static, Result<SubmitOutcome, CoreError>>;
type DispatchFn = Arc<dyn Fn(String, GenerationParams, Vec<String>) -> DispatchFuture + Send + Sync>;

#[derive(Clone)]
pub struct ProviderDispatchTable {
    entries: HashMap<String, DispatchFn>,
}

impl ProviderDispatchTable {
    pub fn new() -> Self {
        ProviderDispatchTable {
            entries: HashMap::new(),
        }
    }

    /// Registers `model_key` against the shared provider. Called once per
    /// active model when the Gateway is constructed from the model catalog.
    pub fn register(&mut self, model_key: impl Into<String>, provider: Arc<dyn Provider>) {
        let key = model_key.into();
        let entry_key = key.clone();
        let entry: DispatchFn = Arc::new(move |prompt, params, refs| {
            let provider = Arc::clone(&provider);
            let model_key = entry_key.clone();
            Box::pin(async move {
                if refs.is_empty() {
                    provider.submit_text_to_image(&model_key, &prompt, &params).await
                } else {
                    provider
                        .submit_image_to_image(&model_key, &prompt, &params, &refs)
                        .await
                }
            })
        });
        self.entries.insert(key, entry);
    }

    pub async fn submit(
        &self,
        model_key: &str,
        prompt: String,
        params: GenerationParams,
        reference_urls: Vec<String>,
    ) -> Result<SubmitOutcome, CoreError> {
        let entry = self
            .entries
            .get(model_key)
            .ok_or_else(|| CoreError::ModelNotFound(model_key.to_string()))?;
        entry(prompt, params, reference_urls).await
    }
}

impl Default for ProviderDispatchTable {
    fn default() -> Self {
        Self::new()
    }
}
