use anyhow::{Context, Result};
use tracing::debug;

use super::chat_completions::{ChatCompletionRequest, ChatCompletionResponse, ModelListResponse};
use super::{Engine, EngineFuture, ModelCache, base_url_or_default, model_or_default, require_api_key};
use crate::config::LlmEngineConfig;
use crate::http::{RetryClient, RetryPolicy};

const ENGINE: &str = "groq";
const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Groq's OpenAI-compatible REST API; every call goes through the retrying client.
pub struct GroqEngine {
    model: String,
    chat_url: String,
    models_url: String,
    authorization: String,
    organization_id: Option<String>,
    retry: RetryClient,
    models: ModelCache,
}

impl GroqEngine {
    pub fn new(model: &str, cfg: &LlmEngineConfig) -> Result<Self> {
        Self::with_policy(model, cfg, RetryPolicy::default())
    }

    pub fn with_policy(model: &str, cfg: &LlmEngineConfig, policy: RetryPolicy) -> Result<Self> {
        let api_key = require_api_key(ENGINE, cfg)?;
        let base_url = base_url_or_default(cfg, DEFAULT_BASE_URL);
        let retry = RetryClient::new(policy).context("Failed to initialize Groq")?;

        Ok(Self {
            model: model_or_default(model, cfg),
            chat_url: format!("{base_url}/chat/completions"),
            models_url: format!("{base_url}/models"),
            authorization: format!("Bearer {api_key}"),
            organization_id: cfg.organization_id().map(str::to_string),
            retry,
            models: ModelCache::default(),
        })
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        let mut headers = vec![("Authorization", self.authorization.as_str())];
        if let Some(org) = &self.organization_id {
            headers.push(("Groq-Organization", org.as_str()));
        }
        headers
    }
}

impl Engine for GroqEngine {
    fn query<'a>(&'a self, prompt: &'a str) -> EngineFuture<'a, String> {
        Box::pin(async move {
            let body = ChatCompletionRequest::single_user_turn(&self.model, prompt);
            let response: ChatCompletionResponse = self
                .retry
                .post_json(&self.chat_url, &body, &self.headers())
                .await
                .context("Groq query failed")?;
            let text = response.into_text(ENGINE)?;
            debug!(model = %self.model, response_len = text.len(), "received Groq response");
            Ok(text)
        })
    }

    fn list_all_models<'a>(&'a mut self) -> EngineFuture<'a, Vec<String>> {
        Box::pin(async move {
            if let Some(models) = self.models.get() {
                return Ok(models);
            }
            let response: ModelListResponse = self
                .retry
                .get_json(&self.models_url, &self.headers())
                .await
                .context("Error fetching Groq models")?;
            self.models.populate(ENGINE, response.into_ids())
        })
    }
}
