use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

use super::chat_completions::{ChatCompletionRequest, ChatCompletionResponse, ModelListResponse};
use super::{
    Engine, EngineFuture, ModelCache, base_url_or_default, build_client, model_or_default,
    require_api_key, send_json,
};
use crate::config::LlmEngineConfig;
use crate::http::{RetryClient, RetryPolicy};

const ENGINE: &str = "chatgpt";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct ChatGptEngine {
    model: String,
    chat_url: String,
    models_url: String,
    api_key: String,
    organization_id: Option<String>,
    client: Client,
    retry: RetryClient,
    models: ModelCache,
}

impl ChatGptEngine {
    pub fn new(model: &str, cfg: &LlmEngineConfig) -> Result<Self> {
        Self::with_policy(model, cfg, RetryPolicy::default())
    }

    pub fn with_policy(model: &str, cfg: &LlmEngineConfig, policy: RetryPolicy) -> Result<Self> {
        let api_key = require_api_key(ENGINE, cfg)?;
        let base_url = base_url_or_default(cfg, DEFAULT_BASE_URL);
        let organization_id = cfg.organization_id().map(str::to_string);
        let headers = auth_headers(&api_key, organization_id.as_deref());
        let client = build_client(ENGINE, &headers.as_pairs())
            .context("Failed to initialize ChatGPT")?;

        Ok(Self {
            model: model_or_default(model, cfg),
            chat_url: format!("{base_url}/chat/completions"),
            models_url: format!("{base_url}/models"),
            api_key,
            organization_id,
            client,
            retry: RetryClient::new(policy)?,
            models: ModelCache::default(),
        })
    }

    async fn list_models_core(&self) -> Result<Vec<String>> {
        let headers = auth_headers(&self.api_key, self.organization_id.as_deref());
        let response: ModelListResponse = self
            .retry
            .get_json(&self.models_url, &headers.as_pairs())
            .await
            .context("Error fetching ChatGPT models")?;
        Ok(response.into_ids())
    }
}

struct AuthHeaders {
    authorization: String,
    organization: Option<String>,
}

impl AuthHeaders {
    fn as_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = vec![("Authorization", self.authorization.as_str())];
        if let Some(org) = &self.organization {
            pairs.push(("OpenAI-Organization", org.as_str()));
        }
        pairs
    }
}

fn auth_headers(api_key: &str, organization_id: Option<&str>) -> AuthHeaders {
    AuthHeaders {
        authorization: format!("Bearer {api_key}"),
        organization: organization_id.map(str::to_string),
    }
}

impl Engine for ChatGptEngine {
    fn query<'a>(&'a self, prompt: &'a str) -> EngineFuture<'a, String> {
        Box::pin(async move {
            let body = ChatCompletionRequest::single_user_turn(&self.model, prompt);
            let response: ChatCompletionResponse =
                send_json(&self.client, ENGINE, &self.chat_url, &body)
                    .await
                    .context("ChatGPT query failed")?;
            let text = response.into_text(ENGINE)?;
            debug!(model = %self.model, response_len = text.len(), "received ChatGPT response");
            Ok(text)
        })
    }

    fn list_all_models<'a>(&'a mut self) -> EngineFuture<'a, Vec<String>> {
        Box::pin(async move {
            if let Some(models) = self.models.get() {
                return Ok(models);
            }
            let models = self.list_models_core().await?;
            self.models.populate(ENGINE, models)
        })
    }
}
