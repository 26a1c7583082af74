use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Engine, EngineFuture, ModelCache, QUERY_TEMPERATURE, base_url_or_default, build_client,
    model_or_default, send_json,
};
use crate::config::LlmEngineConfig;
use crate::http::{RetryClient, RetryPolicy};

const ENGINE: &str = "ollama";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

fn chat_url(base_url: &str) -> String {
    format!("{}/api/chat", base_url.trim_end_matches('/'))
}

fn tags_url(base_url: &str) -> String {
    format!("{}/api/tags", base_url.trim_end_matches('/'))
}

/// Local backend; it needs no credential, which makes it the safe fallback engine.
pub struct OllamaEngine {
    model: String,
    base_url: String,
    client: Client,
    retry: RetryClient,
    models: ModelCache,
}

impl OllamaEngine {
    pub fn new(model: &str, cfg: &LlmEngineConfig) -> Result<Self> {
        Self::with_policy(model, cfg, RetryPolicy::default())
    }

    pub fn with_policy(model: &str, cfg: &LlmEngineConfig, policy: RetryPolicy) -> Result<Self> {
        let client = build_client(ENGINE, &[]).context("Failed to initialize Ollama")?;
        Ok(Self {
            model: model_or_default(model, cfg),
            base_url: base_url_or_default(cfg, DEFAULT_BASE_URL),
            client,
            retry: RetryClient::new(policy)?,
            models: ModelCache::default(),
        })
    }
}

impl Engine for OllamaEngine {
    fn query<'a>(&'a self, prompt: &'a str) -> EngineFuture<'a, String> {
        Box::pin(async move {
            let api_url = chat_url(&self.base_url);
            let body = OllamaChatRequest {
                model: &self.model,
                stream: false,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                options: ChatOptions {
                    temperature: QUERY_TEMPERATURE,
                },
            };

            let parsed: OllamaChatResponse = send_json(&self.client, ENGINE, &api_url, &body)
                .await
                .context("Ollama query failed")?;
            debug!(
                model = %self.model,
                response_len = parsed.message.content.len(),
                "received ollama chat response"
            );
            if parsed.message.content.trim().is_empty() {
                bail!("Ollama response missing message content");
            }
            Ok(parsed.message.content)
        })
    }

    fn list_all_models<'a>(&'a mut self) -> EngineFuture<'a, Vec<String>> {
        Box::pin(async move {
            if let Some(models) = self.models.get() {
                return Ok(models);
            }
            let response: OllamaTagsResponse = self
                .retry
                .get_json(&tags_url(&self.base_url), &[])
                .await
                .context("Error fetching Ollama models")?;
            let models = response.models.into_iter().map(|model| model.name).collect();
            self.models.populate(ENGINE, models)
        })
    }
}
