use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Engine, EngineFuture, ModelCache, QUERY_TEMPERATURE, base_url_or_default, build_client,
    model_or_default, require_api_key, send_json,
};
use crate::config::LlmEngineConfig;

const ENGINE: &str = "claude";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: usize = 4096;

/// Anthropic publishes no listing endpoint for these keys, so the catalog is fixed.
pub const CLAUDE_MODELS: &[&str] = &[
    "claude-3-5-sonnet-20240620",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
    "claude-2.1",
    "claude-2.0",
    "claude-instant-1.2",
];

pub struct ClaudeEngine {
    model: String,
    chat_url: String,
    client: Client,
    models: ModelCache,
}

impl ClaudeEngine {
    pub fn new(model: &str, cfg: &LlmEngineConfig) -> Result<Self> {
        let api_key = require_api_key(ENGINE, cfg)?;
        let base_url = base_url_or_default(cfg, DEFAULT_BASE_URL);
        let client = build_client(
            ENGINE,
            &[
                ("x-api-key", api_key.as_str()),
                ("anthropic-version", ANTHROPIC_VERSION),
            ],
        )
        .context("Failed to initialize Claude")?;

        Ok(Self {
            model: model_or_default(model, cfg),
            chat_url: format!("{base_url}/messages"),
            client,
            models: ModelCache::default(),
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<MessagesTurn<'a>>,
}

#[derive(Serialize)]
struct MessagesTurn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl Engine for ClaudeEngine {
    fn query<'a>(&'a self, prompt: &'a str) -> EngineFuture<'a, String> {
        Box::pin(async move {
            let body = MessagesRequest {
                model: &self.model,
                max_tokens: MAX_OUTPUT_TOKENS,
                temperature: QUERY_TEMPERATURE,
                messages: vec![MessagesTurn {
                    role: "user",
                    content: prompt,
                }],
            };
            let response: MessagesResponse = send_json(&self.client, ENGINE, &self.chat_url, &body)
                .await
                .context("Claude query failed")?;

            let text = response
                .content
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text),
                    ContentBlock::Other => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            if text.is_empty() {
                bail!("Claude response missing text content");
            }
            debug!(model = %self.model, response_len = text.len(), "received Claude response");
            Ok(text)
        })
    }

    fn list_all_models<'a>(&'a mut self) -> EngineFuture<'a, Vec<String>> {
        Box::pin(async move {
            if let Some(models) = self.models.get() {
                return Ok(models);
            }
            let models = CLAUDE_MODELS.iter().map(|id| id.to_string()).collect();
            self.models.populate(ENGINE, models)
        })
    }
}
