use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Engine, EngineFuture, ModelCache, QUERY_TEMPERATURE, base_url_or_default, build_client,
    model_or_default, require_api_key, send_json,
};
use crate::config::LlmEngineConfig;
use crate::http::{RetryClient, RetryPolicy};

const ENGINE: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const MODEL_NAME_PREFIX: &str = "models/";
const MODEL_PAGE_SIZE: u32 = 1000;

pub struct GeminiEngine {
    model: String,
    base_url: String,
    api_key: String,
    client: Client,
    retry: RetryClient,
    models: ModelCache,
}

impl GeminiEngine {
    pub fn new(model: &str, cfg: &LlmEngineConfig) -> Result<Self> {
        Self::with_policy(model, cfg, RetryPolicy::default())
    }

    pub fn with_policy(model: &str, cfg: &LlmEngineConfig, policy: RetryPolicy) -> Result<Self> {
        let api_key = require_api_key(ENGINE, cfg)?;
        let client = build_client(ENGINE, &[(API_KEY_HEADER, api_key.as_str())])
            .context("Failed to initialize Gemini")?;

        Ok(Self {
            model: model_or_default(model, cfg),
            base_url: base_url_or_default(cfg, DEFAULT_BASE_URL),
            api_key,
            client,
            retry: RetryClient::new(policy)?,
            models: ModelCache::default(),
        })
    }

    fn chat_url(&self) -> String {
        let model = self
            .model
            .strip_prefix(MODEL_NAME_PREFIX)
            .unwrap_or(&self.model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn models_url(&self) -> String {
        format!("{}/models?pageSize={}", self.base_url, MODEL_PAGE_SIZE)
    }

    async fn list_models_core(&self) -> Result<Vec<GeminiModel>> {
        let response: GeminiModelListResponse = self
            .retry
            .get_json(&self.models_url(), &[(API_KEY_HEADER, self.api_key.as_str())])
            .await
            .context("Error fetching Gemini models")?;
        Ok(response.models)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GeminiModelListResponse {
    #[serde(default)]
    models: Vec<GeminiModel>,
}

fn strip_model_prefix(name: &str) -> String {
    name.strip_prefix(MODEL_NAME_PREFIX)
        .unwrap_or(name)
        .to_string()
}

impl Engine for GeminiEngine {
    fn query<'a>(&'a self, prompt: &'a str) -> EngineFuture<'a, String> {
        Box::pin(async move {
            let body = GenerateContentRequest {
                contents: vec![Content {
                    role: "user",
                    parts: vec![TextPart { text: prompt }],
                }],
                generation_config: GenerationConfig {
                    temperature: QUERY_TEMPERATURE,
                },
            };
            let response: GenerateContentResponse =
                send_json(&self.client, ENGINE, &self.chat_url(), &body)
                    .await
                    .context("Gemini query failed")?;

            let text = response
                .candidates
                .into_iter()
                .find_map(|candidate| candidate.content)
                .map(|content| {
                    content
                        .parts
                        .into_iter()
                        .filter_map(|part| part.text)
                        .collect::<String>()
                })
                .unwrap_or_default();
            if text.is_empty() {
                bail!("Gemini response has no candidates with text");
            }
            debug!(model = %self.model, response_len = text.len(), "received Gemini response");
            Ok(text)
        })
    }

    fn list_all_models<'a>(&'a mut self) -> EngineFuture<'a, Vec<String>> {
        Box::pin(async move {
            if let Some(models) = self.models.get() {
                return Ok(models);
            }
            let models = self
                .list_models_core()
                .await?
                .iter()
                .map(|model| strip_model_prefix(&model.name))
                .collect();
            self.models.populate(ENGINE, models)
        })
    }
}
