pub mod chat_completions;
pub mod claude;
pub mod gemini;
pub mod groq;
pub mod ollama;
pub mod openai;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{DEFAULT_REQUEST_TIMEOUT_SECS, LlmEngineConfig};
use crate::http::errors::describe_request_error;

pub use claude::ClaudeEngine;
pub use gemini::GeminiEngine;
pub use groq::GroqEngine;
pub use ollama::OllamaEngine;
pub use openai::ChatGptEngine;

/// Sampling temperature used for every query.
pub const QUERY_TEMPERATURE: f32 = 0.2;

pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a>>;

/// A live connection to one LLM backend, bound to a single model.
pub trait Engine {
    /// Sends `prompt` as a single user turn and returns the model's reply.
    fn query<'a>(&'a self, prompt: &'a str) -> EngineFuture<'a, String>;

    /// Lists the model ids the backend offers. Discovery runs at most once per instance.
    fn list_all_models<'a>(&'a mut self) -> EngineFuture<'a, Vec<String>>;
}

#[derive(Debug, Default)]
pub(crate) struct ModelCache {
    models: Option<Vec<String>>,
}

impl ModelCache {
    pub(crate) fn get(&self) -> Option<Vec<String>> {
        self.models.clone()
    }

    pub(crate) fn populate(&mut self, engine: &str, models: Vec<String>) -> Result<Vec<String>> {
        if models.is_empty() {
            bail!("No {} models found in the provider response", engine);
        }
        debug!(engine = %engine, model_count = models.len(), "caching model list");
        self.models = Some(models.clone());
        Ok(models)
    }
}

pub(crate) fn model_or_default(model: &str, cfg: &LlmEngineConfig) -> String {
    let model = model.trim();
    if model.is_empty() {
        cfg.model.trim().to_string()
    } else {
        model.to_string()
    }
}

pub(crate) fn base_url_or_default(cfg: &LlmEngineConfig, default: &str) -> String {
    cfg.base_url()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

pub(crate) fn require_api_key(engine: &str, cfg: &LlmEngineConfig) -> Result<String> {
    let key = cfg
        .api_key()
        .ok_or_else(|| anyhow!("Missing api_key for engine '{}' in the config file", engine))?;
    HeaderValue::from_str(key)
        .with_context(|| format!("Invalid api_key format for engine '{}'", engine))?;
    Ok(key.to_string())
}

/// Builds the per-engine HTTP client; `headers` are sent with every request.
pub(crate) fn build_client(engine: &str, headers: &[(&str, &str)]) -> Result<Client> {
    let mut default_headers = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid header name '{}' for {}", name, engine))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("Invalid value for header '{}' for {}", name, engine))?;
        default_headers.insert(name, value);
    }

    Client::builder()
        .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
        .default_headers(default_headers)
        .build()
        .with_context(|| format!("Failed to initialize {} client", engine))
}

/// POSTs `body` as JSON once, without retries, and decodes the JSON reply.
pub(crate) async fn send_json<B, T>(client: &Client, engine: &str, url: &str, body: &B) -> Result<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    debug!(engine = %engine, api_url = %url, "sending chat request");

    let response = client.post(url).json(body).send().await.map_err(|err| {
        warn!(engine = %engine, api_url = %url, error = %err, "chat request failed");
        anyhow!(describe_request_error(
            &err,
            url,
            DEFAULT_REQUEST_TIMEOUT_SECS
        ))
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        warn!(
            engine = %engine,
            api_url = %url,
            status = %status,
            response_body_len = response_body.len(),
            "provider returned non-success status"
        );
        bail!(
            "{} request failed with status {}: {}",
            engine,
            status,
            response_body
        );
    }

    response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} chat response", engine))
}
