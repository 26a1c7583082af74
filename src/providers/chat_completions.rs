//! Wire types for OpenAI-compatible `/chat/completions` and `/models` endpoints.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use super::QUERY_TEMPERATURE;

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

impl<'a> ChatCompletionRequest<'a> {
    pub(crate) fn single_user_turn(model: &'a str, prompt: &'a str) -> Self {
        Self {
            model,
            temperature: QUERY_TEMPERATURE,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionResponse {
    pub(crate) fn into_text(self, engine: &str) -> Result<String> {
        self.choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No choices in {} response", engine))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelListResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl ModelListResponse {
    pub(crate) fn into_ids(self) -> Vec<String> {
        self.data.into_iter().map(|entry| entry.id).collect()
    }
}
