//! Turns the command line's prompt arguments into the final prompt text.

pub mod query;
pub mod render;
pub mod template;

use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
pub use query::{is_query_string, parse_query_string};
pub use template::{PromptTemplate, TemplateVariable, VariableKind};

/// Template variables by name.
pub type VariableMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    Literal,
    PlainFile(PathBuf),
    Template(PathBuf),
}

impl PromptSource {
    pub fn classify(prompt_file: &str) -> Self {
        let prompt_file = prompt_file.trim();
        if prompt_file.is_empty() {
            return Self::Literal;
        }
        let lower = prompt_file.to_ascii_lowercase();
        if lower.ends_with(".yaml") || lower.ends_with(".yml") {
            Self::Template(PathBuf::from(prompt_file))
        } else {
            Self::PlainFile(PathBuf::from(prompt_file))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub text: String,
    pub default_engine: Option<String>,
    pub default_model: Option<String>,
}

impl ResolvedPrompt {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Picks engine and model independently: command line, then template default, then fallback.
    pub fn parameters(
        &self,
        cli_engine: &str,
        cli_model: &str,
        fallback_engine: &str,
        fallback_model: &str,
    ) -> (String, String) {
        let engine = first_non_empty(cli_engine, self.default_engine.as_deref(), fallback_engine);
        let model = first_non_empty(cli_model, self.default_model.as_deref(), fallback_model);
        (engine, model)
    }
}

fn first_non_empty(cli: &str, template: Option<&str>, fallback: &str) -> String {
    [Some(cli), template, Some(fallback)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// HTTP client used for URL variables: the request timeout applies, retries do not.
pub fn fetch_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
        .build()
        .context("Failed to initialize HTTP client for prompt variables")
}

pub async fn resolve_prompt(client: &Client, prompt_file: &str, payload: &str) -> Result<ResolvedPrompt> {
    match PromptSource::classify(prompt_file) {
        PromptSource::Literal => {
            debug!(payload_len = payload.len(), "using literal prompt");
            Ok(ResolvedPrompt::literal(payload))
        }
        PromptSource::PlainFile(path) => {
            let text = read_prompt_file(&path)?;
            info!(path = %path.display(), prompt_len = text.len(), "loaded prompt file");
            Ok(ResolvedPrompt::literal(text))
        }
        PromptSource::Template(path) => {
            let template = PromptTemplate::load(&path)?;
            let overrides = if is_query_string(payload) {
                parse_query_string(payload).context("Failed to parse template variables from payload")?
            } else {
                VariableMap::new()
            };
            debug!(
                path = %path.display(),
                override_count = overrides.len(),
                "resolving prompt template"
            );

            let text = template
                .render(client, &overrides)
                .await
                .with_context(|| format!("Failed to render prompt template '{}'", path.display()))?;
            Ok(ResolvedPrompt {
                text,
                default_engine: template.default_engine().map(str::to_string),
                default_model: template.default_model().map(str::to_string),
            })
        }
    }
}

fn read_prompt_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read prompt file '{}'", path.display()))
}
