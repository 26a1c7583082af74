//! Maps a requested engine/model pair onto a configured backend adapter.

use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::{AppConfig, LlmEngineConfig, normalize_name};
use crate::providers::{
    ChatGptEngine, ClaudeEngine, Engine, GeminiEngine, GroqEngine, OllamaEngine,
};

pub const CHATGPT: &str = "chatgpt";
pub const CLAUDE: &str = "claude";
pub const GEMINI: &str = "gemini";
pub const GROQ: &str = "groq";
pub const OLLAMA: &str = "ollama";

/// The engine used whenever nothing else is requested or configured.
pub const SAFE_DEFAULT_ENGINE: &str = OLLAMA;

pub const KNOWN_ENGINES: &[&str] = &[CHATGPT, CLAUDE, GEMINI, GROQ, OLLAMA];

/// Default model per engine; also what the model report marks as default.
pub fn default_model(engine: &str) -> Option<&'static str> {
    match normalize_name(engine).as_str() {
        CHATGPT => Some("gpt-4o-mini"),
        GEMINI => Some("gemini-1.5-pro"),
        OLLAMA => Some("gemma2"),
        CLAUDE => Some("claude-3-sonnet-20240229"),
        GROQ => Some("gemma2-9b-it"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSelection {
    pub engine: String,
    pub model: String,
}

pub fn select(requested_engine: &str, requested_model: &str, cfg: &AppConfig) -> EngineSelection {
    let requested_model = normalize_name(requested_model);
    let mut engine = normalize_name(requested_engine);
    if engine.is_empty() {
        engine = cfg
            .default_engine()
            .unwrap_or_else(|| SAFE_DEFAULT_ENGINE.to_string());
    }

    if !cfg.llm_engines.contains_key(&engine) {
        warn!(
            requested_engine = %engine,
            fallback_engine = SAFE_DEFAULT_ENGINE,
            "engine is not configured, falling back"
        );
        engine = SAFE_DEFAULT_ENGINE.to_string();
    }

    let model = if requested_model.is_empty() {
        default_model(&engine).unwrap_or_default().to_string()
    } else {
        requested_model
    };

    EngineSelection { engine, model }
}

pub fn create(selection: &EngineSelection, engine_cfg: &LlmEngineConfig) -> Result<Box<dyn Engine>> {
    let model = selection.model.as_str();
    let engine: Box<dyn Engine> = match selection.engine.as_str() {
        CHATGPT => Box::new(ChatGptEngine::new(model, engine_cfg)?),
        GEMINI => Box::new(GeminiEngine::new(model, engine_cfg)?),
        OLLAMA => Box::new(OllamaEngine::new(model, engine_cfg)?),
        CLAUDE => Box::new(ClaudeEngine::new(model, engine_cfg)?),
        GROQ => Box::new(GroqEngine::new(model, engine_cfg)?),
        other => bail!(
            "Unsupported LLM engine: '{}'. Supported engines: {}.",
            other,
            KNOWN_ENGINES.join(", ")
        ),
    };
    Ok(engine)
}

pub fn resolve(
    requested_engine: &str,
    requested_model: &str,
    cfg: &AppConfig,
) -> Result<Box<dyn Engine>> {
    let selection = select(requested_engine, requested_model, cfg);
    let fallback_cfg = LlmEngineConfig::default();
    let engine_cfg = cfg.engine(&selection.engine).unwrap_or(&fallback_cfg);
    info!(
        engine = %selection.engine,
        model = %selection.model,
        "using LLM engine"
    );
    create(&selection, engine_cfg)
        .with_context(|| format!("Failed to initialize engine '{}'", selection.engine))
}

/// Builds adapters for `requested_engine` when it is configured, otherwise for every configured engine.
pub fn resolve_for_listing(
    requested_engine: &str,
    cfg: &AppConfig,
) -> Result<Vec<(String, Box<dyn Engine>)>> {
    let requested = normalize_name(requested_engine);
    let engines: Vec<String> = if cfg.llm_engines.contains_key(&requested) {
        vec![requested]
    } else {
        cfg.llm_engines.keys().cloned().collect()
    };

    engines
        .into_iter()
        .map(|name| resolve(&name, "", cfg).map(|engine| (name, engine)))
        .collect()
}

/// Stops at the first engine whose listing fails.
pub async fn list_models(
    engines: Vec<(String, Box<dyn Engine>)>,
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut result = BTreeMap::new();
    for (name, mut engine) in engines {
        let models = engine
            .list_all_models()
            .await
            .with_context(|| format!("Failed to list models for engine '{}'", name))?;
        result.insert(name, models);
    }
    Ok(result)
}

pub async fn list_all_for_engine(
    requested_engine: &str,
    cfg: &AppConfig,
) -> Result<BTreeMap<String, Vec<String>>> {
    list_models(resolve_for_listing(requested_engine, cfg)?).await
}

/// One block per engine, default model marked with `*`.
pub fn format_model_report(models: &BTreeMap<String, Vec<String>>) -> String {
    let mut report = String::new();
    for (engine, ids) in models {
        report.push_str(&format!("{engine}:\n"));
        let default = default_model(engine);
        for id in ids {
            let is_default = default.is_some_and(|default| {
                id == default || id.split_once(':').is_some_and(|(base, _)| base == default)
            });
            let marker = if is_default { '*' } else { ' ' };
            report.push_str(&format!("  {marker} {id}\n"));
        }
    }
    report
}
