pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;
pub mod markup;
pub mod output;
pub mod prompt;
pub mod providers;

#[cfg(test)]
pub(crate) mod test_support;

use tracing::{debug, info};

use cli::{Action, Cli};
use config::AppConfig;
use error::CliError;
use logging::{LogHandle, LogSettings};

/// Loads configuration and starts logging; the returned handle must outlive the run.
pub fn bootstrap(cli: &Cli) -> Result<(AppConfig, LogHandle), CliError> {
    dotenvy::dotenv().ok();

    let cfg = AppConfig::load(&cli.config).map_err(CliError::Config)?;
    let handle = logging::init(&LogSettings::from_sys(&cfg.sys, cli.verbose));
    info!(
        config = %cli.config,
        engines = cfg.llm_engines.len(),
        "loaded runtime configuration"
    );
    Ok((cfg, handle))
}

pub async fn run(cli: &Cli, cfg: &AppConfig) -> Result<(), CliError> {
    match cli.action {
        Action::Client => ask(cli, cfg).await,
        Action::Models => list_models(cli, cfg).await,
        Action::Server => Err(CliError::Usage(
            "The 'server' action is not available in this build; use 'client' or 'models'".to_string(),
        )),
    }
}

async fn ask(cli: &Cli, cfg: &AppConfig) -> Result<(), CliError> {
    let client = prompt::fetch_client().map_err(CliError::Prompt)?;
    let resolved = prompt::resolve_prompt(&client, &cli.prompt, &cli.payload_text())
        .await
        .map_err(CliError::Prompt)?;
    if resolved.text.trim().is_empty() {
        return Err(CliError::Usage(
            "No prompt given: pass prompt text or use --prompt <file>".to_string(),
        ));
    }

    let fallback_engine = cfg.default_engine().unwrap_or_default();
    let (engine_name, model) = resolved.parameters(&cli.engine, &cli.model, &fallback_engine, "");
    let engine = engine::resolve(&engine_name, &model, cfg).map_err(CliError::Engine)?;

    debug!(prompt_len = resolved.text.len(), "querying LLM");
    let answer = engine.query(&resolved.text).await.map_err(CliError::Query)?;
    info!(response_len = answer.len(), "LLM query completed");

    output::handle_output(&cli.output, &answer).map_err(CliError::Output)
}

async fn list_models(cli: &Cli, cfg: &AppConfig) -> Result<(), CliError> {
    let engines = engine::resolve_for_listing(&cli.engine, cfg).map_err(CliError::Engine)?;
    if engines.is_empty() {
        return Err(CliError::Usage(format!(
            "No LLM engines configured in '{}'",
            cli.config
        )));
    }

    let models = engine::list_models(engines).await.map_err(CliError::Query)?;
    let report = engine::format_model_report(&models);
    if output::is_stdout(&cli.output) {
        print!("{report}");
        return Ok(());
    }
    output::handle_output(&cli.output, &report).map_err(CliError::Output)
}
