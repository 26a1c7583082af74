use clap::{Parser, ValueEnum};

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Action {
    /// Send one prompt and print the answer
    #[default]
    Client,
    /// Reserved; no server mode ships with this build
    Server,
    /// List the models each configured engine offers
    Models,
}

/// Command-line interface for askllm.
#[derive(Parser, Debug, Clone)]
#[command(name = "askllm", version, about = "Ask a large language model from the command line")]
pub struct Cli {
    /// What to do
    #[arg(short, long, value_enum, default_value_t = Action::Client)]
    pub action: Action,

    /// LLM engine (chatgpt, claude, gemini, groq, ollama)
    #[arg(short, long, default_value = "")]
    pub engine: String,

    /// Model for the LLM engine
    #[arg(short, long, default_value = "")]
    pub model: String,

    /// Configuration file
    #[arg(short, long, env = "ASKLLM_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Prompt file: plain text, or a .yaml/.yml prompt template
    #[arg(short, long, default_value = "")]
    pub prompt: String,

    /// Output file; empty or "stdout" prints to the terminal
    #[arg(short, long, default_value = "")]
    pub output: String,

    /// Debug-level logging
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Prompt text, or key=value&key=value template variables
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub payload: Vec<String>,
}

impl Cli {
    pub fn payload_text(&self) -> String {
        self.payload.join(" ")
    }
}
