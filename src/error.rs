use thiserror::Error;

/// Top-level failure of one askllm run, classified by the step that failed.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Error loading configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("Error initializing LLM engine: {0:#}")]
    Engine(anyhow::Error),

    #[error("Error getting prompt: {0:#}")]
    Prompt(anyhow::Error),

    #[error("Error querying LLM: {0:#}")]
    Query(anyhow::Error),

    #[error("Error handling output: {0:#}")]
    Output(anyhow::Error),

    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// 2 for transport or provider failures while talking to a backend, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Query(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{Context, anyhow};

    use super::CliError;

    #[test]
    fn transport_failures_exit_with_two() {
        assert_eq!(CliError::Query(anyhow!("boom")).exit_code(), 2);
        assert_eq!(CliError::Config(anyhow!("boom")).exit_code(), 1);
        assert_eq!(CliError::Engine(anyhow!("boom")).exit_code(), 1);
        assert_eq!(CliError::Prompt(anyhow!("boom")).exit_code(), 1);
        assert_eq!(CliError::Output(anyhow!("boom")).exit_code(), 1);
        assert_eq!(CliError::Usage("nope".to_string()).exit_code(), 1);
    }

    #[test]
    fn display_includes_the_whole_chain() {
        let err: anyhow::Result<()> = Err(anyhow!("connection refused")).context("Ollama query failed");
        let err = CliError::Query(err.expect_err("is an error"));
        assert_eq!(
            err.to_string(),
            "Error querying LLM: Ollama query failed: connection refused"
        );
    }
}
