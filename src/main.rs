use clap::Parser;
use tracing::error;

use askllm::cli::Cli;
use askllm::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (cfg, log) = match askllm::bootstrap(&cli) {
        Ok(ready) => ready,
        Err(err) => {
            eprintln!("askllm: {err}");
            std::process::exit(err.exit_code());
        }
    };

    if let Err(err) = askllm::run(&cli, &cfg).await {
        report(&err);
        drop(log);
        std::process::exit(err.exit_code());
    }
}

fn report(err: &CliError) {
    error!(error = %err, exit_code = err.exit_code(), "askllm failed");
    eprintln!("askllm: {err}");
}
