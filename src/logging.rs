use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::SysConfig;

const LOG_FILE_NAME: &str = "askllm.log";
const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    File(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub output: LogOutput,
}

impl LogSettings {
    pub fn from_sys(sys: &SysConfig, verbose: bool) -> Self {
        let level = if verbose {
            LogLevel::Debug
        } else {
            parse_log_level(Some(&sys.log_level))
        };
        Self {
            level,
            output: parse_log_output(Some(&sys.log_path)),
        }
    }

    fn filter_directive(&self) -> String {
        format!("warn,askllm={}", self.level.as_str())
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            output: LogOutput::Stderr,
        }
    }
}

/// Keeps the background log writer alive; drop it only when the process is done logging.
#[derive(Default)]
pub struct LogHandle {
    _guard: Option<WorkerGuard>,
}

fn parse_log_level(raw: Option<&str>) -> LogLevel {
    match raw.unwrap_or("").trim().to_ascii_lowercase().as_str() {
        "trace" => LogLevel::Trace,
        "debug" => LogLevel::Debug,
        "warn" | "warning" => LogLevel::Warn,
        "error" => LogLevel::Error,
        _ => DEFAULT_LOG_LEVEL,
    }
}

fn parse_log_output(raw: Option<&str>) -> LogOutput {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|dir| LogOutput::File(PathBuf::from(dir)))
        .unwrap_or(LogOutput::Stderr)
}

fn build_file_writer(dir: &Path) -> std::io::Result<(non_blocking::NonBlocking, WorkerGuard)> {
    fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
    Ok(tracing_appender::non_blocking(appender))
}

fn env_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.filter_directive()))
}

fn init_stderr(settings: &LogSettings) -> InitResult {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(settings))
        .with_writer(BoxMakeWriter::new(std::io::stderr))
        .try_init()
}

fn init_file(settings: &LogSettings, writer: non_blocking::NonBlocking) -> InitResult {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(settings))
        .with_writer(BoxMakeWriter::new(writer))
        .try_init()
}

pub fn init(settings: &LogSettings) -> LogHandle {
    match &settings.output {
        LogOutput::Stderr => {
            let _ = init_stderr(settings);
            LogHandle::default()
        }
        LogOutput::File(dir) => match build_file_writer(dir) {
            Ok((writer, guard)) => {
                let _ = init_file(settings, writer);
                LogHandle {
                    _guard: Some(guard),
                }
            }
            Err(err) => {
                eprintln!(
                    "askllm: failed to initialize log file in '{}': {}; using stderr instead",
                    dir.display(),
                    err
                );
                let _ = init_stderr(settings);
                LogHandle::default()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{LogLevel, LogOutput, LogSettings, parse_log_level, parse_log_output};
    use crate::config::SysConfig;

    #[test]
    fn parse_log_level_defaults_to_info() {
        assert_eq!(parse_log_level(None), LogLevel::Info);
        assert_eq!(parse_log_level(Some("unknown")), LogLevel::Info);
    }

    #[test]
    fn parse_log_level_accepts_known_levels() {
        assert_eq!(parse_log_level(Some("DEBUG")), LogLevel::Debug);
        assert_eq!(parse_log_level(Some(" warning ")), LogLevel::Warn);
        assert_eq!(parse_log_level(Some("error")), LogLevel::Error);
        assert_eq!(parse_log_level(Some("Trace")), LogLevel::Trace);
    }

    #[test]
    fn parse_log_output_uses_stderr_for_missing_or_empty_path() {
        assert_eq!(parse_log_output(None), LogOutput::Stderr);
        assert_eq!(parse_log_output(Some("   ")), LogOutput::Stderr);
    }

    #[test]
    fn parse_log_output_preserves_explicit_directory() {
        assert_eq!(
            parse_log_output(Some("/var/log/askllm")),
            LogOutput::File(PathBuf::from("/var/log/askllm"))
        );
    }

    #[test]
    fn verbose_flag_forces_debug_level() {
        let sys = SysConfig {
            log_level: "error".to_string(),
            ..SysConfig::default()
        };
        assert_eq!(LogSettings::from_sys(&sys, false).level, LogLevel::Error);
        assert_eq!(LogSettings::from_sys(&sys, true).level, LogLevel::Debug);
    }

    #[test]
    fn filter_directive_scopes_level_to_crate() {
        let settings = LogSettings::default();
        assert_eq!(settings.filter_directive(), "warn,askllm=info");
    }
}
