use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "~/.askllm/config.yaml";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RETRY_MAX: u32 = 3;
pub const DEFAULT_RETRY_WAIT_MIN_SECS: u64 = 1;
pub const DEFAULT_RETRY_WAIT_MAX_SECS: u64 = 30;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SysConfig {
    pub log_path: String,
    pub log_level: String,
    pub default_engine: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmEngineConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub organization_id: String,
}

impl LlmEngineConfig {
    pub fn base_url(&self) -> Option<&str> {
        non_empty(&self.base_url)
    }

    pub fn organization_id(&self) -> Option<&str> {
        non_empty(&self.organization_id)
    }

    pub fn api_key(&self) -> Option<&str> {
        non_empty(&self.api_key)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub sys: SysConfig,
    pub llm_engines: BTreeMap<String, LlmEngineConfig>,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self> {
        let path = expand_tilde(path, env::var("HOME").ok().as_deref())?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let parsed: AppConfig = serde_yaml::from_str(raw).context("Invalid YAML configuration")?;
        Ok(parsed.normalized())
    }

    pub fn engine(&self, name: &str) -> Option<&LlmEngineConfig> {
        self.llm_engines.get(&normalize_name(name))
    }

    pub fn default_engine(&self) -> Option<String> {
        let name = normalize_name(&self.sys.default_engine);
        (!name.is_empty()).then_some(name)
    }

    fn normalized(self) -> Self {
        let llm_engines = self
            .llm_engines
            .into_iter()
            .map(|(name, engine)| (normalize_name(&name), engine))
            .collect();
        Self {
            sys: self.sys,
            llm_engines,
        }
    }
}

pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

pub fn expand_tilde(path: &str, home: Option<&str>) -> Result<PathBuf> {
    let Some(rest) = path.strip_prefix('~') else {
        return Ok(PathBuf::from(path));
    };

    let home = home
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("Cannot expand '{}': home directory is unknown", path))?;
    let rest = rest.trim_start_matches(['/', '\\']);
    if rest.is_empty() {
        Ok(PathBuf::from(home))
    } else {
        Ok(Path::new(home).join(rest))
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
