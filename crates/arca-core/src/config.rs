use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use arca_backend::ClientOptions;
use thiserror::Error;

use crate::render::{DiffOptions, FoldOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("no API key: ARCA_API_KEY not set and no api_key_cmd configured")]
    MissingApiKey,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub diff: DiffConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of an OpenAI-compatible endpoint, e.g. "https://api.openai.com/v1".
    pub base_url: String,
    pub model: String,
    /// Command to run to get the API key. The command is run via `sh -c`.
    pub api_key_cmd: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Permit localhost and loopback base URLs.
    pub allow_local_endpoints: bool,
    pub temperature: Option<f32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_cmd: None,
            timeout_secs: 60,
            connect_timeout_secs: 10,
            allow_local_endpoints: false,
            temperature: None,
        }
    }
}

impl BackendConfig {
    /// Resolve the API key from api_key_cmd or the ARCA_API_KEY env var.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(cmd) = &self.api_key_cmd {
            match Command::new("sh").arg("-c").arg(cmd).output() {
                Ok(output) if output.status.success() => {
                    let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !key.is_empty() {
                        return Ok(key);
                    }
                }
                Ok(output) => {
                    log::warn!("[arca:config] api_key_cmd exited with {}", output.status);
                }
                Err(e) => log::warn!("[arca:config] api_key_cmd failed to run: {e}"),
            }
        }

        std::env::var("ARCA_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn client_options(&self, api_key: impl Into<String>) -> ClientOptions {
        ClientOptions::new(self.base_url.clone(), api_key)
            .with_model(self.model.clone())
            .with_timeouts(
                Duration::from_secs(self.timeout_secs),
                Duration::from_secs(self.connect_timeout_secs),
            )
            .allow_local_endpoints(self.allow_local_endpoints)
            .with_temperature(self.temperature)
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiffConfig {
    /// Line ceiling above which diffs fall back to whole-block replace.
    pub max_lines: usize,
    /// Context runs longer than this are folded.
    pub fold_threshold: usize,
    /// Context rows kept on each side of a fold.
    pub fold_context: usize,
    /// Entries kept by the row cache before it is cleared.
    pub cache_capacity: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_lines: 400,
            fold_threshold: 5,
            fold_context: 2,
            cache_capacity: 256,
        }
    }
}

impl DiffConfig {
    pub fn options(&self) -> DiffOptions {
        DiffOptions {
            max_lines: self.max_lines,
            fold: FoldOptions {
                threshold: self.fold_threshold,
                context: self.fold_context,
            },
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Entries retained for viewing; the oldest is evicted first.
    pub max_entries: usize,
    /// Newest entries eligible for retry.
    pub retry_window: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            retry_window: 10,
        }
    }
}

impl Config {
    pub fn load_or_default() -> Self {
        let path = config_path();
        if !path.exists() {
            return Config::default();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            log::warn!("[arca:config] {e}, using defaults");
            Config::default()
        })
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("arca").join("config.toml")
}
