/// Service configuration loader - parses psamon.toml
///
/// Keeps deployment settings (port, worker count, API key, KPI parameters,
/// alarm webhook) out of the code. Every table and key is optional: a
/// missing file or a missing key falls back to the defaults below.
///
/// Precedence, lowest to highest: defaults, `psamon.toml`, environment
/// (`PSAMON_PORT`, `PSAMON_API_KEY`, `PSAMON_WEBHOOK_URL`), command-line
/// flags (applied by `main.rs`).
///
/// The database URL is not part of this file; it comes from `DATABASE_URL`
/// (see `db.rs`).

use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::KpiSettings;

pub const DEFAULT_CONFIG_PATH: &str = "psamon.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },
}

/// Root of `psamon.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub kpi: KpiSettings,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Worker threads, each with its own database connection.
    pub workers: usize,
    /// When unset, the API is open and a warning is logged at startup.
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: 4,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Alarm webhook. Alarms are only logged when unset.
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

impl ServiceConfig {
    /// Load `path`. A missing file yields the defaults; an unreadable or
    /// malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %shown, "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path: shown, source }),
        };

        let config: ServiceConfig =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse { path: shown.clone(), source })?;
        info!(path = %shown, "configuration loaded");
        Ok(config)
    }

    /// Apply `PSAMON_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `PSAMON_*` overrides using `lookup` as the environment.
    /// An empty API key or webhook URL clears the setting.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PSAMON_PORT") {
            self.server.port = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "PSAMON_PORT".to_string(),
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("PSAMON_API_KEY") {
            self.server.api_key = Some(value).filter(|v| !v.is_empty());
        }
        if let Some(value) = lookup("PSAMON_WEBHOOK_URL") {
            self.notify.webhook_url = Some(value).filter(|v| !v.is_empty());
        }
        Ok(())
    }
}
