use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// One year.
const MAX_PERIOD_MINUTES: u64 = 365 * 24 * 60;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_period_minutes")]
    pub period_minutes: u64,
    pub server_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub listen: Option<String>,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;
        Self::from_yaml(&text, &path_display)
    }

    fn from_yaml(text: &str, path_display: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path_display.to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PERIOD_MINUTES).contains(&self.period_minutes) {
            return Err(ConfigError::Validation(format!(
                "period_minutes must be between 1 and {MAX_PERIOD_MINUTES}"
            )));
        }
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::Validation("server_url is required".to_string()));
        }
        if Url::parse(&self.server_url).is_err() {
            return Err(ConfigError::Validation(format!(
                "server_url '{}' must be a valid URL",
                self.server_url
            )));
        }
        if let Some(listen) = &self.listen {
            if SocketAddr::from_str(listen).is_err() {
                return Err(ConfigError::Validation(
                    "listen must be a valid host:port address".to_string(),
                ));
            }
        }
        if self.request_timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_minutes.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Credential for the sink: the environment variable wins over the literal.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Ok(v) = std::env::var(&self.api_key_env) {
            if !v.trim().is_empty() {
                return Some(v);
            }
        }
        self.api_key
            .as_ref()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

const fn default_period_minutes() -> u64 {
    1
}

fn default_api_key_env() -> String {
    "HOSTMON_API_KEY".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    10
}
