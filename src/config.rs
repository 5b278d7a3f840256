use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::client::{self, ClientConfig};
use crate::feed;
use crate::navigation::{self, RedirectPolicy};

const DEFAULT_ENV_PREFIX: &str = "MARKET";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub comments: CommentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    client::DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> Duration {
    client::DEFAULT_TIMEOUT
}

fn default_user_agent() -> String {
    format!("market-client/{}", crate::VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "navigation::default_protected_prefixes")]
    pub protected_prefixes: Vec<String>,
    #[serde(default = "default_redirect_delay", with = "humantime_serde")]
    pub redirect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
            protected_prefixes: navigation::default_protected_prefixes(),
            redirect_delay: default_redirect_delay(),
        }
    }
}

fn default_refresh_path() -> String {
    client::REFRESH_PATH.to_string()
}

fn default_login_path() -> String {
    navigation::LOGIN_PATH.to_string()
}

fn default_redirect_delay() -> Duration {
    navigation::REDIRECT_DELAY
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentsConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    feed::PAGE_SIZE
}

impl Config {
    pub fn redirect_policy(&self) -> RedirectPolicy {
        RedirectPolicy {
            protected_prefixes: self.session.protected_prefixes.clone(),
            login_path: self.session.login_path.clone(),
            delay: self.session.redirect_delay,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: Some(self.api.base_url.clone()),
            user_agent: self.api.user_agent.clone(),
            timeout: Some(self.api.timeout),
            refresh_path: Some(self.session.refresh_path.clone()),
            redirect: self.redirect_policy(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

/// Defaults, then the YAML file (keys it leaves out keep their defaults), then
/// `<PREFIX>_SECTION__KEY` environment variables.
pub fn load(options: LoadOptions) -> Result<Config> {
    let path = options.config_file.or_else(default_config_path);
    let mut cfg = match path {
        Some(path) if path.exists() => read_config_file(&path)?,
        _ => Config::default(),
    };

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    for (key, value) in env_values(prefix) {
        apply_env_value(&mut cfg, &key, value);
    }

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    if data.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn env_values(prefix: &str) -> HashMap<String, String> {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(&upper_prefix)
                .map(|stripped| (stripped.to_ascii_lowercase().replace("__", "."), value))
        })
        .collect()
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api_url" | "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.timeout" => match humantime::parse_duration(&value) {
            Ok(duration) => cfg.api.timeout = duration,
            Err(err) => tracing::warn!(%key, %value, error = %err, "ignoring invalid duration"),
        },
        "session.refresh_path" => cfg.session.refresh_path = value,
        "session.login_path" => cfg.session.login_path = value,
        "session.protected_prefixes" => {
            cfg.session.protected_prefixes = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "session.redirect_delay" => match humantime::parse_duration(&value) {
            Ok(duration) => cfg.session.redirect_delay = duration,
            Err(err) => tracing::warn!(%key, %value, error = %err, "ignoring invalid duration"),
        },
        "comments.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                if parsed > 0 {
                    cfg.comments.page_size = parsed;
                }
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("market-client").join("config.yaml"))
}
