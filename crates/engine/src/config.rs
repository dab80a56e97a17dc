use std::{env, path::PathBuf, time::Duration};

use dirs_next::{config_dir, home_dir};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TOOLKIT_CONFIG_PATH";
/// Environment variable overriding the backend base URL.
pub const API_BASE_ENV: &str = "TOOLKIT_API_BASE";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 4_000;
pub const DEFAULT_GENERIC_ERROR_STEP: &str = "generic-error-step";
pub const DEFAULT_COMPLETION_MESSAGE: &str = "The tool ran successfully. Thank you!";

/// Runtime settings for a wizard session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub api_base_url: String,
    /// Interval between job status polls.
    pub poll_interval_ms: u64,
    /// Step shown when a failed worker declares no error route.
    pub generic_error_step: String,
    pub completion_message: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            generic_error_step: DEFAULT_GENERIC_ERROR_STEP.to_string(),
            completion_message: DEFAULT_COMPLETION_MESSAGE.to_string(),
        }
    }
}

impl EngineConfig {
    /// Loads the config file, falling back to defaults when it is missing or
    /// unreadable, then applies the environment override for the base URL.
    pub fn load() -> Self {
        let path = default_config_path();
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<EngineConfig>(&content) {
                Ok(config) => config,
                Err(error) => {
                    warn!(path = %path.display(), %error, "ignoring malformed config file");
                    EngineConfig::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "no config file; using defaults");
                EngineConfig::default()
            }
        };

        if let Ok(base) = env::var(API_BASE_ENV)
            && !base.trim().is_empty()
        {
            config.api_base_url = base.trim().to_string();
        }
        config
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Get the default path for the engine configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolkit")
        .join("config.json")
}

fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if trimmed == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = trimmed.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(trimmed)
}
