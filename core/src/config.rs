/// Configuration for the translation engine
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::ai::retry::RetryPolicy;

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_API_URL: &str = "GEMINI_API_URL";
pub const ENV_MODEL: &str = "GEMINI_MODEL";
pub const ENV_TARGET_LANGUAGE: &str = "TARGET_LANGUAGE";
pub const ENV_RETRY_BASE_MS: &str = "TRANSLATOR_RETRY_BASE_MS";
pub const ENV_MAX_RETRIES: &str = "TRANSLATOR_MAX_RETRIES";
pub const ENV_PACING_MS: &str = "TRANSLATOR_PACING_MS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "TRANSLATOR_REQUEST_TIMEOUT_SECS";

pub const DEFAULT_TARGET_LANGUAGE: &str = "German";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOptions {
    /// Wait before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Retries after the initial attempt.
    pub max_retries: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            max_retries: 3,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatorConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
    #[serde(default)]
    pub retry: RetryOptions,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_target_language() -> String {
    DEFAULT_TARGET_LANGUAGE.to_string()
}

fn default_pacing_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: String::new(),
            model: String::new(),
            target_language: default_target_language(),
            retry: RetryOptions::default(),
            pacing_ms: default_pacing_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl fmt::Debug for TranslatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let api_key = if self.api_key.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("TranslatorConfig")
            .field("api_key", &api_key)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("target_language", &self.target_language)
            .field("retry", &self.retry)
            .field("pacing_ms", &self.pacing_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl TranslatorConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Overrides fields with values found through `lookup`.
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`; blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = read(ENV_API_KEY) {
            self.api_key = value;
        }
        if let Some(value) = read(ENV_API_URL) {
            self.api_url = value;
        }
        if let Some(value) = read(ENV_MODEL) {
            self.model = value;
        }
        if let Some(value) = read(ENV_TARGET_LANGUAGE) {
            self.target_language = value;
        }
        if let Some(value) = read(ENV_RETRY_BASE_MS) {
            self.retry.base_delay_ms = parse_number(ENV_RETRY_BASE_MS, &value)?;
        }
        if let Some(value) = read(ENV_MAX_RETRIES) {
            self.retry.max_retries = parse_number(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = read(ENV_PACING_MS) {
            self.pacing_ms = parse_number(ENV_PACING_MS, &value)?;
        }
        if let Some(value) = read(ENV_REQUEST_TIMEOUT_SECS) {
            self.request_timeout_secs = parse_number(ENV_REQUEST_TIMEOUT_SECS, &value)?;
        }

        Ok(())
    }

    /// Checks that everything required to reach the service is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.api_key.trim().is_empty() {
            missing.push(ENV_API_KEY);
        }
        if self.api_url.trim().is_empty() {
            missing.push(ENV_API_URL);
        }
        if self.model.trim().is_empty() {
            missing.push(ENV_MODEL);
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        if self.target_language.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: ENV_TARGET_LANGUAGE,
                value: self.target_language.clone(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_REQUEST_TIMEOUT_SECS,
                value: "0".into(),
            });
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry.base_delay_ms),
            self.retry.max_retries,
        )
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_number<N: std::str::FromStr>(key: &'static str, value: &str) -> Result<N, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
