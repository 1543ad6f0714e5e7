//! Runtime configuration read from the environment.
//!
//! An optional `.env` file in the working directory is loaded first, so
//! values there behave exactly like exported variables.

use std::net::SocketAddr;

use thiserror::Error;

use crate::llm::DEFAULT_MAX_TOKENS;

pub const DEFAULT_ENDPOINT: &str = "https://models.inference.ai.azure.com";
pub const DEFAULT_MODEL: &str = "DeepSeek-V3";
pub const DEFAULT_API_VERSION: &str = "2024-05-01-preview";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8501";

/// Errors produced while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the inference service, without a trailing slash.
    pub endpoint: String,
    pub model: String,
    pub api_version: String,
    pub max_tokens: u32,
    /// Where `deepseek-chat` serves the UI.
    pub listen_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            api_version: DEFAULT_API_VERSION.to_owned(),
            max_tokens: DEFAULT_MAX_TOKENS,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8501)),
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads `DEEPSEEK_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source. Unset or blank
    /// variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let endpoint = var("DEEPSEEK_ENDPOINT")
            .map(|v| v.trim().trim_end_matches('/').to_owned())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: "DEEPSEEK_ENDPOINT",
                value: endpoint,
                reason: "expected an http:// or https:// URL".into(),
            });
        }

        let model = var("DEEPSEEK_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_owned());
        let api_version =
            var("DEEPSEEK_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_owned());

        let max_tokens = match var("DEEPSEEK_MAX_TOKENS") {
            Some(raw) => parse_max_tokens(&raw)?,
            None => DEFAULT_MAX_TOKENS,
        };

        let listen_raw =
            var("DEEPSEEK_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned());
        let listen_addr = listen_raw
            .trim()
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "DEEPSEEK_LISTEN_ADDR",
                value: listen_raw.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            endpoint,
            model,
            api_version,
            max_tokens,
            listen_addr,
        })
    }

    /// `{endpoint}/chat/completions?api-version={api_version}`
    pub fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions?api-version={}",
            self.endpoint, self.api_version
        )
    }
}

fn parse_max_tokens(raw: &str) -> Result<u32, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        var: "DEEPSEEK_MAX_TOKENS",
        value: raw.to_owned(),
        reason: reason.to_owned(),
    };
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(invalid("must be at least 1")),
        Ok(n) => Ok(n),
        Err(_) => Err(invalid("expected a positive integer")),
    }
}
