//! Embed configuration
//!
//! The embed secret and client id are issued by the dashboard provider and
//! must come from configuration. They are read from the environment or a
//! JSON file and passed explicitly to [`crate::UrlSigner`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use zeroize::Zeroize;

pub const ENV_EMBED_SECRET: &str = "EMBED_SECRET";
pub const ENV_EMBED_CLIENT_ID: &str = "EMBED_CLIENT_ID";
pub const ENV_EMBED_BASE_URL: &str = "EMBED_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {name}")]
    MissingValue { name: &'static str },

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Embed secret, client id and default base URL
#[derive(Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    pub embed_secret: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl std::fmt::Debug for EmbedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedConfig")
            .field("embed_secret", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Drop for EmbedConfig {
    fn drop(&mut self) {
        self.embed_secret.zeroize();
    }
}

impl EmbedConfig {
    pub fn new(embed_secret: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            embed_secret: embed_secret.into(),
            client_id: client_id.into(),
            base_url: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Load from `EMBED_SECRET`, `EMBED_CLIENT_ID` and optional `EMBED_BASE_URL`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` in place of the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            embed_secret: value(ENV_EMBED_SECRET).ok_or(ConfigError::MissingValue {
                name: ENV_EMBED_SECRET,
            })?,
            client_id: value(ENV_EMBED_CLIENT_ID).ok_or(ConfigError::MissingValue {
                name: ENV_EMBED_CLIENT_ID,
            })?,
            base_url: value(ENV_EMBED_BASE_URL),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file with `embed_secret`, `client_id` and `base_url`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that required values are present and the base URL is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embed_secret.is_empty() {
            return Err(ConfigError::MissingValue {
                name: "embed_secret",
            });
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::MissingValue { name: "client_id" });
        }
        if let Some(base_url) = &self.base_url {
            crate::signer::validate_base_url(base_url)
                .map_err(|e| ConfigError::InvalidBaseUrl(e.to_string()))?;
        }
        Ok(())
    }
}
