//! Client configuration
//!
//! Built once at startup (from CLI flags and the environment) and passed to
//! everything that talks to the backend.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Environment variable overriding the backend base URL
pub const API_URL_ENV: &str = "SCREEN_RECORDER_API_URL";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 600;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid API URL '{url}': {reason}")]
    InvalidApiUrl { url: String, reason: String },

    #[error("Timeout must be greater than zero: {0}")]
    InvalidTimeout(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Backend base URL without a trailing slash
    pub api_base_url: String,

    /// Timeout for list, delete and media requests
    pub request_timeout_secs: u64,

    /// Timeout for the whole upload request
    pub upload_timeout_secs: u64,

    /// Where local downloads are written
    pub download_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            upload_timeout_secs: DEFAULT_UPLOAD_TIMEOUT_SECS,
            download_dir: PathBuf::from("."),
        }
    }
}

impl ClientConfig {
    /// Config pointing at `api_base_url` with default timeouts
    pub fn new(api_base_url: impl Into<String>) -> Result<Self, ConfigError> {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
        .validated()
    }

    /// Normalize the base URL and check all values
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        let trimmed = self.api_base_url.trim().trim_end_matches('/').to_string();
        let url = reqwest::Url::parse(&trimmed).map_err(|e| ConfigError::InvalidApiUrl {
            url: self.api_base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidApiUrl {
                url: self.api_base_url,
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("request_timeout_secs"));
        }
        if self.upload_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("upload_timeout_secs"));
        }

        self.api_base_url = trimmed;
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}
