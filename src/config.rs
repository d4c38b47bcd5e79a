//! Configuration management for the Klear backend.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `KLEAR_API_KEY` - Shared key clients send in `x-klear-api-key`. When unset,
//!   every protected route answers 401.
//! - `REPLICATE_API_TOKEN` - Replicate token. When unset, AI routes answer 500.
//! - `REPLICATE_API_URL` - Optional. Defaults to `https://api.replicate.com/v1`.
//! - `INPAINT_MODEL_VERSION` - Optional. SDXL inpainting model version.
//! - `PLAN_MODEL_VERSION` - Optional. Vision-language model version for plans.
//! - `RATE_LIMIT_MAX_REQUESTS` - Optional. Requests per device per window. Defaults to `10`.
//! - `RATE_LIMIT_WINDOW_SECS` - Optional. Window length. Defaults to `3600`.
//! - `DEV_MODE` - Optional. Skips the API key check. Defaults to `false`.

use std::time::Duration;

use thiserror::Error;

use crate::util::env_var_bool;

pub const DEFAULT_REPLICATE_API_URL: &str = "https://api.replicate.com/v1";

/// SDXL inpainting.
pub const DEFAULT_INPAINT_MODEL_VERSION: &str =
    "c11bac58203367db93a3c552bd49a25a5418458ddffb7e90dae55780765e26d6";

/// Llama 3.2 Vision.
pub const DEFAULT_PLAN_MODEL_VERSION: &str =
    "90a3693f73602497fc67702f928e07971775e18f2d573880f08a3d3c7f9996e3";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Replicate connection settings.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    /// API token; `None` disables the AI routes.
    pub api_token: Option<String>,

    /// Base URL of the predictions API
    pub api_url: String,

    /// Model version used for inpainting
    pub inpaint_version: String,

    /// Model version used for plan generation
    pub plan_version: String,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            api_url: DEFAULT_REPLICATE_API_URL.to_string(),
            inpaint_version: DEFAULT_INPAINT_MODEL_VERSION.to_string(),
            plan_version: DEFAULT_PLAN_MODEL_VERSION.to_string(),
        }
    }
}

/// Per-device request throttling.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60 * 60),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Shared client key; `None` means fail closed
    pub api_key: Option<String>,

    /// Skip API key checks (local development only)
    pub dev_mode: bool,

    pub replicate: ReplicateConfig,

    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = parse_env("PORT", 3000u16)?;

        let api_key = non_empty_env("KLEAR_API_KEY");
        let dev_mode = env_var_bool("DEV_MODE", false);

        let replicate = ReplicateConfig {
            api_token: non_empty_env("REPLICATE_API_TOKEN"),
            api_url: std::env::var("REPLICATE_API_URL")
                .unwrap_or_else(|_| DEFAULT_REPLICATE_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            inpaint_version: std::env::var("INPAINT_MODEL_VERSION")
                .unwrap_or_else(|_| DEFAULT_INPAINT_MODEL_VERSION.to_string()),
            plan_version: std::env::var("PLAN_MODEL_VERSION")
                .unwrap_or_else(|_| DEFAULT_PLAN_MODEL_VERSION.to_string()),
        };

        let rate_limit = RateLimitConfig {
            max_requests: parse_env("RATE_LIMIT_MAX_REQUESTS", 10u32)?,
            window: Duration::from_secs(parse_env("RATE_LIMIT_WINDOW_SECS", 3600u64)?),
        };

        Ok(Self {
            host,
            port,
            api_key,
            dev_mode,
            replicate,
            rate_limit,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: Option<String>, replicate_token: Option<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            api_key,
            dev_mode: false,
            replicate: ReplicateConfig {
                api_token: replicate_token,
                ..ReplicateConfig::default()
            },
            rate_limit: RateLimitConfig::default(),
        }
    }

    /// Whether requests must carry a valid API key.
    pub fn auth_required(&self) -> bool {
        !self.dev_mode
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::new(Some("key".to_string()), None);
        assert_eq!(config.port, 3000);
        assert!(config.auth_required());
        assert_eq!(config.replicate.api_url, DEFAULT_REPLICATE_API_URL);
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window, Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_env_reports_bad_values() {
        std::env::set_var("KLEAR_TEST_BAD_PORT", "not-a-port");
        let err = parse_env::<u16>("KLEAR_TEST_BAD_PORT", 3000).unwrap_err();
        assert!(err.to_string().contains("KLEAR_TEST_BAD_PORT"));
        std::env::remove_var("KLEAR_TEST_BAD_PORT");
        assert_eq!(parse_env::<u16>("KLEAR_TEST_BAD_PORT", 3000).unwrap(), 3000);
    }
}
