//! Client configuration
//!
//! Values come from an optional TOML file (by default
//! `<config dir>/planning-center/config.toml`) overlaid with `PCO_*`
//! environment variables. A `.env` file in the working directory is honoured.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::auth::Credentials;
use crate::api::constants;
use crate::api::error::{ApiError, Result};
use crate::api::resilience::{Backoff, MonitoringConfig, ResilienceConfig, RetryConfig};

pub const ENV_BASE_URL: &str = "PCO_BASE_URL";
pub const ENV_PERSONAL_ACCESS_TOKEN: &str = "PCO_PERSONAL_ACCESS_TOKEN";
pub const ENV_APP_ID: &str = "PCO_APP_ID";
pub const ENV_SECRET: &str = "PCO_SECRET";
pub const ENV_CLIENT_ID: &str = "PCO_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "PCO_CLIENT_SECRET";
pub const ENV_TOKEN_URL: &str = "PCO_TOKEN_URL";
pub const ENV_ACCESS_TOKEN: &str = "PCO_ACCESS_TOKEN";
pub const ENV_MAX_ATTEMPTS: &str = "PCO_MAX_ATTEMPTS";
pub const ENV_TIMEOUT_SECS: &str = "PCO_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub token_safety_margin_secs: u64,
    /// Wait reported for a 429 without a usable `Retry-After`
    pub rate_limit_fallback_secs: u64,
    pub request_logging: bool,
    pub auth: AuthConfig,
    pub retry: RetrySettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_BASE_URL.to_string(),
            user_agent: constants::USER_AGENT.to_string(),
            timeout_secs: constants::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: constants::DEFAULT_CONNECT_TIMEOUT.as_secs(),
            token_safety_margin_secs: constants::DEFAULT_TOKEN_SAFETY_MARGIN.as_secs(),
            rate_limit_fallback_secs: constants::DEFAULT_RETRY_AFTER.as_secs(),
            request_logging: true,
            auth: AuthConfig::default(),
            retry: RetrySettings::default(),
        }
    }
}

/// Raw credential settings; exactly one mode is used, see [`ClientConfig::credentials`]
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// `app_id:secret`
    pub personal_access_token: Option<String>,
    pub app_id: Option<String>,
    pub secret: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_url: Option<String>,
    pub access_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("AuthConfig")
            .field("personal_access_token", &redacted(&self.personal_access_token))
            .field("app_id", &self.app_id)
            .field("secret", &redacted(&self.secret))
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("token_url", &self.token_url)
            .field("access_token", &redacted(&self.access_token))
            .finish()
    }
}

impl AuthConfig {
    fn has_personal_access_token(&self) -> bool {
        self.personal_access_token.is_some() || self.app_id.is_some() || self.secret.is_some()
    }

    fn has_oauth_client(&self) -> bool {
        self.client_id.is_some() || self.client_secret.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: BackoffKind,
    /// Only used with exponential backoff
    pub multiplier: f64,
    pub jitter: bool,
    pub retry_rate_limited: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetrySettings {
    fn from(config: &RetryConfig) -> Self {
        let (backoff, multiplier) = match config.backoff {
            Backoff::Linear => (BackoffKind::Linear, 2.0),
            Backoff::Exponential(multiplier) => (BackoffKind::Exponential, multiplier),
        };
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay.as_millis() as u64,
            max_delay_ms: config.max_delay.as_millis() as u64,
            backoff,
            multiplier,
            jitter: config.jitter,
            retry_rate_limited: config.retry_rate_limited,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff: match self.backoff {
                BackoffKind::Linear => Backoff::Linear,
                BackoffKind::Exponential => Backoff::Exponential(self.multiplier),
            },
            jitter: self.jitter,
            retry_rate_limited: self.retry_rate_limited,
        }
    }
}

impl ClientConfig {
    /// `<config dir>/planning-center/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ApiError::Configuration("could not determine the user config directory".to_string()))?;
        Ok(config_dir.join("planning-center").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ApiError::Configuration(format!("invalid config file: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {:?}", path);
        let content = fs::read_to_string(path)
            .map_err(|e| ApiError::Configuration(format!("failed to read config file {:?}: {}", path, e)))?;
        Self::from_toml_str(&content)
    }

    /// Environment only (plus `.env`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Default config file when present, overlaid with the environment
    pub fn load_default() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = Self::default_path()?;
        let mut config = if path.exists() {
            Self::load(&path)?
        } else {
            info!("No config file at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay `PCO_*` variables; empty values count as unset
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(base_url) = var(ENV_BASE_URL) {
            self.base_url = base_url;
        }

        let auth = &mut self.auth;
        for (key, slot) in [
            (ENV_PERSONAL_ACCESS_TOKEN, &mut auth.personal_access_token),
            (ENV_APP_ID, &mut auth.app_id),
            (ENV_SECRET, &mut auth.secret),
            (ENV_CLIENT_ID, &mut auth.client_id),
            (ENV_CLIENT_SECRET, &mut auth.client_secret),
            (ENV_TOKEN_URL, &mut auth.token_url),
            (ENV_ACCESS_TOKEN, &mut auth.access_token),
        ] {
            if let Some(value) = var(key) {
                *slot = Some(value);
            }
        }

        if let Some(raw) = var(ENV_MAX_ATTEMPTS) {
            self.retry.max_attempts = parse_number(ENV_MAX_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = var(ENV_TIMEOUT_SECS) {
            self.timeout_secs = parse_number(ENV_TIMEOUT_SECS, &raw)?;
        }
        Ok(())
    }

    /// Resolve the single credential mode: PAT, then OAuth client, then bearer token
    pub fn credentials(&self) -> Result<Credentials> {
        let auth = &self.auth;

        if auth.has_personal_access_token() {
            if auth.has_oauth_client() || auth.access_token.is_some() {
                warn!("Personal access token configured; ignoring other credential settings");
            }
            return match &auth.personal_access_token {
                Some(token) => Credentials::parse_personal_access_token(token),
                None => Credentials::personal_access_token(
                    auth.app_id.clone().unwrap_or_default(),
                    auth.secret.clone().unwrap_or_default(),
                ),
            };
        }

        if auth.has_oauth_client() {
            if auth.access_token.is_some() {
                warn!("OAuth client configured; ignoring access token");
            }
            return Credentials::oauth_client(
                auth.client_id.clone().unwrap_or_default(),
                auth.client_secret.clone().unwrap_or_default(),
                auth.token_url.clone(),
            );
        }

        match &auth.access_token {
            Some(token) => Credentials::bearer(token.clone()),
            None => Err(ApiError::Configuration(
                "no credentials configured: set a personal access token, OAuth client or access token".to_string(),
            )),
        }
    }

    pub fn resilience(&self) -> ResilienceConfig {
        ResilienceConfig {
            retry: self.retry.to_retry_config(),
            monitoring: MonitoringConfig {
                request_logging: self.request_logging,
                ..MonitoringConfig::default()
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn token_safety_margin(&self) -> Duration {
        Duration::from_secs(self.token_safety_margin_secs)
    }

    pub fn rate_limit_fallback(&self) -> Duration {
        Duration::from_secs(self.rate_limit_fallback_secs)
    }
}

fn parse_number<N: std::str::FromStr>(key: &str, raw: &str) -> Result<N> {
    raw.parse()
        .map_err(|_| ApiError::Configuration(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}
