//! Credential handling and the `Authorization` header provider
//!
//! Three credential modes are supported: personal access tokens (Basic auth),
//! OAuth client credentials (token fetched from the token endpoint and cached)
//! and static bearer tokens.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, info, warn};
use serde::Deserialize;
use std::fmt;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use super::constants;
use super::error::ApiError;
use super::models::TokenInfo;

/// The single active credential mode
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    PersonalAccessToken {
        app_id: String,
        secret: String,
    },
    OAuthClient {
        client_id: String,
        client_secret: String,
        token_url: String,
    },
    Bearer(String),
}

impl Credentials {
    pub fn personal_access_token(app_id: impl Into<String>, secret: impl Into<String>) -> Result<Self, ApiError> {
        let app_id = app_id.into();
        let secret = secret.into();
        if app_id.is_empty() {
            return Err(ApiError::Configuration("personal access token is missing the app_id".to_string()));
        }
        if secret.is_empty() {
            return Err(ApiError::Configuration("personal access token is missing the secret".to_string()));
        }
        Ok(Self::PersonalAccessToken { app_id, secret })
    }

    /// Parse an `app_id:secret` pair; only the first colon separates the two
    pub fn parse_personal_access_token(token: &str) -> Result<Self, ApiError> {
        let (app_id, secret) = token.split_once(':').ok_or_else(|| {
            ApiError::Configuration("personal access token must have the form app_id:secret".to_string())
        })?;
        Self::personal_access_token(app_id, secret)
    }

    pub fn oauth_client(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: Option<String>,
    ) -> Result<Self, ApiError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.is_empty() {
            return Err(ApiError::Configuration("OAuth client_id is required".to_string()));
        }
        if client_secret.is_empty() {
            return Err(ApiError::Configuration("OAuth client_secret is required".to_string()));
        }
        Ok(Self::OAuthClient {
            client_id,
            client_secret,
            token_url: token_url.unwrap_or_else(|| constants::DEFAULT_TOKEN_URL.to_string()),
        })
    }

    pub fn bearer(token: impl Into<String>) -> Result<Self, ApiError> {
        let token = token.into();
        if token.is_empty() {
            return Err(ApiError::Configuration("bearer token is empty".to_string()));
        }
        Ok(Self::Bearer(token))
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Credentials::PersonalAccessToken { .. } => "personal_access_token",
            Credentials::OAuthClient { .. } => "oauth_client",
            Credentials::Bearer(_) => "bearer",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::PersonalAccessToken { app_id, .. } => f
                .debug_struct("PersonalAccessToken")
                .field("app_id", app_id)
                .field("secret", &"[REDACTED]")
                .finish(),
            Credentials::OAuthClient { client_id, token_url, .. } => f
                .debug_struct("OAuthClient")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("token_url", token_url)
                .finish(),
            Credentials::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
        }
    }
}

/// Produces the value of the `Authorization` header
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn auth_header(&self) -> Result<String, ApiError>;

    /// Forget any cached token so the next call fetches a fresh one
    async fn invalidate(&self) {}
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Manages authentication for one client configuration
///
/// Static headers (PAT and bearer) are computed once at construction. OAuth
/// tokens are cached behind an async mutex: the lock is held across the token
/// request, so concurrent callers during a refresh wait for that one request
/// instead of issuing their own.
pub struct AuthManager {
    credentials: Credentials,
    http_client: reqwest::Client,
    static_header: Option<String>,
    token: Mutex<Option<TokenInfo>>,
    safety_margin: Duration,
}

impl AuthManager {
    pub fn new(credentials: Credentials, http_client: reqwest::Client) -> Self {
        let static_header = match &credentials {
            Credentials::PersonalAccessToken { app_id, secret } => {
                Some(format!("Basic {}", STANDARD.encode(format!("{}:{}", app_id, secret))))
            }
            Credentials::Bearer(token) => Some(format!("Bearer {}", token)),
            Credentials::OAuthClient { .. } => None,
        };

        Self {
            credentials,
            http_client,
            static_header,
            token: Mutex::new(None),
            safety_margin: constants::DEFAULT_TOKEN_SAFETY_MARGIN,
        }
    }

    /// Refresh tokens this long before they expire
    pub fn with_safety_margin(mut self, safety_margin: Duration) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    async fn request_token(&self, client_id: &str, client_secret: &str, token_url: &str) -> Result<TokenInfo, ApiError> {
        info!("Requesting OAuth token from {}", token_url);

        let response = self
            .http_client
            .post(token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await?;

        let status = response.status();
        debug!("Token request status: {}", status);
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Token request rejected with status {}", status);
            return Err(ApiError::Authentication {
                message: format!("token request failed ({}): {}", status.as_u16(), body.trim()),
            });
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| ApiError::Authentication {
            message: format!("unreadable token response: {}", e),
        })?;

        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Authentication {
                message: "missing access_token".to_string(),
            })?;

        let token_type = token
            .token_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Bearer".to_string());
        let expires_in = token.expires_in.unwrap_or(constants::DEFAULT_TOKEN_LIFETIME_SECS);

        info!("Obtained OAuth token, expires in {}s", expires_in);

        Ok(TokenInfo {
            access_token,
            token_type,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        })
    }
}

#[async_trait]
impl CredentialProvider for AuthManager {
    async fn auth_header(&self) -> Result<String, ApiError> {
        if let Some(header) = &self.static_header {
            return Ok(header.clone());
        }

        let Credentials::OAuthClient { client_id, client_secret, token_url } = &self.credentials else {
            return Err(ApiError::Configuration("no credential mode configured".to_string()));
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_valid(self.safety_margin) {
                return Ok(token.header_value());
            }
            debug!("Cached OAuth token is expiring, refreshing");
        }

        let token = self.request_token(client_id, client_secret, token_url).await?;
        let header = token.header_value();
        *cached = Some(token);
        Ok(header)
    }

    async fn invalidate(&self) {
        if self.static_header.is_none() {
            debug!("Dropping cached OAuth token");
            *self.token.lock().await = None;
        }
    }
}

impl fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("credentials", &self.credentials)
            .field("safety_margin", &self.safety_margin)
            .finish_non_exhaustive()
    }
}
