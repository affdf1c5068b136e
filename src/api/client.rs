//! Planning Center API client
//!
//! [`HttpTransport`] performs one authenticated HTTP exchange and classifies
//! the outcome. [`PlanningCenterClient`] wraps a transport with the retry
//! policy, cancellation and typed JSON:API helpers.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::auth::{AuthManager, CredentialProvider};
use super::constants::{self, headers};
use super::error::{ApiError, Result};
use super::models::{RequestMapper, ResourceBody, ResponseMapper};
use super::query::builder::QueryBuilder;
use super::query::description::QueryDescription;
use super::query::query::with_query;
use super::query::result::PagedResult;
use super::resilience::{ApiLogger, MonitoringConfig, RetryConfig, RetryPolicy};
use crate::config::ClientConfig;

/// One HTTP exchange: method, relative path or absolute URL, optional JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Sends a request and returns the parsed 2xx body
///
/// Implementations classify every non-2xx response into an [`ApiError`]; an
/// empty 2xx body is `Value::Null`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<Value>;
}

/// reqwest-backed transport sharing one connection pool
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    logger: ApiLogger,
    rate_limit_fallback: Duration,
}

impl HttpTransport {
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        monitoring: MonitoringConfig,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            credentials,
            logger: ApiLogger::new(monitoring),
            rate_limit_fallback: constants::DEFAULT_RETRY_AFTER,
        }
    }

    /// Wait reported for a 429 whose `Retry-After` is missing or unreadable
    pub fn with_rate_limit_fallback(mut self, fallback: Duration) -> Self {
        self.rate_limit_fallback = fallback;
        self
    }

    /// Connection pool with the configured timeouts and user agent
    pub fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ApiError::Configuration(format!("failed to build HTTP client: {}", e)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<Value> {
        let url = constants::endpoint_url(&self.base_url, &request.path);
        let context = self.logger.start_operation(request.method.as_str(), &request.path);
        let auth_header = self.credentials.auth_header().await?;

        let mut logged_headers = HashMap::new();
        logged_headers.insert("Authorization".to_string(), auth_header.clone());

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .header(reqwest::header::AUTHORIZATION, auth_header)
            .header(reqwest::header::ACCEPT, headers::CONTENT_TYPE_JSON);

        if self.logger.config().correlation_ids {
            builder = builder.header(headers::X_CORRELATION_ID, &context.correlation_id);
            logged_headers.insert(headers::X_CORRELATION_ID.to_string(), context.correlation_id.clone());
        }
        if let Some(body) = &request.body {
            // .json() also sets Content-Type: application/json
            builder = builder.json(body);
            logged_headers.insert("Content-Type".to_string(), headers::CONTENT_TYPE_JSON.to_string());
        }

        self.logger.log_request(&context, &url, &logged_headers);

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let error = ApiError::from(e);
                self.logger.complete_operation(&context, None, Some(&error.to_string()));
                return Err(error);
            }
        };

        let status = response.status().as_u16();
        self.logger.log_response(&context, status);

        let retry_after = response
            .headers()
            .get(headers::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            let error = ApiError::from_response(status, retry_after.as_deref(), &body, self.rate_limit_fallback);
            if status == 401 {
                self.credentials.invalidate().await;
            }
            self.logger.complete_operation(&context, Some(status), Some(&error.to_string()));
            return Err(error);
        }

        let parsed = if body.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str(&body).map_err(|e| ApiError::malformed(Some(status), e, Some(truncate(&body))))
        };

        match &parsed {
            Ok(_) => self.logger.complete_operation(&context, Some(status), None),
            Err(error) => self.logger.complete_operation(&context, Some(status), Some(&error.to_string())),
        }
        parsed
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("rate_limit_fallback", &self.rate_limit_fallback)
            .finish_non_exhaustive()
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(constants::MAX_ERROR_BODY_CHARS).collect()
}

/// Typed Planning Center client
///
/// Cloning is cheap and clones share the connection pool and token cache.
#[derive(Clone)]
pub struct PlanningCenterClient {
    transport: Arc<dyn Transport>,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
    deadline: Option<Duration>,
}

impl PlanningCenterClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let credentials = config.credentials()?;
        let resilience = config.resilience();
        let http_client = HttpTransport::build_http_client(&config)?;

        let auth = AuthManager::new(credentials, http_client.clone()).with_safety_margin(config.token_safety_margin());
        let transport = HttpTransport::new(http_client, config.base_url.clone(), Arc::new(auth), resilience.monitoring)
            .with_rate_limit_fallback(config.rate_limit_fallback());

        Ok(Self::with_transport(Arc::new(transport), resilience.retry))
    }

    /// Configuration from `PCO_*` environment variables and `.env`
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, retry: RetryConfig) -> Self {
        Self {
            transport,
            retry_policy: RetryPolicy::new(retry),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A clone whose calls stop when `token` is cancelled
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    /// A clone whose calls, retries included, must finish within `deadline`
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send through the retry policy, honouring cancellation and deadline
    pub async fn send(&self, request: ApiRequest) -> Result<Value> {
        let request = &request;
        let transport = &self.transport;
        let attempts = self.retry_policy.execute(&self.cancel, || transport.send(request));

        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, attempts)
                .await
                .map_err(|_| ApiError::DeadlineExceeded(deadline))?,
            None => attempts.await,
        }
    }

    pub async fn get_json(&self, path: &str) -> Result<Value> {
        self.send(ApiRequest::get(path)).await
    }

    /// The `data` member of a single-resource response
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let json = self.get_json(path).await?;
        parse_data(json)
    }

    /// `Ok(None)` for a 404; every other failure propagates
    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch a resource and convert it with `mapper`
    pub async fn get_mapped<M: ResponseMapper>(&self, path: &str, mapper: &M) -> Result<M::Model> {
        let dto: M::Dto = self.get(path).await?;
        mapper.to_model(dto)
    }

    /// First page of a list query
    pub async fn get_paged<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        description: &QueryDescription,
    ) -> Result<PagedResult<T>> {
        description.validate()?;
        let path = with_query(endpoint, &description.to_query_string());
        self.fetch_page(&path, endpoint, description).await
    }

    /// Fetch one page by path or absolute link
    pub async fn fetch_page<T: DeserializeOwned>(
        &self,
        path: &str,
        endpoint: &str,
        description: &QueryDescription,
    ) -> Result<PagedResult<T>> {
        let json = self.get_json(path).await?;
        PagedResult::from_json(json, endpoint, description.clone(), Some(self.clone()))
    }

    pub async fn create<T: DeserializeOwned>(&self, endpoint: &str, body: &ResourceBody) -> Result<T> {
        let json = self.send(ApiRequest::post(endpoint, body.to_json())).await?;
        parse_data(json)
    }

    /// Create a resource from a domain request, converting both directions with mappers
    pub async fn create_mapped<Req, Resp>(
        &self,
        endpoint: &str,
        kind: &str,
        request_mapper: &Req,
        request: &Req::Request,
        response_mapper: &Resp,
    ) -> Result<Resp::Model>
    where
        Req: RequestMapper,
        Resp: ResponseMapper,
    {
        let dto = request_mapper.to_dto(request)?;
        let body = ResourceBody::new(kind).attributes(&dto)?;
        let created: Resp::Dto = self.create(endpoint, &body).await?;
        response_mapper.to_model(created)
    }

    pub async fn update<T: DeserializeOwned>(&self, path: &str, body: &ResourceBody) -> Result<T> {
        let json = self.send(ApiRequest::patch(path, body.to_json())).await?;
        parse_data(json)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }

    /// Start a list query against `endpoint`
    pub fn query(&self, endpoint: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(endpoint)
    }
}

impl fmt::Debug for PlanningCenterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanningCenterClient")
            .field("retry", self.retry_policy.config())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

fn parse_data<T: DeserializeOwned>(json: Value) -> Result<T> {
    let Value::Object(mut envelope) = json else {
        return Err(ApiError::malformed(None, "response is not a JSON object", None));
    };
    let data = envelope
        .remove("data")
        .ok_or_else(|| ApiError::malformed(None, "response has no data member", None))?;
    serde_json::from_value(data).map_err(|e| ApiError::malformed(None, e, None))
}
