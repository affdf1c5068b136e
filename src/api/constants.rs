//! API Constants and Configuration for the Planning Center API

use std::time::Duration;

/// Public Planning Center API host
pub const DEFAULT_BASE_URL: &str = "https://api.planningcenteronline.com";

/// OAuth token endpoint used for client-credential logins
pub const DEFAULT_TOKEN_URL: &str = "https://api.planningcenteronline.com/oauth/token";

/// Default user agent sent with every request
pub const USER_AGENT: &str = concat!("planning-center-client/", env!("CARGO_PKG_VERSION"));

/// Wait recommended to callers when a 429 carries no usable `Retry-After`
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// OAuth tokens are refreshed this long before they actually expire
pub const DEFAULT_TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Request timeout for a single HTTP attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest slice of a non-JSON error body kept in error messages
pub const MAX_ERROR_BODY_CHARS: usize = 512;

/// Standard headers for Planning Center requests
pub mod headers {
    /// Content type for JSON requests
    pub const CONTENT_TYPE_JSON: &str = "application/json";

    /// Header carrying the per-request correlation id
    pub const X_CORRELATION_ID: &str = "X-Correlation-Id";

    /// Header a 429 response uses for its wait recommendation
    pub const RETRY_AFTER: &str = "Retry-After";
}

/// Query string parameter names
pub mod params {
    pub const WHERE: &str = "where";
    pub const INCLUDE: &str = "include";
    pub const ORDER: &str = "order";
    pub const PER_PAGE: &str = "per_page";
    pub const OFFSET: &str = "offset";
    pub const CURSOR: &str = "cursor";
}

/// Join a relative API path onto the base URL; absolute URLs pass through untouched
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Build the URL of a single resource
pub fn resource_endpoint(collection: &str, id: &str) -> String {
    format!("{}/{}", collection.trim_end_matches('/'), id)
}
