//! Planning Center JSON:API client
//!
//! Authentication, an HTTP transport with retries and cancellation, typed
//! list queries with lazy paging, and local aggregate evaluation.

pub mod aggregate;
pub mod auth;
pub mod client;
pub mod constants;
pub mod error;
pub mod models;
pub mod query;
pub mod resilience;

pub use aggregate::{AggregateValue, Aggregator, Comparison, Group, Grouped};
pub use auth::{AuthManager, CredentialProvider, Credentials};
pub use client::{ApiRequest, HttpTransport, PlanningCenterClient, Transport};
pub use error::{ApiError, ErrorDetail, Result};
pub use models::{PageLinks, PageMeta, RequestMapper, Resource, ResourceBody, ResourceIdentifier, ResponseMapper, TokenInfo};
pub use query::{Field, Filter, FilterValue, OrderBy, PagedResult, Pages, Query, QueryBuilder, QueryDescription, by};
pub use resilience::{ApiLogger, Backoff, LogLevel, MonitoringConfig, ResilienceConfig, RetryConfig, RetryPolicy};
