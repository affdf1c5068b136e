//! Retry policies and request monitoring
//!
//! Provides the retry policy wrapped around every API call and the
//! structured logger used by the HTTP transport.

pub mod config;
pub mod logging;
pub mod retry;

pub use config::{LogLevel, MonitoringConfig, ResilienceConfig, ResilienceConfigBuilder};
pub use logging::{ApiLogger, OperationContext};
pub use retry::{Backoff, RetryConfig, RetryPolicy, RetryState};
