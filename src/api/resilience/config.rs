//! Resilience configuration with builder pattern
//!
//! Bundles the retry policy and request monitoring settings a client is
//! built with.

use super::retry::{Backoff, RetryConfig};
use std::time::Duration;

/// Resilience configuration for API calls
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub monitoring: MonitoringConfig,
}

/// Monitoring and logging configuration
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub correlation_ids: bool,
    pub request_logging: bool,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            correlation_ids: true,
            request_logging: true,
            log_level: LogLevel::Info,
        }
    }
}

impl ResilienceConfig {
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Conservative config for production environments
    pub fn conservative() -> Self {
        Self {
            retry: RetryConfig::conservative(),
            monitoring: MonitoringConfig {
                correlation_ids: true,
                request_logging: true,
                log_level: LogLevel::Warn,
            },
        }
    }

    /// Aggressive config for development/testing
    pub fn development() -> Self {
        Self {
            retry: RetryConfig::aggressive(),
            monitoring: MonitoringConfig {
                correlation_ids: true,
                request_logging: true,
                log_level: LogLevel::Debug,
            },
        }
    }

    /// Single attempt and no request logging
    pub fn disabled() -> Self {
        Self {
            retry: RetryConfig::none(),
            monitoring: MonitoringConfig {
                correlation_ids: false,
                request_logging: false,
                log_level: LogLevel::Error,
            },
        }
    }
}

/// Builder for ResilienceConfig
#[derive(Debug, Default)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Total attempts, including the first
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.base_delay = delay;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.config.retry.backoff = backoff;
        self
    }

    /// Retry 429 responses after the server's `Retry-After` wait
    pub fn retry_rate_limited(mut self, enabled: bool) -> Self {
        self.config.retry.retry_rate_limited = enabled;
        self
    }

    pub fn monitoring_config(mut self, monitoring: MonitoringConfig) -> Self {
        self.config.monitoring = monitoring;
        self
    }

    pub fn correlation_ids(mut self, enabled: bool) -> Self {
        self.config.monitoring.correlation_ids = enabled;
        self
    }

    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.config.monitoring.request_logging = enabled;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.monitoring.log_level = level;
        self
    }

    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}
