//! Structured request logging with correlation ids
//!
//! Every line is a JSON object with an `event` name, the correlation id of the
//! call and an RFC 3339 timestamp. Credential headers are always redacted.

use super::config::{LogLevel, MonitoringConfig};
use log::{debug, error, info, warn};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Structured logger for API calls
#[derive(Debug, Clone)]
pub struct ApiLogger {
    config: MonitoringConfig,
}

/// Context for a single HTTP exchange
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub correlation_id: String,
    pub method: String,
    pub path: String,
    pub start_time: Instant,
}

impl ApiLogger {
    pub fn new(config: MonitoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    /// Start tracking a request; a fresh v4 correlation id is assigned
    pub fn start_operation(&self, method: &str, path: &str) -> OperationContext {
        let context = OperationContext {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            method: method.to_string(),
            path: path.to_string(),
            start_time: Instant::now(),
        };

        if self.config.request_logging && self.should_log(LogLevel::Debug) {
            let log_data = json!({
                "event": "operation_started",
                "correlation_id": context.correlation_id,
                "method": context.method,
                "path": context.path,
                "timestamp": chrono::Utc::now().to_rfc3339()
            });

            debug!("API Operation Started: {}", log_data);
        }

        context
    }

    pub fn log_request(&self, context: &OperationContext, url: &str, headers: &HashMap<String, String>) {
        if !self.config.request_logging || !self.should_log(LogLevel::Debug) {
            return;
        }

        let log_data = json!({
            "event": "http_request",
            "correlation_id": context.correlation_id,
            "method": context.method,
            "url": url,
            "headers": sanitize_headers(headers),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        debug!("HTTP Request: {}", log_data);
    }

    pub fn log_response(&self, context: &OperationContext, status_code: u16) {
        if !self.config.request_logging || !self.should_log(LogLevel::Debug) {
            return;
        }

        let log_data = json!({
            "event": "http_response",
            "correlation_id": context.correlation_id,
            "method": context.method,
            "path": context.path,
            "status_code": status_code,
            "duration_ms": context.elapsed().as_millis(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        if status_code >= 400 {
            warn!("HTTP Response (Error): {}", log_data);
        } else {
            debug!("HTTP Response: {}", log_data);
        }
    }

    /// Final outcome of the exchange
    pub fn complete_operation(&self, context: &OperationContext, status_code: Option<u16>, error_message: Option<&str>) {
        let success = error_message.is_none();
        let level = if success { LogLevel::Info } else { LogLevel::Error };
        if !self.config.request_logging || !self.should_log(level) {
            return;
        }

        let log_data = json!({
            "event": "operation_completed",
            "correlation_id": context.correlation_id,
            "method": context.method,
            "path": context.path,
            "duration_ms": context.elapsed().as_millis(),
            "success": success,
            "status_code": status_code,
            "error_message": error_message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        if success {
            info!("API Operation Completed: {}", log_data);
        } else {
            error!("API Operation Failed: {}", log_data);
        }
    }

    fn should_log(&self, level: LogLevel) -> bool {
        level <= self.config.log_level
    }
}

impl OperationContext {
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Replace credential-bearing header values with `[REDACTED]`
pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, Value> {
    headers
        .iter()
        .map(|(key, value)| {
            let key_lower = key.to_lowercase();
            let value = if key_lower.contains("authorization")
                || key_lower.contains("token")
                || key_lower.contains("secret")
                || key_lower.contains("key")
            {
                "[REDACTED]".to_string()
            } else {
                value.clone()
            };
            (key.clone(), Value::String(value))
        })
        .collect()
}
