//! Error types for the publish gateway
//!
//! Broker errors keep their sources attached for logging; any text that can
//! reach an HTTP response goes through `sanitize_error_message` first.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by broker connectors and connections
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Invalid broker address: {0}")]
    InvalidAddress(String),

    #[error("Connection failed")]
    ConnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Connection not confirmed within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Close failed")]
    CloseFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Not connected")]
    NotConnected,
}

impl BrokerError {
    /// Flatten the error chain into one sanitized line for outcome bodies
    pub fn sanitized(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        sanitize_error_message(&text)
    }
}

/// Top-level errors for gateway startup and shutdown paths
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Payload serialization failed: {detail}")]
    PayloadEncoding { detail: String },

    #[error("HTTP server error: {0}")]
    Http(String),
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

static SECRET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").unwrap());

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+").unwrap()
});

/// Sanitize error text before it reaches logs or HTTP response bodies
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN.replace_all(message, "${1}=***").to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    // Cap total length so broker stack traces never flood a response body
    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut max_content_len = 500 - truncate_suffix.len();
        // The cut must land on a char boundary or the slice panics
        while !sanitized.is_char_boundary(max_content_len) {
            max_content_len -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..max_content_len], truncate_suffix);
    }

    sanitized
}
