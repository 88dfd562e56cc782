//! Configuration for the publish gateway
//!
//! Everything is optional in the TOML file: every field carries a serde
//! default, so an empty file (or no file at all) yields a working local
//! configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub http: HttpSection,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URL with scheme and optional port (mqtt:// or mqtts://)
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// Subject used when a request does not name one
    #[serde(default)]
    pub default_subject: Option<String>,

    /// What to do when the broker is unreachable at startup or drops later
    #[serde(default)]
    pub reconnect_policy: ReconnectPolicy,

    /// Seconds between reconnection attempts
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Seconds to wait for the broker to confirm a connection attempt
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Seconds allowed for the drain-then-close sequence at shutdown
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            default_subject: None,
            reconnect_policy: ReconnectPolicy::default(),
            retry_interval_secs: default_retry_interval(),
            connect_timeout_secs: default_connect_timeout(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

impl BrokerSection {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Reconnection policy selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReconnectPolicy {
    /// Keep retrying in the background until a connection sticks
    #[default]
    BackgroundRetry,
    /// Try once at startup and give up; the gateway reports unavailable
    ConnectOnce,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpSection {
    /// Bind address for the HTTP listener
    #[serde(default = "default_http_bind")]
    pub bind: String,

    /// Port for the HTTP listener
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
            port: default_http_port(),
        }
    }
}

impl HttpSection {
    /// Resolve bind address and port into a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.bind.parse().map_err(|_| {
            ConfigError::InvalidConfig(format!(
                "http.bind is not a valid IP address: {}",
                self.bind
            ))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn default_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_retry_interval() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_drain_timeout() -> u64 {
    5
}

fn default_http_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate interval fields that would break the retry and drain loops
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.url must not be empty".to_string(),
            ));
        }
        if self.broker.retry_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.retry_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.broker.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.http.socket_addr()?;
        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[broker]
url = "mqtt://localhost:1883"
default_subject = "orders"
reconnect_policy = "background-retry"
retry_interval_secs = 5

[http]
port = 8080
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
