//! Pubgate - HTTP to MQTT publish gateway
//!
//! A small service that accepts arbitrary JSON over HTTP and forwards it to an
//! MQTT broker, staying available whether or not the broker is reachable.
//!
//! # Overview
//!
//! This crate provides the pieces of the gateway as a library:
//! - A shared connection slot with a background reconnection supervisor
//! - A publish gateway with subject resolution and verbatim string payloads
//! - A warp HTTP surface with publish, health, and probe endpoints
//! - Graceful shutdown that drains the broker connection exactly once
//!
//! # Quick Start
//!
//! ```rust
//! use pubgate::broker::ConnectionHolder;
//! use pubgate::gateway::{PublishGateway, PublishRequest};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let holder = Arc::new(ConnectionHolder::new());
//! let gateway = PublishGateway::new(holder, Some("orders".to_string()));
//!
//! // With no broker connection held, publishes degrade instead of failing.
//! let outcome = gateway
//!     .publish(PublishRequest {
//!         message: json!({"order_id": 42}),
//!         subject: None,
//!     })
//!     .await;
//!
//! assert!(!outcome.published);
//! assert_eq!(outcome.error.as_deref(), Some("connection not available"));
//! assert_eq!(outcome.subject, "orders");
//! # });
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod observability;
pub mod shutdown;
pub mod testing;

pub use broker::{BrokerConnection, BrokerConnector, ConnectionHolder, Reconnector};
pub use config::{Config, ConfigError, ReconnectPolicy};
pub use error::{BrokerError, GatewayError, GatewayResult};
pub use gateway::{PublishGateway, PublishOutcome, PublishRequest};
pub use http::ApiServer;
pub use shutdown::ShutdownDrain;
