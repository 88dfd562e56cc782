//! Broker connection management
//!
//! Abstractions over the broker client plus the pieces that keep a
//! connection alive: the shared holder, the single-attempt connector, and
//! the background reconnection supervisor.

use crate::error::BrokerError;
use std::sync::Arc;

pub mod holder;
pub mod mqtt;
pub mod reconnect;

pub use holder::ConnectionHolder;
pub use reconnect::Reconnector;

/// A live broker connection
///
/// Implementations are shared behind an `Arc`; `publish` takes `&self` so
/// concurrent requests never queue behind each other.
#[async_trait::async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Publish a payload to a subject
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Flush pending messages and close the connection
    async fn drain(&self) -> Result<(), BrokerError>;

    /// Whether the underlying session currently looks open
    fn is_open(&self) -> bool;
}

/// A single connection attempt against a configured broker
///
/// Implementations must not retry internally; retry policy belongs to the
/// [`Reconnector`].
#[async_trait::async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError>;
}
