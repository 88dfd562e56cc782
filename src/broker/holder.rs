//! Shared cell for the single live broker connection

use super::BrokerConnection;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Holds at most one live broker connection.
///
/// The lock guards only the slot itself: `get` clones the `Arc` out, so
/// publishes run outside the lock and concurrent requests are never
/// serialized through the holder.
#[derive(Default)]
pub struct ConnectionHolder {
    slot: Mutex<Option<Arc<dyn BrokerConnection>>>,
}

impl ConnectionHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection, if any
    pub async fn get(&self) -> Option<Arc<dyn BrokerConnection>> {
        self.slot.lock().await.clone()
    }

    /// Install a connection, returning the one it replaced
    pub async fn set(
        &self,
        connection: Arc<dyn BrokerConnection>,
    ) -> Option<Arc<dyn BrokerConnection>> {
        self.slot.lock().await.replace(connection)
    }

    /// Remove and return the connection, leaving the holder empty
    pub async fn take(&self) -> Option<Arc<dyn BrokerConnection>> {
        self.slot.lock().await.take()
    }

    /// Whether a connection is installed and its session looks open
    pub async fn is_connected(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|connection| connection.is_open())
            .unwrap_or(false)
    }
}
