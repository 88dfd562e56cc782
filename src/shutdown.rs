//! Drains the broker connection exactly once during shutdown
//!
//! The drain takes the connection out of the holder, so a second invocation
//! finds the holder empty and does nothing. Drain failures are logged and
//! swallowed; shutdown always proceeds.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::broker::ConnectionHolder;
use crate::observability::metrics::METRICS;

pub struct ShutdownDrain {
    holder: Arc<ConnectionHolder>,
    drain_timeout: Duration,
}

impl ShutdownDrain {
    pub fn new(holder: Arc<ConnectionHolder>, drain_timeout: Duration) -> Self {
        Self {
            holder,
            drain_timeout,
        }
    }

    /// Take the connection out of the holder and drain it.
    ///
    /// Taking first guarantees the drain runs at most once even if shutdown
    /// paths overlap. Publish requests arriving after the take see an empty
    /// holder and get the unavailable outcome.
    pub async fn run(&self) {
        let connection = match self.holder.take().await {
            Some(connection) => connection,
            None => {
                info!("No broker connection to drain");
                return;
            }
        };

        METRICS.record_connection_closed();
        info!("Draining broker connection");

        match tokio::time::timeout(self.drain_timeout, connection.drain()).await {
            Ok(Ok(())) => {
                info!("Broker connection drained");
            }
            Ok(Err(e)) => {
                warn!(error = %e.sanitized(), "Drain failed, continuing shutdown");
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.drain_timeout.as_secs(),
                    "Drain timed out, continuing shutdown"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockConnection;

    #[tokio::test]
    async fn test_drain_with_empty_holder_is_a_no_op() {
        let holder = Arc::new(ConnectionHolder::new());
        let drain = ShutdownDrain::new(holder.clone(), Duration::from_secs(1));

        drain.run().await;

        assert!(holder.get().await.is_none());
    }

    #[tokio::test]
    async fn test_drain_closes_and_removes_the_connection() {
        let holder = Arc::new(ConnectionHolder::new());
        let connection = Arc::new(MockConnection::new());
        holder.set(connection.clone()).await;

        let drain = ShutdownDrain::new(holder.clone(), Duration::from_secs(1));
        drain.run().await;

        assert_eq!(connection.drain_calls(), 1);
        assert!(holder.get().await.is_none());
    }

    #[tokio::test]
    async fn test_second_drain_does_nothing() {
        let holder = Arc::new(ConnectionHolder::new());
        let connection = Arc::new(MockConnection::new());
        holder.set(connection.clone()).await;

        let drain = ShutdownDrain::new(holder.clone(), Duration::from_secs(1));
        drain.run().await;
        drain.run().await;

        assert_eq!(connection.drain_calls(), 1);
    }

    #[tokio::test]
    async fn test_drain_failure_is_swallowed() {
        let holder = Arc::new(ConnectionHolder::new());
        let connection = Arc::new(MockConnection::new());
        connection.set_fail_drain(true);
        holder.set(connection.clone()).await;

        let drain = ShutdownDrain::new(holder.clone(), Duration::from_secs(1));
        drain.run().await;

        assert_eq!(connection.drain_calls(), 1);
        assert!(holder.get().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_drain_is_cut_off_by_the_timeout() {
        let holder = Arc::new(ConnectionHolder::new());
        let connection = Arc::new(MockConnection::new());
        connection.set_drain_delay(Duration::from_secs(5));
        holder.set(connection.clone()).await;

        let drain = ShutdownDrain::new(holder.clone(), Duration::from_millis(50));
        let started = std::time::Instant::now();
        drain.run().await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(holder.get().await.is_none());
    }
}
