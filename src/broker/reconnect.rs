//! Background reconnection supervisor
//!
//! Owns the retry policy for the broker connection. The supervisor performs
//! one connect attempt immediately, then sleeps the configured interval
//! between further attempts; the sleep is interruptible so shutdown never
//! waits out a full interval.

use super::{BrokerConnector, ConnectionHolder};
use crate::config::ReconnectPolicy;
use crate::observability::metrics::METRICS;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Keeps the [`ConnectionHolder`] populated according to the configured
/// policy
pub struct Reconnector {
    holder: Arc<ConnectionHolder>,
    connector: Arc<dyn BrokerConnector>,
    retry_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    supervisor: Option<JoinHandle<()>>,
}

impl Reconnector {
    pub fn new(
        holder: Arc<ConnectionHolder>,
        connector: Arc<dyn BrokerConnector>,
        retry_interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            holder,
            connector,
            retry_interval,
            shutdown_tx,
            shutdown_rx,
            supervisor: None,
        }
    }

    /// Run the configured policy.
    ///
    /// Background retry spawns the supervisor task and returns immediately;
    /// connect-once performs a single inline attempt and gives up on
    /// failure, leaving the holder empty.
    pub async fn start(&mut self, policy: ReconnectPolicy) {
        match policy {
            ReconnectPolicy::ConnectOnce => {
                if !attempt_connect(&self.holder, self.connector.as_ref()).await {
                    warn!(
                        "Broker unavailable and reconnection is disabled; \
                         publishes will report unavailable"
                    );
                }
            }
            ReconnectPolicy::BackgroundRetry => {
                let holder = self.holder.clone();
                let connector = self.connector.clone();
                let interval = self.retry_interval;
                let shutdown_rx = self.shutdown_rx.clone();
                self.supervisor = Some(tokio::spawn(supervise(
                    holder,
                    connector,
                    interval,
                    shutdown_rx,
                )));
            }
        }
    }

    /// Interrupt any pending sleep and wait for the supervisor to stop
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.supervisor.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => debug!("Reconnection supervisor stopped"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!(error = %e, "Reconnection supervisor ended abnormally");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!("Reconnection supervisor did not stop in time, aborting");
                    abort.abort();
                }
            }
        }
    }
}

async fn supervise(
    holder: Arc<ConnectionHolder>,
    connector: Arc<dyn BrokerConnector>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        interval_secs = interval.as_secs(),
        "Reconnection supervisor started"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if !holder.is_connected().await {
            attempt_connect(&holder, connector.as_ref()).await;
        }

        if !interruptible_sleep(&mut shutdown_rx, interval).await {
            break;
        }
    }

    info!("Reconnection supervisor stopped");
}

/// One connect attempt; true when a connection was installed
async fn attempt_connect(holder: &ConnectionHolder, connector: &dyn BrokerConnector) -> bool {
    METRICS.record_connect_attempt();

    match connector.connect().await {
        Ok(connection) => {
            METRICS.record_connect_success();
            info!("Broker connection established, installing in holder");
            if holder.set(connection).await.is_some() {
                debug!("Replaced a previous broker connection");
            }
            true
        }
        Err(e) => {
            METRICS.record_connect_failure();
            warn!(error = %e.sanitized(), "Broker connection attempt failed");
            false
        }
    }
}

/// Perform interruptible sleep with shutdown monitoring
/// Returns true if sleep completed, false if shutdown was requested
async fn interruptible_sleep(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => {
            if changed.is_err() || *shutdown_rx.borrow() {
                info!("Shutdown signal received during reconnection delay, stopping");
                return false;
            }
            true
        }
        _ = tokio::time::sleep(delay) => {
            true
        }
    }
}
